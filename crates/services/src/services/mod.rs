pub mod annotation;
pub mod config;
pub mod debounce;
pub mod lock;
pub mod model;
pub mod watcher;
