pub mod log;
pub mod path;
pub mod shell;
