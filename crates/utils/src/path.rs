use std::path::{Path, PathBuf};

/// Expand a leading `~`, `~/` or `~user/` and resolve relative results
/// against `base`.
///
/// `~user` is resolved as a sibling of the current user's home directory,
/// which holds for the conventional `/home/<user>` and `/Users/<user>`
/// layouts.
pub fn resolve_user_path(raw: &str, base: &Path) -> PathBuf {
    let expanded = expand_home(raw);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

pub fn expand_home(raw: &str) -> PathBuf {
    let Some(rest) = raw.strip_prefix('~') else {
        return PathBuf::from(raw);
    };

    if rest.is_empty() || rest.starts_with('/') {
        return PathBuf::from(shellexpand::tilde(raw).into_owned());
    }

    let (user, tail) = match rest.split_once('/') {
        Some((user, tail)) => (user, tail),
        None => (rest, ""),
    };

    match dirs::home_dir().as_deref().and_then(Path::parent) {
        Some(homes) => homes.join(user).join(tail),
        None => PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paths_are_untouched() {
        assert_eq!(expand_home("/etc/template"), PathBuf::from("/etc/template"));
        assert_eq!(expand_home("rel/template"), PathBuf::from("rel/template"));
    }

    #[test]
    fn test_tilde_expands_to_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_home("~/msg.txt"), home.join("msg.txt"));
    }

    #[test]
    fn test_tilde_user_is_home_sibling() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let Some(homes) = home.parent() else {
            return;
        };
        assert_eq!(
            expand_home("~alice/tpl/commit.txt"),
            homes.join("alice").join("tpl/commit.txt")
        );
    }

    #[test]
    fn test_relative_resolves_against_base() {
        let base = Path::new("/work/repo");
        assert_eq!(
            resolve_user_path(".gitmessage", base),
            PathBuf::from("/work/repo/.gitmessage")
        );
        assert_eq!(
            resolve_user_path("/abs/.gitmessage", base),
            PathBuf::from("/abs/.gitmessage")
        );
    }
}
