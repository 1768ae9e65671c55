//! Virtual path parsing and sandbox rewriting
//!
//! Paths arrive SFTP-absolute against the virtual tree. Once an operation has
//! entered an asset, the remaining segments are rewritten against the
//! credential's sandbox root before they touch the wire.

/// Split an SFTP-absolute path into its non-empty segments.
///
/// The virtual root and `"/"` both yield an empty vector.
pub fn split_path(path: &str) -> Vec<&str> {
    path.trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Prefix `path` with `/` when it is not already absolute.
pub fn ensure_absolute(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Rewrite a sandbox-relative path into the real remote path.
///
/// `sftp_root` values of `""`, `"~"` and `"home"` (case-insensitive) anchor
/// the sandbox at the login account's home directory as reported by the
/// server on session start; anything else is made absolute and used as-is.
pub fn sandbox_path(sftp_root: &str, home_dir: &str, sub_path: &str) -> String {
    let root = match sftp_root.to_ascii_lowercase().as_str() {
        "" | "~" | "home" => home_dir.to_string(),
        _ => ensure_absolute(sftp_root),
    };
    join_remote(&root, sub_path.trim_start_matches('/'))
}

/// Join and lexically normalize a remote path. `.` segments drop out and
/// `..` folds, never rising above the root.
fn join_remote(base: &str, rest: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(rest.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_absolute_paths() {
        assert_eq!(split_path("/alice/data/f.txt"), ["alice", "data", "f.txt"]);
        assert_eq!(split_path("alice"), ["alice"]);
        assert!(split_path("/").is_empty());
        assert!(split_path("").is_empty());
        assert_eq!(split_path("/a//b/"), ["a", "b"]);
    }

    #[test]
    fn explicit_root_is_made_absolute() {
        assert_eq!(sandbox_path("data", "/home/u", "/x/y"), "/data/x/y");
        assert_eq!(sandbox_path("/srv", "/home/u", "f.txt"), "/srv/f.txt");
        assert_eq!(sandbox_path("srv/data", "/home/u", "f.txt"), "/srv/data/f.txt");
    }

    #[test]
    fn home_aliases_use_the_remote_home() {
        for root in ["", "~", "home", "Home", "HOME"] {
            assert_eq!(sandbox_path(root, "/h/u", "/x"), "/h/u/x");
        }
        assert_eq!(sandbox_path("~", "/h/u", ""), "/h/u");
    }

    #[test]
    fn join_folds_dot_segments() {
        assert_eq!(sandbox_path("/data", "/h", "a/./b"), "/data/a/b");
        assert_eq!(sandbox_path("/data", "/h", "a/../b"), "/data/b");
        assert_eq!(sandbox_path("/data", "/h", "../../.."), "/");
    }
}
