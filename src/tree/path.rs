//! Pure path utilities for tree node addressing.
//!
//! Node paths are root-relative, `/`-separated, always start with `/`, and
//! never end with one (except the root path `/` itself). No filesystem
//! access, no storage dependency.

/// Normalize a raw path: force a leading `/`, collapse repeated separators,
/// resolve `.` segments, and strip any trailing separator.
pub fn normalize_path(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Parent of a normalized path, or `None` for the root path.
pub fn parent_path(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// Join a normalized base path with a child name.
pub fn join_path(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Final segment of a normalized path (`/` maps to the empty string).
pub fn path_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Whether `ancestor` is a strict path prefix of `descendant`.
pub fn is_path_ancestor(ancestor: &str, descendant: &str) -> bool {
    if ancestor == descendant {
        return false;
    }
    if ancestor == "/" {
        return descendant.starts_with('/');
    }
    descendant.starts_with(ancestor) && descendant.as_bytes().get(ancestor.len()) == Some(&b'/')
}

/// Rewrite `path` so that the `old_base` prefix becomes `new_base`.
/// Returns `None` when `path` is not under `old_base`.
pub fn reparent_path(path: &str, old_base: &str, new_base: &str) -> Option<String> {
    if path == old_base {
        return Some(new_base.to_string());
    }
    if !is_path_ancestor(old_base, path) {
        return None;
    }
    let suffix = &path[old_base.len()..];
    if new_base == "/" {
        Some(suffix.to_string())
    } else {
        Some(format!("{new_base}{suffix}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handles_messy_input() {
        assert_eq!(normalize_path("repo/src"), "/repo/src");
        assert_eq!(normalize_path("/repo//src/"), "/repo/src");
        assert_eq!(normalize_path("/repo/./src"), "/repo/src");
        assert_eq!(normalize_path("/repo/a/../src"), "/repo/src");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("///"), "/");
    }

    #[test]
    fn parent_and_name() {
        assert_eq!(parent_path("/repo/src/a.rs").as_deref(), Some("/repo/src"));
        assert_eq!(parent_path("/repo").as_deref(), Some("/"));
        assert_eq!(parent_path("/"), None);
        assert_eq!(path_name("/repo/src/a.rs"), "a.rs");
    }

    #[test]
    fn join_round_trips_with_parent() {
        let joined = join_path("/repo/src", "a.rs");
        assert_eq!(joined, "/repo/src/a.rs");
        assert_eq!(parent_path(&joined).as_deref(), Some("/repo/src"));
        assert_eq!(join_path("/", "repo"), "/repo");
    }

    #[test]
    fn ancestor_checks_are_segment_aware() {
        assert!(is_path_ancestor("/repo", "/repo/src"));
        assert!(is_path_ancestor("/", "/repo"));
        assert!(!is_path_ancestor("/repo", "/repo"));
        assert!(!is_path_ancestor("/repo/s", "/repo/src"));
    }

    #[test]
    fn reparent_rewrites_prefix() {
        assert_eq!(
            reparent_path("/a/b/c", "/a/b", "/x").as_deref(),
            Some("/x/c")
        );
        assert_eq!(reparent_path("/a/b", "/a/b", "/x").as_deref(), Some("/x"));
        assert_eq!(reparent_path("/other", "/a", "/x"), None);
    }
}
