//! Path parsing
//!
//! Paths are relative to the volume root; a leading slash is optional
//! and repeated slashes collapse. `.` and `..` are kept as components and
//! interpreted by the resolver.

use crate::dirent::MAX_NAME_LEN;
use crate::error::{FsError, FsResult};

/// Splits a path into its non-empty components
///
/// ```
/// use services_lxfs::path::split_path;
///
/// assert_eq!(split_path("/docs//notes/").unwrap(), vec!["docs", "notes"]);
/// assert!(split_path("/").unwrap().is_empty());
/// ```
pub fn split_path(path: &str) -> FsResult<Vec<&str>> {
    if path.contains('\0') {
        return Err(FsError::InvalidPath(format!("{:?} contains NUL", path)));
    }
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if let Some(long) = components.iter().find(|c| c.len() > MAX_NAME_LEN) {
        return Err(FsError::NameTooLong(long.to_string()));
    }
    Ok(components)
}

/// Number of non-empty components; 0 is the root itself
pub fn depth(path: &str) -> usize {
    path.split('/').filter(|c| !c.is_empty()).count()
}

/// Splits off the last component: `("a/b", "c")` for `/a/b/c`
pub fn split_parent(path: &str) -> FsResult<(String, &str)> {
    let mut components = split_path(path)?;
    let name = components
        .pop()
        .ok_or_else(|| FsError::InvalidPath("the root has no parent".to_string()))?;
    Ok((components.join("/"), name))
}

/// Canonical spelling of a path: one leading slash, no empty components
pub fn absolute(path: &str) -> String {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    format!("/{}", components.join("/"))
}

/// Path reached by following a link at `link_path` to `target`
///
/// Absolute targets start again from the volume root, relative targets
/// from the directory holding the link. The result is always absolute.
pub fn redirect(link_path: &str, target: &str) -> String {
    if target.starts_with('/') {
        return absolute(target);
    }
    let mut components: Vec<&str> = link_path.split('/').filter(|c| !c.is_empty()).collect();
    components.pop();
    components.extend(target.split('/').filter(|c| !c.is_empty()));
    format!("/{}", components.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple_path() {
        assert_eq!(split_path("todo.txt").unwrap(), vec!["todo.txt"]);
    }

    #[test]
    fn test_split_nested_path() {
        assert_eq!(
            split_path("/docs/notes/todo.txt").unwrap(),
            vec!["docs", "notes", "todo.txt"]
        );
    }

    #[test]
    fn test_split_keeps_dot_components() {
        assert_eq!(split_path("a/./../b").unwrap(), vec!["a", ".", "..", "b"]);
    }

    #[test]
    fn test_root_paths() {
        assert!(split_path("").unwrap().is_empty());
        assert!(split_path("///").unwrap().is_empty());
        assert_eq!(depth("/"), 0);
    }

    #[test]
    fn test_depth() {
        assert_eq!(depth("/a"), 1);
        assert_eq!(depth("a/b/"), 2);
    }

    #[test]
    fn test_nul_rejected() {
        assert!(matches!(split_path("a\0b"), Err(FsError::InvalidPath(_))));
    }

    #[test]
    fn test_long_component_rejected() {
        let path = format!("dir/{}", "x".repeat(MAX_NAME_LEN + 1));
        assert!(matches!(split_path(&path), Err(FsError::NameTooLong(_))));
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("/a/b/c").unwrap(), ("a/b".to_string(), "c"));
        assert_eq!(split_parent("c").unwrap(), (String::new(), "c"));
        assert!(matches!(split_parent("/"), Err(FsError::InvalidPath(_))));
    }

    #[test]
    fn test_redirect() {
        assert_eq!(redirect("a/link", "/real/file"), "/real/file");
        assert_eq!(redirect("a/link", "//real//file"), "/real/file");
        assert_eq!(redirect("a/b/link", "../x"), "/a/b/../x");
        assert_eq!(redirect("/link", "target"), "/target");
    }

    #[test]
    fn test_absolute() {
        assert_eq!(absolute("d/f"), "/d/f");
        assert_eq!(absolute("//d//f/"), "/d/f");
        assert_eq!(absolute(""), "/");
    }
}
