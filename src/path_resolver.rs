//! # PathResolver Trait
//!
//! Strategy trait for locating a handle below a directory.
//!
//! ## Responsibility
//! - Define the contract for `resolve`: the list of entry names leading from
//!   an ancestor directory to a target handle
//!
//! ## Implementations
//!
//! | Type | Traversal |
//! |------|-----------|
//! | [`DepthFirstResolver`] | Explicit stack, default for [`DirectoryHandle::resolve`] |
//! | [`BreadthFirstResolver`] | Queue; finds shallow targets without descending deep subtrees first |
//!
//! ## Usage
//!
//! ```rust
//! use fs_handles::{memory_root, BreadthFirstResolver, GetOptions, Handle};
//!
//! # fn main() -> Result<(), fs_handles::FsError> {
//! let root = memory_root();
//! let a = root.get_directory_handle("a", GetOptions::CREATE)?;
//! let file = a.get_file_handle("f.txt", GetOptions::CREATE)?;
//!
//! let path = root.resolve_with(&BreadthFirstResolver, &Handle::from(file))?;
//! assert_eq!(path, Some(vec!["a".to_string(), "f.txt".to_string()]));
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;

use crate::{DirectoryHandle, FsError, Handle};

// ============================================================================
// Trait Definition
// ============================================================================

/// Strategy trait for path resolution algorithms.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`.
///
/// # Object Safety
///
/// This trait is object-safe; [`DirectoryHandle::resolve_with`] takes a
/// `&dyn PathResolver`.
pub trait PathResolver: Send + Sync {
    /// Find `target` below `ancestor`.
    ///
    /// # Returns
    ///
    /// - `Some(vec![])` if `target` is `ancestor` itself
    /// - `Some(names)` with the entry names from `ancestor` to `target`
    /// - `None` if `target` is not a descendant
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if `ancestor` has been removed
    /// - backend errors raised while listing a directory
    fn resolve(&self, ancestor: &DirectoryHandle, target: &Handle) -> Result<Option<Vec<String>>, FsError>;
}

// ============================================================================
// Implementations
// ============================================================================

/// Depth-first search with an explicit stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthFirstResolver;

impl PathResolver for DepthFirstResolver {
    fn resolve(&self, ancestor: &DirectoryHandle, target: &Handle) -> Result<Option<Vec<String>>, FsError> {
        if ancestor.is_same_entry(target) {
            return Ok(Some(Vec::new()));
        }

        let mut stack = vec![(ancestor.clone(), Vec::new())];
        while let Some((dir, path)) = stack.pop() {
            for entry in dir.entries()? {
                let (name, handle) = entry?;
                let mut child_path = path.clone();
                child_path.push(name);
                if handle.is_same_entry(target) {
                    return Ok(Some(child_path));
                }
                if let Handle::Directory(child) = handle {
                    stack.push((child, child_path));
                }
            }
        }
        Ok(None)
    }
}

/// Breadth-first search with a queue.
///
/// Returns the shortest path when the backend lets one entry be reached
/// along several routes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreadthFirstResolver;

impl PathResolver for BreadthFirstResolver {
    fn resolve(&self, ancestor: &DirectoryHandle, target: &Handle) -> Result<Option<Vec<String>>, FsError> {
        if ancestor.is_same_entry(target) {
            return Ok(Some(Vec::new()));
        }

        let mut queue = VecDeque::from([(ancestor.clone(), Vec::new())]);
        while let Some((dir, path)) = queue.pop_front() {
            for entry in dir.entries()? {
                let (name, handle) = entry?;
                let mut child_path = path.clone();
                child_path.push(name);
                if handle.is_same_entry(target) {
                    return Ok(Some(child_path));
                }
                if let Handle::Directory(child) = handle {
                    queue.push_back((child, child_path));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory_root, GetOptions};

    fn tree() -> (DirectoryHandle, Handle, Handle) {
        let root = memory_root();
        let a = root.get_directory_handle("a", GetOptions::CREATE).unwrap();
        let b = a.get_directory_handle("b", GetOptions::CREATE).unwrap();
        let deep = b.get_file_handle("deep.txt", GetOptions::CREATE).unwrap();
        root.get_file_handle("top.txt", GetOptions::CREATE).unwrap();
        (root, Handle::from(b), Handle::from(deep))
    }

    fn both() -> [&'static dyn PathResolver; 2] {
        [&DepthFirstResolver, &BreadthFirstResolver]
    }

    #[test]
    fn resolves_nested_entries() {
        let (root, b, deep) = tree();
        for resolver in both() {
            assert_eq!(
                resolver.resolve(&root, &deep).unwrap(),
                Some(vec!["a".to_string(), "b".into(), "deep.txt".into()])
            );
            assert_eq!(resolver.resolve(&root, &b).unwrap(), Some(vec!["a".to_string(), "b".into()]));
        }
    }

    #[test]
    fn self_resolves_to_empty_path() {
        let (root, _, _) = tree();
        for resolver in both() {
            let me = Handle::from(root.clone());
            assert_eq!(resolver.resolve(&root, &me).unwrap(), Some(vec![]));
        }
    }

    #[test]
    fn non_descendant_is_none() {
        let (root, b, _) = tree();
        let other = memory_root().get_file_handle("x", GetOptions::CREATE).unwrap();
        let b = b.as_directory().unwrap().clone();
        for resolver in both() {
            assert_eq!(resolver.resolve(&root, &Handle::from(other.clone())).unwrap(), None);
            assert_eq!(resolver.resolve(&b, &Handle::from(root.clone())).unwrap(), None);
        }
    }

    #[test]
    fn handle_resolve_uses_depth_first() {
        let (root, _, deep) = tree();
        assert_eq!(root.resolve(&deep).unwrap().map(|p| p.len()), Some(3));
    }
}
