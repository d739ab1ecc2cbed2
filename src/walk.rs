//! Lazy traversal of a project tree as a stream of events.
//!
//! [`Traversal`] wraps a sorted [`walkdir`] iterator and applies an
//! [`ExtractionPolicy`] on the fly:
//!
//! - entries whose name is in the exclusion set are neither emitted nor
//!   descended into;
//! - files are emitted only when their extension is allowlisted;
//! - directories are bracketed by [`TraversalEvent::EnterDir`] /
//!   [`TraversalEvent::LeaveDir`], so consumers can fold per-directory
//!   state without recursion;
//! - I/O failures become [`TraversalEvent::Unreadable`] and the walk
//!   continues with the next sibling.
//!
//! Entries are visited in lexicographic order of their names at every
//! level, which makes repeated walks of an unchanged tree identical.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::policy::ExtractionPolicy;

/// One step of a project traversal.
///
/// `depth` is the indentation level: direct children of the root are at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalEvent {
    EnterDir {
        depth: usize,
        name: String,
        relative: PathBuf,
    },
    File {
        depth: usize,
        name: String,
        relative: PathBuf,
        path: PathBuf,
    },
    LeaveDir {
        depth: usize,
    },
    /// A directory (or entry) that could not be read.
    Unreadable {
        depth: usize,
        message: String,
    },
}

/// Iterator over [`TraversalEvent`]s for one root directory.
pub struct Traversal<'a> {
    root: PathBuf,
    policy: &'a ExtractionPolicy,
    inner: walkdir::IntoIter,
    /// walkdir depths of directories that have been entered but not left.
    open_dirs: Vec<usize>,
    /// Path of the most recently yielded directory (read errors refer to it).
    last_dir: Option<PathBuf>,
    pending: VecDeque<TraversalEvent>,
    filter_extensions: bool,
}

impl<'a> Traversal<'a> {
    pub fn new(root: &Path, policy: &'a ExtractionPolicy) -> Self {
        let inner = WalkDir::new(root)
            .follow_links(policy.follow_symlinks)
            .sort_by_file_name()
            .into_iter();
        Self {
            root: root.to_path_buf(),
            policy,
            inner,
            open_dirs: Vec::new(),
            last_dir: None,
            pending: VecDeque::new(),
            filter_extensions: true,
        }
    }

    /// Emit every non-excluded file regardless of the extension allowlist.
    pub fn all_extensions(mut self) -> Self {
        self.filter_extensions = false;
        self
    }

    /// Queue `LeaveDir` for every open directory at walkdir depth `>= depth`.
    fn close_to(&mut self, depth: usize) {
        while let Some(&open) = self.open_dirs.last() {
            if open < depth {
                break;
            }
            self.open_dirs.pop();
            self.pending.push_back(TraversalEvent::LeaveDir { depth: open - 1 });
        }
    }

    fn handle_entry(&mut self, entry: walkdir::DirEntry) {
        let depth = entry.depth();
        if depth == 0 {
            self.last_dir = Some(entry.path().to_path_buf());
            return;
        }
        self.close_to(depth);

        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().is_dir();

        if self.policy.exclusions.contains(&name) {
            debug!("excluded {}", entry.path().display());
            if is_dir {
                self.inner.skip_current_dir();
            }
            return;
        }

        let relative = entry
            .path()
            .strip_prefix(&self.root)
            .unwrap_or(entry.path())
            .to_path_buf();

        if is_dir {
            self.open_dirs.push(depth);
            self.last_dir = Some(entry.path().to_path_buf());
            self.pending.push_back(TraversalEvent::EnterDir {
                depth: depth - 1,
                name,
                relative,
            });
        } else if !self.filter_extensions || self.policy.extensions.allows(entry.path()) {
            self.pending.push_back(TraversalEvent::File {
                depth: depth - 1,
                name,
                relative,
                path: entry.into_path(),
            });
        }
    }

    fn handle_error(&mut self, err: walkdir::Error) {
        let depth = err.depth();
        let message = err
            .io_error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| err.to_string());
        warn!("traversal error: {}", err);

        // A failed read_dir is reported against the directory just yielded;
        // its diagnostic belongs at its children's indentation.
        let is_dir_read = err.path().is_some() && err.path() == self.last_dir.as_deref();
        let indent = if is_dir_read {
            depth
        } else {
            self.close_to(depth.max(1));
            depth.saturating_sub(1)
        };
        self.pending.push_back(TraversalEvent::Unreadable {
            depth: indent,
            message,
        });
    }
}

impl Iterator for Traversal<'_> {
    type Item = TraversalEvent;

    fn next(&mut self) -> Option<TraversalEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match self.inner.next() {
                Some(Ok(entry)) => self.handle_entry(entry),
                Some(Err(err)) => self.handle_error(err),
                None => {
                    let open = self.open_dirs.pop()?;
                    return Some(TraversalEvent::LeaveDir { depth: open - 1 });
                }
            }
        }
    }
}

/// Walk `root` under `policy`.
pub fn traverse<'a>(root: &Path, policy: &'a ExtractionPolicy) -> Traversal<'a> {
    Traversal::new(root, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ExclusionSet, ExtensionAllowlist};
    use std::fs;
    use tempfile::TempDir;

    fn policy() -> ExtractionPolicy {
        ExtractionPolicy {
            exclusions: ExclusionSet::with_additions(["skipme"]),
            extensions: ExtensionAllowlist::new([".py", ".md"]),
            ..ExtractionPolicy::default()
        }
    }

    fn summarize(events: &[TraversalEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                TraversalEvent::EnterDir { depth, name, .. } => format!("enter {} {}", depth, name),
                TraversalEvent::File { depth, name, .. } => format!("file {} {}", depth, name),
                TraversalEvent::LeaveDir { depth } => format!("leave {}", depth),
                TraversalEvent::Unreadable { depth, .. } => format!("unreadable {}", depth),
            })
            .collect()
    }

    #[test]
    fn events_are_sorted_and_balanced() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("b/inner")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("skipme")).unwrap();
        fs::write(root.join("z.py"), "z").unwrap();
        fs::write(root.join("a/one.py"), "1").unwrap();
        fs::write(root.join("a/notes.bin"), "x").unwrap();
        fs::write(root.join("b/inner/deep.md"), "d").unwrap();
        fs::write(root.join("skipme/hidden.py"), "h").unwrap();

        let policy = policy();
        let events: Vec<_> = traverse(root, &policy).collect();
        assert_eq!(
            summarize(&events),
            vec![
                "enter 0 a",
                "file 1 one.py",
                "leave 0",
                "enter 0 b",
                "enter 1 inner",
                "file 2 deep.md",
                "leave 1",
                "leave 0",
                "file 0 z.py",
            ]
        );
    }

    #[test]
    fn relative_paths_are_root_relative() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        fs::write(tmp.path().join("pkg/mod.py"), "").unwrap();

        let policy = policy();
        let file = traverse(tmp.path(), &policy)
            .find_map(|e| match e {
                TraversalEvent::File { relative, .. } => Some(relative),
                _ => None,
            })
            .unwrap();
        assert_eq!(file, PathBuf::from("pkg").join("mod.py"));
    }

    #[test]
    fn all_extensions_still_applies_exclusions() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("skipme")).unwrap();
        fs::write(tmp.path().join("data.bin"), "x").unwrap();
        fs::write(tmp.path().join("skipme/data.bin"), "x").unwrap();

        let policy = policy();
        let events: Vec<_> = traverse(tmp.path(), &policy).all_extensions().collect();
        assert_eq!(summarize(&events), vec!["file 0 data.bin"]);
    }

    #[test]
    fn missing_root_yields_single_diagnostic() {
        let tmp = TempDir::new().unwrap();
        let policy = policy();
        let events: Vec<_> = traverse(&tmp.path().join("nope"), &policy).collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TraversalEvent::Unreadable { depth: 0, .. }));
    }
}
