//! Project context extraction.
//!
//! Builds a [`ProjectReport`] from a directory tree by folding one
//! [`Traversal`](crate::walk::Traversal) through independent sinks:
//!
//! - [`StructureSink`] records the indented listing;
//! - [`ContentSink`] reads eligible files and accumulates statistics.
//!
//! Two modes are offered:
//!
//! - **Full** ([`extract_full`]) — structure plus, optionally, every
//!   allowlisted file's content. Files above the policy's size ceiling are
//!   emitted as `[too large]` without being read; their byte size still
//!   counts toward the totals.
//! - **Targeted** ([`extract_targeted`]) — the full content-free structure,
//!   plus content only for files matching a [`TargetFileSet`]. No size
//!   ceiling applies here.
//!
//! Neither mode fails: unreadable directories and files become inline
//! diagnostics and the walk moves on to the next sibling.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::extract;
use crate::models::{
    ContentBlock, ContentBody, ContentReport, ExtractionStats, ProjectReport, StructureEntry,
    StructureReport, TargetFileSet,
};
use crate::policy::ExtractionPolicy;
use crate::walk::{traverse, TraversalEvent};

const SECTION_SEPARATOR: &str = "\n######################################\n";

/// A consumer of traversal events.
pub trait EventSink {
    fn on_event(&mut self, event: &TraversalEvent);
}

/// Collects the structure report.
#[derive(Debug, Default)]
pub struct StructureSink {
    entries: Vec<StructureEntry>,
}

impl StructureSink {
    pub fn finish(self) -> StructureReport {
        StructureReport {
            entries: self.entries,
        }
    }
}

impl EventSink for StructureSink {
    fn on_event(&mut self, event: &TraversalEvent) {
        match event {
            TraversalEvent::EnterDir { depth, name, .. } => {
                self.entries.push(StructureEntry::Directory {
                    depth: *depth,
                    name: name.clone(),
                })
            }
            TraversalEvent::File { depth, name, .. } => self.entries.push(StructureEntry::File {
                depth: *depth,
                name: name.clone(),
            }),
            TraversalEvent::Unreadable { depth, message } => {
                self.entries.push(StructureEntry::Diagnostic {
                    depth: *depth,
                    message: message.clone(),
                })
            }
            TraversalEvent::LeaveDir { .. } => {}
        }
    }
}

/// Which files a [`ContentSink`] reads.
#[derive(Debug, Clone, Copy)]
pub enum ContentSelection<'a> {
    /// Every file the traversal yields, skipping those above the ceiling.
    All { max_file_bytes: u64 },
    /// Only files matching the targets, with no ceiling.
    Targets(&'a TargetFileSet),
}

/// Reads file contents and aggregates statistics.
#[derive(Debug)]
pub struct ContentSink<'a> {
    selection: ContentSelection<'a>,
    blocks: Vec<ContentBlock>,
    stats: ExtractionStats,
}

impl<'a> ContentSink<'a> {
    pub fn new(selection: ContentSelection<'a>) -> Self {
        Self {
            selection,
            blocks: Vec::new(),
            stats: ExtractionStats::default(),
        }
    }

    pub fn finish(self) -> (ContentReport, ExtractionStats) {
        (
            ContentReport {
                blocks: self.blocks,
            },
            self.stats,
        )
    }

    fn read(&mut self, path: &Path, ceiling: Option<u64>) -> ContentBody {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => return ContentBody::Error(e.to_string()),
        };
        self.stats.bytes += size;

        if ceiling.is_some_and(|max| size > max) {
            debug!("{} is {} bytes, skipping content", path.display(), size);
            return ContentBody::TooLarge;
        }

        let extraction = extract::read_file(path);
        self.stats += extraction.stats;
        extraction.body
    }
}

impl EventSink for ContentSink<'_> {
    fn on_event(&mut self, event: &TraversalEvent) {
        let TraversalEvent::File { relative, path, .. } = event else {
            return;
        };
        let ceiling = match self.selection {
            ContentSelection::All { max_file_bytes } => Some(max_file_bytes),
            ContentSelection::Targets(targets) => {
                if !targets.matches(relative) {
                    return;
                }
                None
            }
        };
        let body = self.read(path, ceiling);
        self.blocks.push(ContentBlock {
            path: display_path(relative),
            body,
        });
    }
}

/// Feed every event to every sink, in order.
pub fn fold<I>(events: I, sinks: &mut [&mut dyn EventSink])
where
    I: IntoIterator<Item = TraversalEvent>,
{
    for event in events {
        for sink in sinks.iter_mut() {
            sink.on_event(&event);
        }
    }
}

/// Structure listing only, no file is opened.
pub fn extract_structure(root: &Path, policy: &ExtractionPolicy) -> StructureReport {
    let mut structure = StructureSink::default();
    fold(traverse(root, policy), &mut [&mut structure]);
    structure.finish()
}

/// Walk `root` once, producing the structure and, if `include_content`,
/// the content of every listed file.
pub fn extract_full(root: &Path, policy: &ExtractionPolicy, include_content: bool) -> ProjectReport {
    if !include_content {
        return ProjectReport {
            structure: extract_structure(root, policy),
            ..ProjectReport::default()
        };
    }

    let mut structure = StructureSink::default();
    let mut content = ContentSink::new(ContentSelection::All {
        max_file_bytes: policy.max_file_bytes,
    });
    fold(traverse(root, policy), &mut [&mut structure, &mut content]);

    let (content, stats) = content.finish();
    info!(
        "extracted {} files from {} ({} bytes)",
        content.len(),
        root.display(),
        stats.bytes
    );
    ProjectReport {
        structure: structure.finish(),
        content,
        stats,
    }
}

/// Full content-free structure plus content for the targeted files only.
///
/// The second walk ignores the extension allowlist, so a target can name
/// any non-excluded file.
pub fn extract_targeted(
    root: &Path,
    policy: &ExtractionPolicy,
    targets: &TargetFileSet,
) -> ProjectReport {
    let structure = extract_structure(root, policy);

    let mut content = ContentSink::new(ContentSelection::Targets(targets));
    fold(traverse(root, policy).all_extensions(), &mut [&mut content]);
    let (content, stats) = content.finish();

    info!(
        "targeted extraction matched {} of {} requested files",
        content.len(),
        targets.len()
    );
    ProjectReport {
        structure,
        content,
        stats,
    }
}

/// Render a full-mode report. Without content only the structure section
/// is emitted.
pub fn render_full(report: &ProjectReport, include_content: bool) -> String {
    let mut out = vec!["FOLDER STRUCTURE:".to_string()];
    out.extend(report.structure.lines());

    if include_content {
        out.push(SECTION_SEPARATOR.to_string());
        out.push("FILE CONTENTS:".to_string());
        out.extend(report.content.blocks.iter().map(ContentBlock::render));
        out.push(SECTION_SEPARATOR.to_string());
        let s = &report.stats;
        out.push(format!(
            "Statistics: {} words, {} lines, {} chars, ~{} tokens. Size: {}",
            s.words,
            s.lines,
            s.characters,
            s.tokens,
            humanize_bytes(s.bytes)
        ));
    }
    out.join("\n").trim().to_string()
}

/// Render a targeted report.
pub fn render_targeted(report: &ProjectReport) -> String {
    let mut out = vec!["FOLDER STRUCTURE (Full):".to_string()];
    out.extend(report.structure.lines());
    out.push(SECTION_SEPARATOR.to_string());
    out.push(format!(
        "SELECTED RELEVANT FILE CONTENTS ({} files):",
        report.content.len()
    ));
    out.extend(report.content.blocks.iter().map(ContentBlock::render));
    out.push(SECTION_SEPARATOR.to_string());
    out.push(format!("Targeted Stats: ~{} tokens.", report.stats.tokens));
    out.join("\n").trim().to_string()
}

/// `1536` -> `"1.5 KB"`. Units step by 1024 up to PB.
pub fn humanize_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} PB", value)
}

fn display_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ExclusionSet, ExtensionAllowlist};
    use tempfile::TempDir;

    fn policy() -> ExtractionPolicy {
        ExtractionPolicy {
            extensions: ExtensionAllowlist::new([".py", ".txt"]),
            ..ExtractionPolicy::default()
        }
    }

    fn sample_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("main.py"), "print('hi')\n").unwrap();
        fs::write(root.join("pkg/util.py"), "def f():\n    return 1\n").unwrap();
        fs::write(root.join("pkg/image.png"), [0u8, 1, 2]).unwrap();
        fs::write(root.join(".git/config"), "[core]").unwrap();
        tmp
    }

    #[test]
    fn humanize_units() {
        assert_eq!(humanize_bytes(0), "0.0 B");
        assert_eq!(humanize_bytes(1536), "1.5 KB");
        assert_eq!(humanize_bytes(1_048_576), "1.0 MB");
        assert_eq!(humanize_bytes(1024u64.pow(5) * 3), "3.0 PB");
    }

    #[test]
    fn full_structure_lists_allowlisted_files() {
        let tmp = sample_tree();
        let report = extract_full(tmp.path(), &policy(), false);
        assert_eq!(
            report.structure.lines(),
            vec!["main.py", "pkg/", "    util.py"]
        );
        assert!(report.content.is_empty());
        assert_eq!(report.stats, ExtractionStats::default());
    }

    #[test]
    fn full_content_is_positional() {
        let tmp = sample_tree();
        let report = extract_full(tmp.path(), &policy(), true);
        assert_eq!(report.content.paths(), vec!["main.py", "pkg/util.py"]);
        assert_eq!(report.stats.lines, 3);
        assert_eq!(report.stats.bytes, 12 + 22);

        let text = render_full(&report, true);
        assert!(text.starts_with("FOLDER STRUCTURE:\nmain.py\npkg/\n    util.py\n"));
        assert!(text.contains("FILE CONTENTS:\n\nFile: main.py\nContent:\nprint('hi')"));
        assert!(text.ends_with("Size: 34.0 B"));
    }

    #[test]
    fn structure_only_render_has_no_content_section() {
        let tmp = sample_tree();
        let report = extract_full(tmp.path(), &policy(), false);
        assert_eq!(
            render_full(&report, false),
            "FOLDER STRUCTURE:\nmain.py\npkg/\n    util.py"
        );
    }

    #[test]
    fn oversized_file_counts_bytes_only() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("big.txt"), "word ".repeat(40)).unwrap();
        let policy = ExtractionPolicy {
            max_file_bytes: 100,
            ..policy()
        };
        let report = extract_full(tmp.path(), &policy, true);
        assert_eq!(report.content.blocks[0].body, ContentBody::TooLarge);
        assert_eq!(report.stats.bytes, 200);
        assert_eq!(report.stats.words, 0);
    }

    #[test]
    fn targeted_ignores_allowlist_but_not_exclusions() {
        let tmp = sample_tree();
        let policy = ExtractionPolicy {
            exclusions: ExclusionSet::with_additions(["secret"]),
            ..policy()
        };
        fs::write(tmp.path().join("secret"), "x").unwrap();
        let targets = TargetFileSet::new(vec![
            "PKG/UTIL.PY".into(),
            "image.png".into(),
            "secret".into(),
            "config".into(),
        ]);
        let report = extract_targeted(tmp.path(), &policy, &targets);
        assert_eq!(report.content.paths(), vec!["pkg/image.png", "pkg/util.py"]);
        assert_eq!(report.structure, extract_structure(tmp.path(), &policy));

        let text = render_targeted(&report);
        assert!(text.starts_with("FOLDER STRUCTURE (Full):\n"));
        assert!(text.contains("SELECTED RELEVANT FILE CONTENTS (2 files):"));
        assert!(text.ends_with(&format!("Targeted Stats: ~{} tokens.", report.stats.tokens)));
    }
}
