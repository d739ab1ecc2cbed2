//! Core data models shared by the extractor and the escalator.
//!
//! These types represent the statistics, reports, target lists, and chat
//! messages that flow from the filesystem walk to the model boundary.

use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::{Component, Path};

/// Aggregate size counters for extracted content.
///
/// `tokens` is an approximation equal to the whitespace-split word count.
/// Stats are additive: a directory's stats are the sum of its children's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub words: usize,
    pub lines: usize,
    pub characters: usize,
    pub tokens: usize,
    pub bytes: u64,
}

impl ExtractionStats {
    /// Counters for a block of decoded text. `bytes` is left at zero; the
    /// walker adds the on-disk size separately.
    pub fn from_text(text: &str) -> Self {
        let words = text.split_whitespace().count();
        Self {
            words,
            lines: text.matches('\n').count(),
            characters: text.chars().count(),
            tokens: words,
            bytes: 0,
        }
    }

    /// Counters for one emitted row or paragraph, which counts as a single line.
    pub fn from_line(text: &str) -> Self {
        Self {
            lines: 1,
            ..Self::from_text(text)
        }
    }

    pub fn with_bytes(self, bytes: u64) -> Self {
        Self { bytes, ..self }
    }
}

impl Add for ExtractionStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            words: self.words + rhs.words,
            lines: self.lines + rhs.lines,
            characters: self.characters + rhs.characters,
            tokens: self.tokens + rhs.tokens,
            bytes: self.bytes + rhs.bytes,
        }
    }
}

impl AddAssign for ExtractionStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for ExtractionStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// One line of the structure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureEntry {
    Directory { depth: usize, name: String },
    File { depth: usize, name: String },
    /// A subtree that could not be opened.
    Diagnostic { depth: usize, message: String },
}

impl StructureEntry {
    pub fn render(&self) -> String {
        match self {
            StructureEntry::Directory { depth, name } => format!("{}{}/", indent(*depth), name),
            StructureEntry::File { depth, name } => format!("{}{}", indent(*depth), name),
            StructureEntry::Diagnostic { depth, message } => {
                format!("{}[Cannot open: {}]", indent(*depth), message)
            }
        }
    }
}

/// Indented listing of directories and eligible files in traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureReport {
    pub entries: Vec<StructureEntry>,
}

impl StructureReport {
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(StructureEntry::render).collect()
    }

    /// Number of listed files (directories and diagnostics excluded).
    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, StructureEntry::File { .. }))
            .count()
    }
}

/// Extracted text for one file, or the reason there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBody {
    /// Reader output, already formatted for the report.
    Text(String),
    /// Skipped without reading because it exceeds the size ceiling.
    TooLarge,
    /// Reading or parsing failed.
    Error(String),
    /// Recognized format without a capable reader (e.g. PDF).
    NoReader(&'static str),
    /// Allowlisted extension with no reader at all.
    Unsupported,
}

impl ContentBody {
    pub fn render(&self) -> String {
        match self {
            ContentBody::Text(text) => text.clone(),
            ContentBody::TooLarge => "[too large]".to_string(),
            ContentBody::Error(e) => format!("[error: {}]", e),
            ContentBody::NoReader(note) => format!("[{}]", note),
            ContentBody::Unsupported => "[unsupported]".to_string(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        !matches!(self, ContentBody::Text(_))
    }
}

/// One per-file block of the content report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    /// Path relative to the traversal root, `/`-separated.
    pub path: String,
    pub body: ContentBody,
}

impl ContentBlock {
    pub fn render(&self) -> String {
        format!("\nFile: {}\n{}", self.path, self.body.render())
    }
}

/// Ordered per-file blocks, positionally paired with the structure report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentReport {
    pub blocks: Vec<ContentBlock>,
}

impl ContentReport {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.path.as_str()).collect()
    }

    pub fn get(&self, path: &str) -> Option<&ContentBlock> {
        self.blocks.iter().find(|b| b.path == path)
    }
}

/// Result of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectReport {
    pub structure: StructureReport,
    pub content: ContentReport,
    pub stats: ExtractionStats,
}

/// Files the escalator wants content for.
///
/// Entries are either root-relative paths or bare file names; matching is
/// case-insensitive and path-normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetFileSet {
    entries: Vec<String>,
    normalized: Vec<String>,
}

impl TargetFileSet {
    pub fn new(entries: Vec<String>) -> Self {
        let normalized = entries.iter().map(|e| normalize_path(e)).collect();
        Self {
            entries,
            normalized,
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a file at `relative` (to the traversal root) is targeted,
    /// either by its full relative path or by its bare file name.
    pub fn matches(&self, relative: &Path) -> bool {
        let rel = normalize_path(&relative.to_string_lossy());
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.normalized.iter().any(|t| *t == rel || *t == name)
    }
}

/// Lower-cased, `/`-separated form with `.` and `..` segments resolved.
/// A `..` that climbs above the start is kept, so it never matches a file
/// under the root.
pub fn normalize_path(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_lowercase()),
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else {
                    parts.push("..".to_string());
                }
            }
            _ => {}
        }
    }
    parts.join("/")
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged chat message as sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only chat transcript, cleared only by [`reset`](Self::reset).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}
