//! Inclusion and exclusion policy for project traversal.
//!
//! An [`ExtractionPolicy`] is an immutable value built once from the
//! configuration and passed into every traversal call. It combines:
//!
//! - **[`ExclusionSet`]** — entry names that are never traversed nor listed.
//!   A fixed baseline (VCS metadata, virtual environments, caches, build
//!   artifacts) is always present; user additions can only augment it.
//! - **[`ExtensionAllowlist`]** — dotted, lower-cased extensions that decide
//!   which files are listed and content-extracted. Setting it replaces the
//!   whole set.

use std::collections::BTreeSet;
use std::path::Path;

/// Names excluded from every traversal regardless of configuration.
pub const BASELINE_EXCLUSIONS: &[&str] = &[
    "venv",
    "MyVenv",
    ".venv",
    "env",
    "log",
    "logs",
    ".env",
    "node_modules",
    ".git",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".idea",
    ".vscode",
    ".DS_Store",
    ".cache",
    ".ipynb_checkpoints",
    ".history",
    ".svn",
    ".hg",
    ".tox",
    ".coverage",
    ".gitignore",
    ".gitattributes",
    ".yarn",
    ".parcel-cache",
    ".next",
    ".nuxt",
    ".node_modules",
    ".dist",
];

/// Extensions listed and extracted when the configuration does not override them.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".py", ".pyw", ".ipynb", ".txt", ".pdf", ".docx", ".xlsx", ".xls", ".js", ".jsx", ".ts",
    ".tsx", ".vue", ".html", ".css", ".c", ".h", ".hpp", ".hh", ".cc", ".cpp", ".cxx", ".c++",
    ".sh", ".bash", ".zsh", ".ksh", ".bat", ".cmd", ".make", ".mk", ".java", ".go", ".rs",
    ".swift", ".php", ".rb", ".pl", ".pm", ".scala", ".kt", ".kts", ".lua", ".sql", ".xml",
    ".yml", ".yaml", ".json", ".md", ".csv", ".ini", ".cfg", ".conf", ".toml", ".ps1", ".psm1",
    ".psd1", ".cmake",
];

/// Default per-file ceiling for full-tree content extraction (100 KiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 100 * 1024;

/// Entry names that are skipped during traversal.
///
/// Always a superset of [`BASELINE_EXCLUSIONS`]; there is intentionally no
/// way to remove a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionSet {
    names: BTreeSet<String>,
}

impl ExclusionSet {
    /// The fixed baseline with no user additions.
    pub fn baseline() -> Self {
        Self {
            names: BASELINE_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Baseline unioned with `additions`. Blank entries are ignored.
    pub fn with_additions<I, S>(additions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::baseline();
        for name in additions {
            let name = name.as_ref().trim();
            if !name.is_empty() {
                set.names.insert(name.to_string());
            }
        }
        set
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ExclusionSet {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Case-insensitive set of dotted file extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionAllowlist {
    extensions: BTreeSet<String>,
}

impl ExtensionAllowlist {
    /// Build an allowlist from raw entries, normalizing each to dotted lower
    /// case (`"RS"` and `".rs"` both become `".rs"`). Blank entries are dropped.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = entries
            .into_iter()
            .filter_map(|e| normalize_extension(e.as_ref()))
            .collect();
        Self { extensions }
    }

    /// Whether `path` has an allowlisted extension.
    pub fn allows(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
    }

    pub fn contains(&self, extension: &str) -> bool {
        normalize_extension(extension)
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl Default for ExtensionAllowlist {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

/// Everything a traversal needs to decide what to list and extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPolicy {
    pub exclusions: ExclusionSet,
    pub extensions: ExtensionAllowlist,
    /// Files larger than this are emitted as a placeholder in full-tree mode.
    pub max_file_bytes: u64,
    pub follow_symlinks: bool,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            exclusions: ExclusionSet::baseline(),
            extensions: ExtensionAllowlist::default(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            follow_symlinks: false,
        }
    }
}

/// Lower-cased dotted extension taken from the last `.` segment of the
/// file name. Dotfiles such as `.bashrc` have no extension.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
}

fn normalize_extension(raw: &str) -> Option<String> {
    let e = raw.trim().to_lowercase();
    if e.is_empty() {
        return None;
    }
    if e.starts_with('.') {
        Some(e)
    } else {
        Some(format!(".{}", e))
    }
}

/// Split a comma-separated CLI or config value into trimmed, non-empty items.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
