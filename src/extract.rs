//! Format-aware text extraction for individual files.
//!
//! [`read_file`] dispatches purely on the lower-cased extension and never
//! fails: every reader error is converted into a [`ContentBody::Error`]
//! placeholder with zero stats, so one malformed file cannot abort a walk.
//!
//! | Format | Extensions | Output |
//! |--------|------------|--------|
//! | Plain text | source, markup, config, logs | UTF-8 text (lossy) |
//! | Workbook | `.xlsx`, `.xls` | first 50 rows x 20 columns per sheet, tab-joined |
//! | Notebook | `.ipynb` | each cell's type and source |
//! | Document | `.docx` | body paragraphs in order |
//! | No reader | `.pdf` | fixed placeholder |
//! | Anything else | | `[unsupported]` |
//!
//! OOXML containers are read with `zip` + `quick-xml`; decompressed XML
//! entries are bounded to protect against zip bombs. Legacy BIFF workbooks
//! go through `calamine`.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::models::{ContentBody, ExtractionStats};
use crate::policy::extension_of;

/// Rows emitted per worksheet.
const SHEET_MAX_ROWS: usize = 50;
/// Columns emitted per row.
const SHEET_MAX_COLS: usize = 20;
/// Characters kept per cell.
const CELL_MAX_CHARS: usize = 50;
/// Maximum decompressed bytes to read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extensions decoded as plain UTF-8 text.
const PLAIN_TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".py", ".pyw", ".js", ".jsx", ".ts", ".tsx", ".vue", ".html", ".css", ".json", ".xml",
    ".md", ".csv", ".log", ".ini", ".cfg", ".conf", ".toml", ".sh", ".bash", ".zsh", ".ksh",
    ".bat", ".cmd", ".make", ".mk", ".cmake", ".c", ".h", ".hpp", ".hh", ".cc", ".cpp", ".cxx",
    ".c++", ".java", ".go", ".rs", ".swift", ".php", ".rb", ".pl", ".pm", ".scala", ".kt", ".kts",
    ".lua", ".sql", ".yml", ".yaml", ".ps1", ".psm1", ".psd1",
];

/// How a file is read, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    PlainText,
    Workbook,
    LegacyWorkbook,
    Notebook,
    Document,
    Pdf,
    Unknown,
}

impl FileFormat {
    pub fn detect(path: &Path) -> Self {
        let Some(ext) = extension_of(path) else {
            return FileFormat::Unknown;
        };
        match ext.as_str() {
            ".xlsx" => FileFormat::Workbook,
            ".xls" => FileFormat::LegacyWorkbook,
            ".ipynb" => FileFormat::Notebook,
            ".docx" => FileFormat::Document,
            ".pdf" => FileFormat::Pdf,
            e if PLAIN_TEXT_EXTENSIONS.contains(&e) => FileFormat::PlainText,
            _ => FileFormat::Unknown,
        }
    }
}

/// Extraction error, local to a single file.
#[derive(Debug)]
pub enum ExtractError {
    Io(std::io::Error),
    Ooxml(String),
    Workbook(String),
    Notebook(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "{}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
            ExtractError::Workbook(e) => write!(f, "workbook read failed: {}", e),
            ExtractError::Notebook(e) => write!(f, "notebook parse failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<std::io::Error> for ExtractError {
    fn from(e: std::io::Error) -> Self {
        ExtractError::Io(e)
    }
}

/// Extracted body and its statistics (bytes excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub body: ContentBody,
    pub stats: ExtractionStats,
}

impl Extraction {
    fn placeholder(body: ContentBody) -> Self {
        Self {
            body,
            stats: ExtractionStats::default(),
        }
    }
}

/// Read `path` with the reader for its format. Never fails.
pub fn read_file(path: &Path) -> Extraction {
    let format = FileFormat::detect(path);
    debug!("reading {} as {:?}", path.display(), format);
    let result = match format {
        FileFormat::PlainText => read_plain_text(path),
        FileFormat::Workbook => read_workbook(path),
        FileFormat::Notebook => read_notebook(path),
        FileFormat::Document => read_document(path),
        FileFormat::Pdf => Ok(Extraction::placeholder(ContentBody::NoReader(
            "PDF file (content not extracted)",
        ))),
        FileFormat::LegacyWorkbook => read_legacy_workbook(path),
        FileFormat::Unknown => Ok(Extraction::placeholder(ContentBody::Unsupported)),
    };
    result.unwrap_or_else(|e| Extraction::placeholder(ContentBody::Error(e.to_string())))
}

fn read_plain_text(path: &Path) -> Result<Extraction, ExtractError> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(Extraction {
        stats: ExtractionStats::from_text(&text),
        body: ContentBody::Text(format!("Content:\n{}", text)),
    })
}

// ============ Notebook ============

fn read_notebook(path: &Path) -> Result<Extraction, ExtractError> {
    let bytes = std::fs::read(path)?;
    let json: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| ExtractError::Notebook(e.to_string()))?;

    let mut lines = vec!["[Jupyter Notebook]".to_string()];
    let mut stats = ExtractionStats::default();
    let cells = json
        .get("cells")
        .and_then(|c| c.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    for (i, cell) in cells.iter().enumerate() {
        let cell_type = cell
            .get("cell_type")
            .and_then(|t| t.as_str())
            .unwrap_or("unknown");
        let text = match cell.get("source") {
            Some(serde_json::Value::Array(parts)) => parts
                .iter()
                .map(|p| p.as_str().map(str::to_string).unwrap_or_else(|| p.to_string()))
                .collect::<String>(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        lines.push(format!("Cell {} [{}]:", i + 1, cell_type));
        stats += ExtractionStats {
            lines: text.matches('\n').count() + 1,
            ..ExtractionStats::from_text(&text)
        };
        lines.push(text);
    }

    Ok(Extraction {
        body: ContentBody::Text(lines.join("\n")),
        stats,
    })
}

// ============ OOXML ============

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn read_document(path: &Path) -> Result<Extraction, ExtractError> {
    let bytes = std::fs::read(path)?;
    let mut archive = open_archive(&bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    let paragraphs = docx_paragraphs(&xml)?;

    let mut lines = vec!["[Word Document]".to_string()];
    let mut stats = ExtractionStats::default();
    for paragraph in paragraphs {
        stats += ExtractionStats::from_line(&paragraph);
        lines.push(paragraph);
    }
    Ok(Extraction {
        body: ContentBody::Text(lines.join("\n")),
        stats,
    })
}

/// Text of each top-level body paragraph (`w:p`), skipping table contents.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut table_depth = 0usize;
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"tbl" => table_depth += 1,
                b"p" if table_depth == 0 => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" if table_depth == 0 => paragraphs.push(String::new()),
                b"tab" => {
                    if let Some(p) = current.as_mut() {
                        p.push('\t');
                    }
                }
                b"br" | b"cr" => {
                    if let Some(p) = current.as_mut() {
                        p.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                if let Some(p) = current.as_mut() {
                    p.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                b"p" if table_depth == 0 => {
                    if let Some(p) = current.take() {
                        paragraphs.push(p);
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

fn read_workbook(path: &Path) -> Result<Extraction, ExtractError> {
    let bytes = std::fs::read(path)?;
    let mut archive = open_archive(&bytes)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_titles = read_sheet_titles(&mut archive)?;
    let sheet_files = list_worksheet_files(&archive);

    let mut out = SheetWriter::default();
    for (idx, file) in sheet_files.iter().enumerate() {
        let title = sheet_titles
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", idx + 1));
        let xml = read_zip_entry_bounded(&mut archive, file, MAX_XML_ENTRY_BYTES)?;
        out.push_sheet(&title, sheet_rows(&xml, &shared_strings)?);
    }
    Ok(out.finish())
}

fn read_legacy_workbook(path: &Path) -> Result<Extraction, ExtractError> {
    use calamine::Reader;

    let mut workbook =
        calamine::open_workbook_auto(path).map_err(|e| ExtractError::Workbook(e.to_string()))?;
    let mut out = SheetWriter::default();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractError::Workbook(format!("{}: {}", name, e)))?;
        out.push_sheet(&name, range_rows(&range));
    }
    Ok(out.finish())
}

/// Top-left [`SHEET_MAX_ROWS`] x [`SHEET_MAX_COLS`] block of a calamine range,
/// addressed from `A1` so leading blank rows are kept.
fn range_rows(range: &calamine::Range<calamine::Data>) -> Vec<Vec<String>> {
    let Some((last_row, last_col)) = range.end() else {
        return Vec::new();
    };
    let rows = (last_row as usize + 1).min(SHEET_MAX_ROWS);
    let cols = (last_col as usize + 1).min(SHEET_MAX_COLS);
    (0..rows)
        .map(|r| {
            (0..cols)
                .map(|c| {
                    range
                        .get_value((r as u32, c as u32))
                        .map(legacy_cell_text)
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect()
}

fn legacy_cell_text(cell: &calamine::Data) -> String {
    let text = match cell {
        calamine::Data::Empty => String::new(),
        calamine::Data::Bool(true) => "TRUE".to_string(),
        calamine::Data::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    };
    truncate_cell(&text)
}

fn truncate_cell(text: &str) -> String {
    text.chars().take(CELL_MAX_CHARS).collect()
}

/// Accumulates `Sheet:` sections and their tab-joined rows.
#[derive(Default)]
struct SheetWriter {
    lines: Vec<String>,
    stats: ExtractionStats,
}

impl SheetWriter {
    /// Every row is padded to the widest row of its sheet.
    fn push_sheet(&mut self, title: &str, mut rows: Vec<Vec<String>>) {
        self.lines.push(format!("Sheet: {}", title));
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, String::new());
            let row_str = row.join("\t");
            self.stats += ExtractionStats::from_line(&row_str);
            self.lines.push(row_str);
        }
    }

    fn finish(self) -> Extraction {
        Extraction {
            body: ContentBody::Text(self.lines.join("\n")),
            stats: self.stats,
        }
    }
}

/// Shared string table; workbooks without one have no shared strings.
fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    if archive.index_for_name("xl/sharedStrings.xml").is_none() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Sheet names from `xl/workbook.xml`, in workbook order.
fn read_sheet_titles(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    if archive.index_for_name("xl/workbook.xml").is_none() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/workbook.xml", MAX_XML_ENTRY_BYTES)?;
    let mut titles = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                let name = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"name")
                    .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                if let Some(name) = name {
                    titles.push(name);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(titles)
}

fn list_worksheet_files(archive: &Archive<'_>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Zero-based column index from a cell reference such as `"C7"`.
/// `None` when the letters are missing or overflow.
fn column_index(reference: &[u8]) -> Option<usize> {
    let mut letters = reference
        .iter()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| (b.to_ascii_uppercase() - b'A' + 1) as usize);
    let col = letters.try_fold(0usize, |acc, digit| acc.checked_mul(26)?.checked_add(digit))?;
    col.checked_sub(1)
}

/// One-based row number from a `<row r="N">` attribute.
fn row_number(raw: &[u8]) -> Option<usize> {
    std::str::from_utf8(raw)
        .ok()?
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Shared,
    Bool,
    Other,
}

/// Sheet rows `1..=`[`SHEET_MAX_ROWS`], indexed by their `r` attribute so
/// gaps come out as blank rows. Cells past [`SHEET_MAX_COLS`] are dropped and
/// the rest truncated to [`CELL_MAX_CHARS`] characters.
fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>, ExtractError> {
    use quick_xml::events::Event;

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut row_no = 0usize;
    let mut col = 0usize;
    let mut kind = CellKind::Other;
    let mut in_value = false;
    let mut value = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_no = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"r")
                        .and_then(|a| row_number(&a.value))
                        .unwrap_or(row_no.saturating_add(1));
                    if row_no > SHEET_MAX_ROWS {
                        break;
                    }
                    row = Some(Vec::new());
                    col = 0;
                }
                b"c" => {
                    kind = CellKind::Other;
                    value.clear();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"r" => {
                                // Unparseable references fall outside the grid.
                                col = column_index(&attr.value).unwrap_or(usize::MAX);
                            }
                            b"t" => {
                                kind = match attr.value.as_ref() {
                                    b"s" => CellKind::Shared,
                                    b"b" => CellKind::Bool,
                                    _ => CellKind::Other,
                                };
                            }
                            _ => {}
                        }
                    }
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"row" => {
                row_no = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"r")
                    .and_then(|a| row_number(&a.value))
                    .unwrap_or(row_no.saturating_add(1));
            }
            Ok(Event::Text(te)) if in_value => {
                value.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(cells) = row.as_mut() {
                        if col < SHEET_MAX_COLS {
                            let text = resolve_cell(kind, value.trim(), shared_strings);
                            if cells.len() <= col {
                                cells.resize(col + 1, String::new());
                            }
                            cells[col] = truncate_cell(&text);
                        }
                    }
                    col = col.saturating_add(1);
                }
                b"row" => {
                    if let Some(cells) = row.take() {
                        if rows.len() < row_no {
                            rows.resize(row_no, Vec::new());
                        }
                        rows[row_no - 1] = cells;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn resolve_cell(kind: CellKind, raw: &str, shared_strings: &[String]) -> String {
    match kind {
        CellKind::Shared => raw
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i).cloned())
            .unwrap_or_default(),
        CellKind::Bool => match raw {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        CellKind::Other => raw.to_string(),
    }
}
