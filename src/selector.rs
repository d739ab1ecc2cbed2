//! Selector model prompt and reply parsing.
//!
//! The selector is a cheaper model asked to pick the files relevant to a
//! request from the project structure. Its reply should be a bare JSON
//! array of root-relative paths; [`parse_file_list`] tolerates a fenced
//! reply by cutting out the bracketed span.

use crate::models::TargetFileSet;

/// How strict the selector is asked to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMode {
    /// Every plausibly relevant file.
    Smart,
    /// The top five most critical files only.
    Aggressive,
}

impl SelectorMode {
    pub fn instruction(self) -> &'static str {
        match self {
            SelectorMode::Smart => "Select all files that might be relevant to the user request.",
            SelectorMode::Aggressive => {
                "Select ONLY the top 5 absolute most critical files needed to answer. Be extremely strict."
            }
        }
    }
}

/// Build the selector request embedding `structure` and the literal `request`.
pub fn build_selector_prompt(structure: &str, request: &str, mode: SelectorMode) -> String {
    format!(
        "You are the Context Optimizer.\n\
         Project Structure:\n\
         {structure}\n\
         \n\
         User Request: \"{request}\"\n\
         \n\
         Task: {instruction}\n\
         Return a JSON list of file paths (strings) relative to root. Example: [\"src/main.py\", \"utils.py\"]\n\
         Do not write markdown, just the JSON array.\n",
        structure = structure,
        request = request,
        instruction = mode.instruction(),
    )
}

/// Why a selector reply could not be turned into a file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorParseError {
    /// Not valid JSON.
    InvalidJson(String),
    /// Valid JSON but not an array of strings.
    NotAStringList,
}

impl std::fmt::Display for SelectorParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectorParseError::InvalidJson(e) => write!(f, "invalid JSON: {}", e),
            SelectorParseError::NotAStringList => write!(f, "expected a JSON array of strings"),
        }
    }
}

impl std::error::Error for SelectorParseError {}

/// Parse a selector reply into a [`TargetFileSet`].
///
/// Surrounding whitespace is stripped. When the reply contains a code
/// fence, only the span from the first `[` to the last `]` is parsed.
pub fn parse_file_list(raw: &str) -> Result<TargetFileSet, SelectorParseError> {
    let mut candidate = raw.trim();
    if candidate.contains("```") {
        if let (Some(start), Some(end)) = (candidate.find('['), candidate.rfind(']')) {
            if start < end {
                candidate = &candidate[start..=end];
            }
        }
    }

    let value: serde_json::Value = serde_json::from_str(candidate)
        .map_err(|e| SelectorParseError::InvalidJson(e.to_string()))?;
    let items = value.as_array().ok_or(SelectorParseError::NotAStringList)?;
    let paths = items
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or(SelectorParseError::NotAStringList)?;
    Ok(TargetFileSet::new(paths))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array() {
        let set = parse_file_list(" [\"a.py\", \"src/b.py\"]\n").unwrap();
        assert_eq!(set.entries(), ["a.py", "src/b.py"]);
    }

    #[test]
    fn fenced_array() {
        let raw = "Here you go:\n```json\n[\n  \"a.py\",\n  \"b.py\"\n]\n```\n";
        let set = parse_file_list(raw).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn empty_array_is_valid() {
        assert!(parse_file_list("[]").unwrap().is_empty());
    }

    #[test]
    fn prose_is_rejected() {
        assert!(matches!(
            parse_file_list("I cannot help."),
            Err(SelectorParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn wrong_shapes_are_rejected() {
        assert_eq!(
            parse_file_list("{\"files\": [\"a.py\"]}"),
            Err(SelectorParseError::NotAStringList)
        );
        assert_eq!(
            parse_file_list("[\"a.py\", 3]"),
            Err(SelectorParseError::NotAStringList)
        );
    }

    #[test]
    fn unfenced_text_around_array_is_rejected() {
        assert!(parse_file_list("Files: [\"a.py\"]").is_err());
    }

    #[test]
    fn prompt_embeds_structure_request_and_instruction() {
        let prompt = build_selector_prompt("FOLDER STRUCTURE:\na.py", "fix it", SelectorMode::Aggressive);
        assert!(prompt.starts_with("You are the Context Optimizer.\nProject Structure:\nFOLDER STRUCTURE:\na.py\n\n"));
        assert!(prompt.contains("User Request: \"fix it\""));
        assert!(prompt.contains("Task: Select ONLY the top 5"));
        assert!(prompt.ends_with("just the JSON array.\n"));
    }
}
