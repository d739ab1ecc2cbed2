//! Escalation notices.
//!
//! Tells the user what the escalator is doing: which files the selector
//! picked, when a rate limit forced a stricter strategy, and when it gave
//! up. Notices go to **stderr** so stdout carries only the answer.

use std::io::Write;

use crate::escalation::Stage;

/// A single notice emitted while answering a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EscalationEvent {
    /// Project structure was extracted (or re-extracted).
    StructureLoaded { files: usize },
    /// The selector model is being asked for files.
    Selecting { attempt: u8, stage: Stage },
    /// The selector answered with a usable list.
    Selected { files: Vec<String> },
    /// The selector reply could not be parsed; structure only is sent.
    SelectorFallback { error: String },
    /// The main model is being called.
    Sending { attempt: u8, stage: Stage },
    /// The main model rejected the request as too large.
    RateLimited { attempt: u8 },
    /// The main model answered.
    Answered { attempt: u8 },
    /// Every strategy was rate limited.
    Exhausted,
}

/// Receives escalation notices.
pub trait EscalationReporter: Send + Sync {
    fn report(&self, event: EscalationEvent);
}

/// Human-friendly notices on stderr: "[attempt 2] context too large, ...".
pub struct StderrReporter;

impl EscalationReporter for StderrReporter {
    fn report(&self, event: EscalationEvent) {
        let line = match &event {
            EscalationEvent::StructureLoaded { files } => {
                format!("structure loaded ({} files), content fetched on demand\n", files)
            }
            EscalationEvent::Selecting { attempt: 1, .. } => {
                "analyzing query to select relevant files...\n".to_string()
            }
            EscalationEvent::Selecting { attempt, .. } => format!(
                "[attempt {}] previous context too large, switching to aggressive filtering...\n",
                attempt
            ),
            EscalationEvent::Selected { files } => {
                let preview: Vec<&str> = files.iter().take(3).map(String::as_str).collect();
                let more = if files.len() > 3 { ", ..." } else { "" };
                format!(
                    "selected {} files: {}{}\n",
                    files.len(),
                    preview.join(", "),
                    more
                )
            }
            EscalationEvent::SelectorFallback { error } => format!(
                "failed to parse file list: {}; using structure only\n",
                error
            ),
            EscalationEvent::Sending {
                attempt,
                stage: Stage::StructureOnly,
            } if *attempt > 1 => format!(
                "[attempt {}] still failing, sending structure only (no file content)\n",
                attempt
            ),
            EscalationEvent::Sending { .. } => "transmitting request...\n".to_string(),
            EscalationEvent::RateLimited { attempt } => {
                format!("[attempt {}] rate limit (429) exceeded\n", attempt)
            }
            EscalationEvent::Answered { .. } => "response received\n".to_string(),
            EscalationEvent::Exhausted => {
                "error: project is too voluminous, even structure only failed\n".to_string()
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable notices: one JSON object per line on stderr.
pub struct JsonReporter;

impl EscalationReporter for JsonReporter {
    fn report(&self, event: EscalationEvent) {
        let obj = match &event {
            EscalationEvent::StructureLoaded { files } => {
                serde_json::json!({ "event": "structure_loaded", "files": files })
            }
            EscalationEvent::Selecting { attempt, stage } => serde_json::json!({
                "event": "selecting",
                "attempt": attempt,
                "stage": stage.name()
            }),
            EscalationEvent::Selected { files } => {
                serde_json::json!({ "event": "selected", "files": files })
            }
            EscalationEvent::SelectorFallback { error } => {
                serde_json::json!({ "event": "selector_fallback", "error": error })
            }
            EscalationEvent::Sending { attempt, stage } => serde_json::json!({
                "event": "sending",
                "attempt": attempt,
                "stage": stage.name()
            }),
            EscalationEvent::RateLimited { attempt } => {
                serde_json::json!({ "event": "rate_limited", "attempt": attempt })
            }
            EscalationEvent::Answered { attempt } => {
                serde_json::json!({ "event": "answered", "attempt": attempt })
            }
            EscalationEvent::Exhausted => serde_json::json!({ "event": "exhausted" }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// Discards every notice.
pub struct NoReporter;

impl EscalationReporter for NoReporter {
    fn report(&self, _event: EscalationEvent) {}
}

/// Notice mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human notices when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn EscalationReporter> {
        match self {
            ProgressMode::Off => Box::new(NoReporter),
            ProgressMode::Human => Box::new(StderrReporter),
            ProgressMode::Json => Box::new(JsonReporter),
        }
    }
}
