//! Adaptive retrieval escalation.
//!
//! A query is answered by walking an explicit state machine. Each stage
//! decides what context accompanies the request to the main model:
//!
//! | Attempt | Stage | Context |
//! |---|---|---|
//! | 1 | [`Stage::SmartFilter`] | files the selector deems relevant |
//! | 2 | [`Stage::AggressiveFilter`] | the selector's top five files |
//! | 3 | [`Stage::StructureOnly`] | the structure report, no content |
//! | 4 | [`Stage::Exhausted`] | none, the query fails |
//!
//! Transitions are listed in [`TRANSITIONS`]. A rate-limited main-model
//! reply moves to the next stricter stage. An unusable selector reply
//! jumps straight to [`Stage::StructureOnly`], so a rate limit after that
//! fallback is terminal. Stages never move back toward a looser strategy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ModelsConfig;
use crate::context::{extract_structure, extract_targeted, render_full, render_targeted};
use crate::llm::{CompletionClient, CompletionOutcome};
use crate::models::{ConversationHistory, Message, TargetFileSet};
use crate::policy::ExtractionPolicy;
use crate::prompt::final_messages;
use crate::report::{EscalationEvent, EscalationReporter, NoReporter};
use crate::selector::{build_selector_prompt, parse_file_list, SelectorMode};

/// Retrieval strategy in effect for the current attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    SmartFilter,
    AggressiveFilter,
    StructureOnly,
    Exhausted,
}

impl Stage {
    /// 1-based attempt number of this stage.
    pub fn attempt(self) -> u8 {
        match self {
            Stage::SmartFilter => 1,
            Stage::AggressiveFilter => 2,
            Stage::StructureOnly => 3,
            Stage::Exhausted => 4,
        }
    }

    /// Selector strictness, for stages that consult the selector.
    pub fn selector_mode(self) -> Option<SelectorMode> {
        match self {
            Stage::SmartFilter => Some(SelectorMode::Smart),
            Stage::AggressiveFilter => Some(SelectorMode::Aggressive),
            Stage::StructureOnly | Stage::Exhausted => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::SmartFilter => "smart_filter",
            Stage::AggressiveFilter => "aggressive_filter",
            Stage::StructureOnly => "structure_only",
            Stage::Exhausted => "exhausted",
        }
    }
}

/// What moved the machine off its current stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// The main model answered with a rate-limit outcome.
    RateLimited,
    /// The selector reply was not a JSON list of paths.
    SelectorUnusable,
}

/// `(from, trigger, to)`. Pairs not listed lead to [`Stage::Exhausted`].
pub const TRANSITIONS: &[(Stage, Trigger, Stage)] = &[
    (Stage::SmartFilter, Trigger::RateLimited, Stage::AggressiveFilter),
    (Stage::SmartFilter, Trigger::SelectorUnusable, Stage::StructureOnly),
    (Stage::AggressiveFilter, Trigger::RateLimited, Stage::StructureOnly),
    (Stage::AggressiveFilter, Trigger::SelectorUnusable, Stage::StructureOnly),
    (Stage::StructureOnly, Trigger::RateLimited, Stage::Exhausted),
];

pub fn transition(from: Stage, trigger: Trigger) -> Stage {
    TRANSITIONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == trigger)
        .map(|(_, _, to)| *to)
        .unwrap_or(Stage::Exhausted)
}

/// Per-query state, discarded once the query is answered or exhausted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptState {
    pub stage: Stage,
    pub prompt: String,
    /// A selector call is in flight.
    pub selecting: bool,
}

impl AttemptState {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            stage: Stage::SmartFilter,
            prompt: prompt.into(),
            selecting: false,
        }
    }

    pub fn attempt(&self) -> u8 {
        self.stage.attempt()
    }

    pub fn apply(&mut self, trigger: Trigger) {
        let next = transition(self.stage, trigger);
        debug!(
            "escalation {} --{:?}--> {}",
            self.stage.name(),
            trigger,
            next.name()
        );
        self.stage = next;
    }
}

/// How a query ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The main model replied. Transport and API errors also land here,
    /// verbatim, since they are surfaced rather than retried.
    Answered { text: String, attempt: u8 },
    /// Every stage was rate limited.
    Exhausted,
}

/// Drives queries about one project through the escalation stages.
pub struct Escalator {
    client: Arc<dyn CompletionClient>,
    models: ModelsConfig,
    root: PathBuf,
    policy: ExtractionPolicy,
    structure: Option<String>,
    history: ConversationHistory,
    reporter: Box<dyn EscalationReporter>,
}

impl Escalator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        models: ModelsConfig,
        root: impl Into<PathBuf>,
        policy: ExtractionPolicy,
    ) -> Self {
        Self {
            client,
            models,
            root: root.into(),
            policy,
            structure: None,
            history: ConversationHistory::new(),
            reporter: Box::new(NoReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn EscalationReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn reset_history(&mut self) {
        self.history.reset();
    }

    /// Rendered structure report, extracted on first use.
    pub fn structure(&mut self) -> &str {
        if self.structure.is_none() {
            self.reload_structure();
        }
        self.structure.as_deref().unwrap_or_default()
    }

    /// Re-extract the structure report and start a fresh conversation.
    pub fn reload_structure(&mut self) {
        let report = extract_structure(&self.root, &self.policy);
        self.reporter.report(EscalationEvent::StructureLoaded {
            files: report.file_count(),
        });
        let rendered = render_full(
            &crate::models::ProjectReport {
                structure: report,
                ..Default::default()
            },
            false,
        );
        self.structure = Some(rendered);
        self.history.reset();
    }

    /// Answer `prompt`, escalating on rate limits.
    pub async fn ask(&mut self, prompt: &str) -> QueryOutcome {
        let structure = self.structure().to_string();
        self.history.push(Message::user(prompt));
        let mut state = AttemptState::new(prompt);

        loop {
            let context = match state.stage {
                Stage::SmartFilter | Stage::AggressiveFilter => {
                    match self.select(&structure, &mut state).await {
                        Ok(targets) => {
                            let report = extract_targeted(&self.root, &self.policy, &targets);
                            render_targeted(&report)
                        }
                        Err(reason) => {
                            self.reporter
                                .report(EscalationEvent::SelectorFallback { error: reason });
                            state.apply(Trigger::SelectorUnusable);
                            continue;
                        }
                    }
                }
                Stage::StructureOnly => structure.clone(),
                Stage::Exhausted => {
                    self.reporter.report(EscalationEvent::Exhausted);
                    info!("query exhausted every retrieval stage");
                    return QueryOutcome::Exhausted;
                }
            };

            let attempt = state.attempt();
            self.reporter.report(EscalationEvent::Sending {
                attempt,
                stage: state.stage,
            });
            let messages = final_messages(&context, &self.history);
            let outcome = self.client.complete(&messages, &self.models.main).await;

            if outcome.is_rate_limited() {
                self.reporter
                    .report(EscalationEvent::RateLimited { attempt });
                state.apply(Trigger::RateLimited);
                continue;
            }

            let text = outcome.into_text();
            self.history.push(Message::assistant(text.clone()));
            self.reporter.report(EscalationEvent::Answered { attempt });
            return QueryOutcome::Answered { text, attempt };
        }
    }

    /// Ask the selector for files. Any reply that is not a usable list,
    /// including a failed selector call, yields the reason as `Err`.
    async fn select(
        &self,
        structure: &str,
        state: &mut AttemptState,
    ) -> Result<TargetFileSet, String> {
        let Some(mode) = state.stage.selector_mode() else {
            return Err(format!("stage {} has no selector", state.stage.name()));
        };
        self.reporter.report(EscalationEvent::Selecting {
            attempt: state.attempt(),
            stage: state.stage,
        });

        let request = build_selector_prompt(structure, &state.prompt, mode);
        state.selecting = true;
        let outcome = self
            .client
            .complete(&[Message::user(request)], &self.models.selector)
            .await;
        state.selecting = false;

        let raw = match outcome {
            CompletionOutcome::Success(raw) => raw,
            other => return Err(other.into_text()),
        };
        let targets = parse_file_list(&raw).map_err(|e| e.to_string())?;
        self.reporter.report(EscalationEvent::Selected {
            files: targets.entries().to_vec(),
        });
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_walk_the_table_in_order() {
        let mut state = AttemptState::new("q");
        let mut seen = vec![state.attempt()];
        while state.stage != Stage::Exhausted {
            state.apply(Trigger::RateLimited);
            seen.push(state.attempt());
        }
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn selector_failure_jumps_to_structure_only() {
        assert_eq!(
            transition(Stage::SmartFilter, Trigger::SelectorUnusable),
            Stage::StructureOnly
        );
        assert_eq!(
            transition(Stage::AggressiveFilter, Trigger::SelectorUnusable),
            Stage::StructureOnly
        );
        assert_eq!(
            transition(Stage::StructureOnly, Trigger::RateLimited),
            Stage::Exhausted
        );
    }

    #[test]
    fn transitions_never_loosen() {
        for (from, _, to) in TRANSITIONS {
            assert!(to.attempt() > from.attempt(), "{:?} -> {:?}", from, to);
        }
        assert_eq!(
            transition(Stage::Exhausted, Trigger::RateLimited),
            Stage::Exhausted
        );
    }

    #[test]
    fn only_filter_stages_use_the_selector() {
        assert_eq!(Stage::SmartFilter.selector_mode(), Some(SelectorMode::Smart));
        assert_eq!(
            Stage::AggressiveFilter.selector_mode(),
            Some(SelectorMode::Aggressive)
        );
        assert_eq!(Stage::StructureOnly.selector_mode(), None);
    }
}
