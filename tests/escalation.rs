use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use project_context::config::ModelsConfig;
use project_context::escalation::{Escalator, QueryOutcome};
use project_context::llm::{CompletionClient, CompletionOutcome};
use project_context::models::{Message, Role};
use project_context::policy::ExtractionPolicy;
use project_context::report::{EscalationEvent, EscalationReporter};
use tempfile::TempDir;

/// One recorded completion request.
#[derive(Debug, Clone)]
struct Call {
    model: String,
    messages: Vec<Message>,
}

/// Replays canned outcomes in order and records every request.
#[derive(Clone, Default)]
struct ScriptedClient {
    replies: Arc<Mutex<VecDeque<CompletionOutcome>>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl ScriptedClient {
    fn new(replies: Vec<CompletionOutcome>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, messages: &[Message], model: &str) -> CompletionOutcome {
        self.calls.lock().unwrap().push(Call {
            model: model.to_string(),
            messages: messages.to_vec(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| CompletionOutcome::Failed("script exhausted".into()))
    }
}

#[derive(Clone, Default)]
struct RecordingReporter {
    events: Arc<Mutex<Vec<EscalationEvent>>>,
}

impl EscalationReporter for RecordingReporter {
    fn report(&self, event: EscalationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn ok(text: &str) -> CompletionOutcome {
    CompletionOutcome::Success(text.to_string())
}

fn rate_limited() -> CompletionOutcome {
    CompletionOutcome::RateLimited("Request too large".to_string())
}

fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.py"), "alpha = 1\n").unwrap();
    fs::write(tmp.path().join("b.py"), "beta = 2\n").unwrap();
    fs::write(tmp.path().join("c.py"), "gamma = 3\n").unwrap();
    tmp
}

fn escalator(tmp: &TempDir, client: &ScriptedClient) -> Escalator {
    Escalator::new(
        Arc::new(client.clone()),
        ModelsConfig::default(),
        tmp.path(),
        ExtractionPolicy::default(),
    )
}

fn system_of(call: &Call) -> &str {
    assert_eq!(call.messages[0].role, Role::System);
    &call.messages[0].content
}

#[tokio::test]
async fn rate_limit_escalates_to_aggressive_filter_then_succeeds() {
    let tmp = project();
    let client = ScriptedClient::new(vec![
        ok(r#"["a.py","b.py"]"#),
        rate_limited(),
        ok(r#"["a.py"]"#),
        ok("Here is the answer."),
    ]);
    let mut escalator = escalator(&tmp, &client);

    let outcome = escalator.ask("what does alpha do?").await;
    assert_eq!(
        outcome,
        QueryOutcome::Answered {
            text: "Here is the answer.".into(),
            attempt: 2
        }
    );

    let calls = client.calls();
    assert_eq!(calls.len(), 4);

    assert_eq!(calls[0].model, "gpt-5-mini");
    assert!(calls[0].messages[0]
        .content
        .contains("Select all files that might be relevant"));
    assert!(calls[0].messages[0].content.contains("User Request: \"what does alpha do?\""));

    assert_eq!(calls[1].model, "gpt-5.1");
    let first_context = system_of(&calls[1]);
    assert!(first_context.contains("SELECTED RELEVANT FILE CONTENTS (2 files):"));
    assert!(first_context.contains("alpha = 1"));
    assert!(first_context.contains("beta = 2"));

    assert_eq!(calls[2].model, "gpt-5-mini");
    assert!(calls[2].messages[0]
        .content
        .contains("Select ONLY the top 5 absolute most critical files"));

    let second_context = system_of(&calls[3]);
    assert!(second_context.contains("SELECTED RELEVANT FILE CONTENTS (1 files):"));
    assert!(!second_context.contains("beta = 2"));

    let history = escalator.history().messages();
    assert_eq!(
        history,
        [
            Message::user("what does alpha do?"),
            Message::assistant("Here is the answer.")
        ]
    );
}

#[tokio::test]
async fn three_rate_limits_are_terminal() {
    let tmp = project();
    let client = ScriptedClient::new(vec![
        ok(r#"["a.py"]"#),
        rate_limited(),
        ok(r#"["a.py"]"#),
        rate_limited(),
        rate_limited(),
        ok("never sent"),
    ]);
    let reporter = RecordingReporter::default();
    let mut escalator =
        escalator(&tmp, &client).with_reporter(Box::new(reporter.clone()));

    assert_eq!(escalator.ask("q").await, QueryOutcome::Exhausted);

    let calls = client.calls();
    assert_eq!(calls.len(), 5);
    let main_calls: Vec<_> = calls.iter().filter(|c| c.model == "gpt-5.1").collect();
    assert_eq!(main_calls.len(), 3);
    let last = system_of(main_calls[2]);
    assert!(last.contains("FOLDER STRUCTURE:\na.py\nb.py\nc.py\n#####"));
    assert!(!last.contains("alpha = 1"));

    let events = reporter.events.lock().unwrap().clone();
    let limited: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            EscalationEvent::RateLimited { attempt } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(limited, vec![1, 2, 3]);
    assert_eq!(events.last(), Some(&EscalationEvent::Exhausted));

    // The user turn stays; no assistant turn is recorded.
    assert_eq!(escalator.history().messages(), [Message::user("q")]);
}

#[tokio::test]
async fn unparseable_selector_reply_sends_structure_only() {
    let tmp = project();
    let client = ScriptedClient::new(vec![ok("I cannot help."), ok("Best effort answer.")]);
    let reporter = RecordingReporter::default();
    let mut escalator =
        escalator(&tmp, &client).with_reporter(Box::new(reporter.clone()));

    let outcome = escalator.ask("q").await;
    assert_eq!(
        outcome,
        QueryOutcome::Answered {
            text: "Best effort answer.".into(),
            attempt: 3
        }
    );

    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    let context = system_of(&calls[1]);
    assert!(context.contains("#####\nFOLDER STRUCTURE:\na.py\nb.py\nc.py\n#####"));
    assert!(!context.contains("SELECTED RELEVANT FILE CONTENTS"));
    assert!(!context.contains("alpha = 1"));

    let events = reporter.events.lock().unwrap().clone();
    assert!(events
        .iter()
        .any(|e| matches!(e, EscalationEvent::SelectorFallback { .. })));
}

#[tokio::test]
async fn rate_limit_after_selector_fallback_is_terminal() {
    let tmp = project();
    let client = ScriptedClient::new(vec![ok("nope"), rate_limited(), ok("unused")]);
    let mut escalator = escalator(&tmp, &client);

    assert_eq!(escalator.ask("q").await, QueryOutcome::Exhausted);
    assert_eq!(client.calls().len(), 2);
}

#[tokio::test]
async fn api_errors_are_surfaced_verbatim() {
    let tmp = project();
    let client = ScriptedClient::new(vec![
        ok("[]"),
        CompletionOutcome::Failed("API Error (500): upstream down".into()),
    ]);
    let mut escalator = escalator(&tmp, &client);

    let outcome = escalator.ask("q").await;
    assert_eq!(
        outcome,
        QueryOutcome::Answered {
            text: "API Error (500): upstream down".into(),
            attempt: 1
        }
    );
    assert_eq!(client.calls().len(), 2);
}

#[tokio::test]
async fn history_accumulates_and_resets() {
    let tmp = project();
    let client = ScriptedClient::new(vec![
        ok("[]"),
        ok("first"),
        ok("[]"),
        ok("second"),
    ]);
    let mut escalator = escalator(&tmp, &client);

    escalator.ask("one").await;
    escalator.ask("two").await;

    let calls = client.calls();
    let last_main = &calls[3];
    assert_eq!(
        &last_main.messages[1..],
        [
            Message::user("one"),
            Message::assistant("first"),
            Message::user("two"),
        ]
    );

    escalator.reset_history();
    assert!(escalator.history().is_empty());
}

#[tokio::test]
async fn reload_picks_up_new_files() {
    let tmp = project();
    let client = ScriptedClient::new(vec![]);
    let mut escalator = escalator(&tmp, &client);

    assert!(!escalator.structure().contains("d.py"));
    fs::write(tmp.path().join("d.py"), "delta = 4\n").unwrap();
    assert!(!escalator.structure().contains("d.py"));

    escalator.reload_structure();
    assert!(escalator.structure().contains("d.py"));
    assert!(client.calls().is_empty());
}
