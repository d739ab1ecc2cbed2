//! Prompt templates sent to the main model and the code sandbox.

use crate::models::{ConversationHistory, Message};

/// System prompt wrapping a rendered context report.
pub fn system_prompt(context: &str) -> String {
    format!(
        "You are an expert coding assistant.\n\
         Project context:\n\
         #####\n\
         {}\n\
         #####\n\
         If the context above is just a structure, it means the project is too large. \
         Do your best with just filenames.\n",
        context
    )
}

/// The main-model request: system prompt followed by the conversation so far.
pub fn final_messages(context: &str, history: &ConversationHistory) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(system_prompt(context)));
    messages.extend(history.messages().iter().cloned());
    messages
}

/// Human-readable preview of what would be sent for `prompt`, without
/// calling any model.
pub fn preview_block(context: &str, prompt: &str) -> String {
    format!(
        "### FINAL PROMPT (FULL CONTENT) ###\n\n\
         --- [PART 1: SYSTEM INSTRUCTION & CONTEXT] ---\n\
         {}\n\n\
         --- [PART 2: USER REQUEST] ---\n\
         User: {}\n",
        system_prompt(context),
        prompt
    )
}

pub const SANDBOX_SYSTEM_PROMPT: &str = "You are a Python coding assistant. Provide a brief \
explanation, then the complete Python code in a single block ```python ... ```. Only include \
executable code.";

/// A code request with the project context and any current code injected.
pub fn sandbox_request(project_context: &str, current_code: &str, request: &str) -> String {
    let mut out = String::new();
    if !project_context.trim().is_empty() {
        out.push_str("--- PROJECT CONTEXT (FILES AND STRUCTURE) ---\n");
        out.push_str(project_context);
        out.push_str("\n\n");
    }
    if !current_code.trim().is_empty() {
        out.push_str("--- CURRENT SANDBOX CODE (TO MODIFY OR USE) ---\n");
        out.push_str(current_code);
        out.push_str("\n\n");
    }
    out.push_str("--- USER REQUEST ---\n");
    out.push_str(request);
    out
}

/// Follow-up asking the model to fix code that failed with `stderr`.
pub fn sandbox_debug_request(stderr: &str, failed_code: &str) -> String {
    format!(
        "The previous code failed with the following error:\n\
         --- ERROR ---\n\
         {}\n\
         --- FAILED CODE ---\n\
         {}\n\
         ---\n\
         \n\
         Please analyze the initial request, the failed code, and the error.\n\
         Provide an explanation of the fix, then the complete corrected Python code in a new \
         block ```python ... ```.\n",
        stderr, failed_code
    )
}

/// The first fenced ```` ```python ```` block of `reply`, trimmed.
pub fn extract_code_block(reply: &str) -> Option<String> {
    const OPEN: &str = "```python\n";
    const CLOSE: &str = "\n```";
    let start = reply.find(OPEN)? + OPEN.len();
    let len = reply[start..].find(CLOSE)?;
    Some(reply[start..start + len].trim().to_string())
}

/// `reply` with its first python block replaced by a short marker.
pub fn explanation_without_code(reply: &str) -> String {
    const OPEN: &str = "```python\n";
    const CLOSE: &str = "\n```";
    let Some(start) = reply.find(OPEN) else {
        return reply.trim().to_string();
    };
    let body = start + OPEN.len();
    match reply[body..].find(CLOSE) {
        Some(len) => {
            let end = body + len + CLOSE.len();
            format!("{}[Code block below]{}", &reply[..start], &reply[end..])
                .trim()
                .to_string()
        }
        None => reply.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_fences_context() {
        let prompt = system_prompt("FOLDER STRUCTURE:\na.py");
        assert!(prompt.contains("#####\nFOLDER STRUCTURE:\na.py\n#####\n"));
        assert!(prompt.ends_with("Do your best with just filenames.\n"));
    }

    #[test]
    fn final_messages_lead_with_system() {
        let mut history = ConversationHistory::new();
        history.push(Message::user("hi"));
        let messages = final_messages("ctx", &history);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, crate::models::Role::System);
        assert_eq!(messages[1], Message::user("hi"));
    }

    #[test]
    fn preview_has_both_parts() {
        let block = preview_block("ctx", "explain");
        assert!(block.starts_with("### FINAL PROMPT (FULL CONTENT) ###\n\n--- [PART 1"));
        assert!(block.ends_with("--- [PART 2: USER REQUEST] ---\nUser: explain\n"));
    }

    #[test]
    fn sandbox_request_skips_blank_sections() {
        assert_eq!(sandbox_request("  ", "", "plot"), "--- USER REQUEST ---\nplot");
        let full = sandbox_request("ctx", "print(1)", "plot");
        assert!(full.starts_with("--- PROJECT CONTEXT (FILES AND STRUCTURE) ---\nctx\n\n"));
        assert!(full.contains("--- CURRENT SANDBOX CODE (TO MODIFY OR USE) ---\nprint(1)\n\n"));
    }

    #[test]
    fn code_block_extraction() {
        let reply = "Sure.\n```python\nprint('a')\nprint('b')\n```\nDone.";
        assert_eq!(
            extract_code_block(reply).as_deref(),
            Some("print('a')\nprint('b')")
        );
        assert_eq!(
            explanation_without_code(reply),
            "Sure.\n[Code block below]\nDone."
        );
        assert_eq!(extract_code_block("no code here"), None);
    }
}
