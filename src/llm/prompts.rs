//! Prompt construction for each companion task.

use super::types::CompletionRequest;
use crate::context::ContextWindow;
use crate::types::Purpose;

const ANALYSIS_SYSTEM: &str = "You are a conversation analyst observing a chat between a user and an \
assistant agent. Assess how well the agent is helping: accuracy, helpfulness, completeness and tone. \
Point out concrete moments from the transcript. Be concise.";

const SUMMARY_SYSTEM: &str = "You summarise conversations. Produce a short summary of the topics \
discussed, decisions reached and open questions, in plain prose.";

const TITLE_SYSTEM: &str = "You write titles for conversations. Reply with a single title of at most \
six words, without quotes or trailing punctuation.";

const GENERAL_SYSTEM: &str = "You are a helpful companion sitting alongside an ongoing conversation. \
Use the transcript for context when answering.";

const NO_CONVERSATION: &str = "(no conversation available yet)";

pub fn system_prompt(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::Analysis => ANALYSIS_SYSTEM,
        Purpose::Summary => SUMMARY_SYSTEM,
        Purpose::Title => TITLE_SYSTEM,
        Purpose::General => GENERAL_SYSTEM,
    }
}

fn default_instruction(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::Analysis => "Analyse the agent's replies in this conversation.",
        Purpose::Summary => "Summarise this conversation.",
        Purpose::Title => "Write a title for this conversation.",
        Purpose::General => "What stands out in this conversation so far?",
    }
}

/// Build the request for `purpose` over `context`.
///
/// `instruction` replaces the purpose's default question when given.
pub fn build(purpose: Purpose, context: &ContextWindow, instruction: Option<&str>) -> CompletionRequest {
    let transcript = context.text().unwrap_or(NO_CONVERSATION);
    let instruction = instruction
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| default_instruction(purpose));

    let prompt = format!(
        "Conversation transcript:\n{}\n\n{}",
        transcript, instruction
    );

    CompletionRequest::new(purpose, system_prompt(purpose), prompt)
}
