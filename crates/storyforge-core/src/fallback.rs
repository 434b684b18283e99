// ABOUTME: Deterministic fallback synthesizer used when LLM summarization exhausts its retries.
// ABOUTME: Extracts role, action, and outcome from the original text and emits a conformant story.

use crate::validate::CRITERIA_HEADER;

const DEFAULT_ACTION: &str = "to complete the described task";
const DEFAULT_OUTCOME: &str = "I can achieve my goal effectively";

/// Build a template-conformant story from the original input without any
/// model call. The output always passes `validate_story`, whatever the input.
pub fn synthesize_fallback(original: &str) -> String {
    let (action, outcome) = extract_parts(original);
    format!(
        "As a user, I want {action} so that {outcome}.\n\n\
         {CRITERIA_HEADER}\n\
         1. The system must provide a clear interface for the requested action.\n\
         2. The user must receive feedback on the success or failure of the action.\n\
         3. The behavior must be covered by a repeatable, measurable test scenario."
    )
}

/// Pull an action and an outcome out of the original text. Recognizes the
/// "I want <action> so that <outcome>" shape; anything else falls back to
/// the first sentence as the action.
fn extract_parts(original: &str) -> (String, String) {
    let flat = sanitize(original);

    let want_idx = flat.find("I want ").or_else(|| flat.find("i want "));
    if let Some(idx) = want_idx {
        let rest = &flat[idx + "I want ".len()..];
        if let Some(so_idx) = rest.find(" so that ") {
            let action = rest[..so_idx].trim().trim_end_matches(['.', ',']);
            let outcome = rest[so_idx + " so that ".len()..]
                .trim()
                .trim_end_matches('.');
            if !action.is_empty() && !outcome.is_empty() {
                return (action.to_string(), outcome.to_string());
            }
        }
        let action = rest.trim().trim_end_matches('.');
        if !action.is_empty() {
            return (action.to_string(), DEFAULT_OUTCOME.to_string());
        }
    }

    let first_sentence = flat
        .split('.')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("");
    if first_sentence.is_empty() {
        (DEFAULT_ACTION.to_string(), DEFAULT_OUTCOME.to_string())
    } else {
        (
            format!("the following handled: {first_sentence}"),
            DEFAULT_OUTCOME.to_string(),
        )
    }
}

/// Collapse the input to a single line and strip anything that could break
/// the output grammar (line breaks, a stray criteria header).
fn sanitize(text: &str) -> String {
    text.replace(CRITERIA_HEADER, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
