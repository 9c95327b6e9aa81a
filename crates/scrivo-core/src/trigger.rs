//! Trigger-word detection over raw transcripts.
//!
//! A trigger word spoken anywhere in the dictation selects its prompt for
//! that session only and forces enhancement on, regardless of the effective
//! configuration. Prompts are scanned in library insertion order, each
//! prompt's trigger words in declaration order; the first hit wins and at
//! most one trigger applies per session. Every whole-token occurrence of the
//! winning trigger is removed from the text that proceeds downstream.

use crate::config::PromptTemplate;
use crate::types::PromptId;

/// Outcome of scanning one transcript against the prompt library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDecision {
    /// Prompt selected for this session, if a trigger fired.
    pub selected_prompt: Option<PromptId>,
    /// Whether enhancement must run even if the effective config disables it.
    pub force_enhancement: bool,
    /// Transcript with the winning trigger tokens removed; otherwise the
    /// trimmed input.
    pub text: String,
    /// The trigger word that fired.
    pub trigger_word: Option<String>,
}

/// Scan `transcript` for trigger words from `prompts`.
///
/// Matching is case-insensitive and whole-token: "rewrite" fires on
/// "Rewrite," but not on "rewrites". Multi-word triggers match a window of
/// consecutive tokens. Surrounding `, . ! ? ; :` punctuation is ignored for
/// comparison.
pub fn apply_trigger_words(transcript: &str, prompts: &[PromptTemplate]) -> TriggerDecision {
    for prompt in prompts {
        for raw in &prompt.trigger_words {
            let trigger = raw.trim();
            if trigger.is_empty() {
                continue;
            }
            if let Some(stripped) = strip_all_occurrences(transcript, trigger) {
                tracing::debug!(
                    trigger,
                    prompt = %prompt.title,
                    "trigger word fired"
                );
                return TriggerDecision {
                    selected_prompt: Some(prompt.id.clone()),
                    force_enhancement: true,
                    text: stripped,
                    trigger_word: Some(trigger.to_string()),
                };
            }
        }
    }

    TriggerDecision {
        selected_prompt: None,
        force_enhancement: false,
        text: transcript.trim().to_string(),
        trigger_word: None,
    }
}

/// Remove every whole-token occurrence of `trigger` from `text`.
/// Returns `None` when the trigger does not occur.
fn strip_all_occurrences(text: &str, trigger: &str) -> Option<String> {
    let want: Vec<String> = trigger
        .split_whitespace()
        .map(|w| core_token(w).to_lowercase())
        .collect();
    if want.is_empty() {
        return None;
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut kept: Vec<&str> = Vec::with_capacity(tokens.len());
    let mut hits = 0usize;
    let mut i = 0usize;
    while i < tokens.len() {
        if window_matches(&tokens[i..], &want) {
            hits += 1;
            i += want.len();
        } else {
            kept.push(tokens[i]);
            i += 1;
        }
    }

    if hits == 0 {
        None
    } else {
        Some(kept.join(" "))
    }
}

fn window_matches(tokens: &[&str], want: &[String]) -> bool {
    tokens.len() >= want.len()
        && want
            .iter()
            .zip(tokens)
            .all(|(w, tok)| core_token(tok).to_lowercase() == *w)
}

/// Strip the sentence punctuation that speech-to-text attaches to tokens.
fn core_token(token: &str) -> &str {
    token.trim_matches(|c: char| matches!(c, ',' | '.' | '!' | '?' | ';' | ':'))
}
