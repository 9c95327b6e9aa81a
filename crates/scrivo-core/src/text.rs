//! Text scrubbing between pipeline stages.
//!
//! Speech-to-text output tends to carry bracketed noise markers, hallucinated
//! XML-ish blobs, and filler words; enhancement backends sometimes leak their
//! reasoning blocks. Both are stripped before the text moves on.

use std::sync::OnceLock;

use regex::Regex;

fn tag_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // No backreference support in the `regex` crate, so opening and closing
    // tag names are not required to agree. Good enough for hallucinated blobs.
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>.*?</[^>]+>").expect("valid tag block regex"))
}

fn bracket_noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\[[^\]]*\]|\([^\)]*\)|\{[^\}]*\}").expect("valid bracket regex")
    })
}

fn filler_words_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(uh|um|uhm|umm|ah|eh|hmm|hm|mmm|mm)\b[,.]?")
            .expect("valid filler regex")
    })
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("valid whitespace regex"))
}

fn reasoning_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<thinking>.*?</thinking>|<think>.*?</think>|<reasoning>.*?</reasoning>")
            .expect("valid reasoning regex")
    })
}

/// Clean raw speech-to-text output before trigger detection and enhancement.
pub fn scrub_transcript(text: &str) -> String {
    let mut out = text.to_string();
    out = tag_block_re().replace_all(&out, "").to_string();
    out = bracket_noise_re().replace_all(&out, "").to_string();
    out = filler_words_re().replace_all(&out, "").to_string();
    out = whitespace_re().replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Clean enhancement backend output before insertion.
pub fn scrub_enhancement(text: &str) -> String {
    let out = reasoning_block_re().replace_all(text, "");
    out.trim().to_string()
}
