//! Splitting a message into claim atoms.

use std::sync::Arc;

use crate::case::ProposedClaim;
use crate::llm::{LanguageModel, parse_json_reply};
use crate::tools::{ToolFailure, ToolOutcome};

/// Turns message text into factual and opinion claims.
pub trait Decomposer: Send + Sync {
    fn decompose(&self, message: &str) -> ToolOutcome<Vec<ProposedClaim>>;
}

const DECOMPOSE_SYSTEM: &str = "You split viral messages into checkable statements. \
Each statement must be self-contained and quote the message's own figures and names. \
Mark a statement FACTUAL if it could be proven true or false, OPINION if it is a \
judgement, feeling or call to action. Respond with a JSON array of \
{\"text\": string, \"kind\": \"FACTUAL\" | \"OPINION\"}.";

/// Model-backed decomposition.
pub struct LlmDecomposer {
    llm: Arc<dyn LanguageModel>,
}

impl LlmDecomposer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

impl Decomposer for LlmDecomposer {
    fn decompose(&self, message: &str) -> ToolOutcome<Vec<ProposedClaim>> {
        let reply = self
            .llm
            .generate(message, Some(DECOMPOSE_SYSTEM))
            .map_err(|e| ToolFailure::unavailable("decompose", e.to_string()))?;
        let claims: Vec<ProposedClaim> =
            parse_json_reply(&reply).map_err(|e| ToolFailure::malformed("decompose", e.to_string()))?;
        if claims.iter().all(|c| c.text.trim().is_empty()) {
            return Err(ToolFailure::malformed("decompose", "no claims in reply"));
        }
        Ok(claims)
    }
}

const OPINION_MARKERS: &[&str] = &[
    "i think",
    "i believe",
    "i feel",
    "in my opinion",
    "should",
    "shameful",
    "disgrace",
    "我覺得",
    "我认为",
    "我認為",
    "我觉得",
    "應該",
    "应该",
    "可惡",
    "太扯",
    "無恥",
    "丟臉",
];

/// Rule-based fallback: one claim per sentence, with opinion markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceDecomposer;

impl SentenceDecomposer {
    /// Sentences of `text`. A `.` only ends a sentence before whitespace,
    /// so amounts and URLs stay whole.
    pub fn sentences(text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            let ends = match c {
                '\n' | '。' | '！' | '？' | '!' | '?' => true,
                '.' => chars.peek().is_none_or(|n| n.is_whitespace()),
                _ => false,
            };
            if c != '\n' {
                current.push(c);
            }
            if ends {
                push_sentence(&mut sentences, &mut current);
            }
        }
        push_sentence(&mut sentences, &mut current);
        sentences
    }

    pub fn is_opinion(sentence: &str) -> bool {
        let lower = sentence.to_lowercase();
        OPINION_MARKERS.iter().any(|m| lower.contains(m))
    }
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let s = current.trim();
    if s.chars().filter(|c| c.is_alphanumeric()).count() >= 4 {
        sentences.push(s.to_string());
    }
    current.clear();
}

impl Decomposer for SentenceDecomposer {
    fn decompose(&self, message: &str) -> ToolOutcome<Vec<ProposedClaim>> {
        Ok(Self::sentences(message)
            .into_iter()
            .map(|s| {
                if Self::is_opinion(&s) {
                    ProposedClaim::opinion(s)
                } else {
                    ProposedClaim::factual(s)
                }
            })
            .collect())
    }
}
