//! Deterministic engine for tests.
//!
//! Rules:
//! - `repeated_words`: two identical adjacent words (case-insensitive), fixable.
//! - `shouting`: an all-caps word of two or more letters, no suggestion.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::engine::{Engine, EngineError};
use crate::handle::{Lint, LintConfig, LintKind, Span, Suggestion};

const COMMON_WORDS: &[&str] = &[
    "a", "an", "and", "are", "be", "for", "has", "have", "he", "hello", "i", "in", "is", "it",
    "not", "of", "on", "problem", "she", "string", "test", "that", "the", "their", "there",
    "they", "this", "to", "was", "we", "what", "with", "word", "words", "world", "you",
];

pub(crate) struct RepeatedWordEngine {
    config: LintConfig,
    delays: HashMap<String, Duration>,
}

impl RepeatedWordEngine {
    pub(crate) fn new() -> Self {
        Self {
            config: LintConfig::new()
                .with("repeated_words", Some(true))
                .with("shouting", None),
            delays: HashMap::new(),
        }
    }

    /// Make `lint(text)` take `delay` before answering.
    pub(crate) fn with_delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }
}

struct Word {
    start: usize,
    end: usize,
    text: String,
}

fn words(source: &[char]) -> Vec<Word> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in source.iter().enumerate() {
        match (c.is_alphabetic(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push(Word {
                    start: s,
                    end: i,
                    text: source[s..i].iter().collect(),
                });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push(Word {
            start: s,
            end: source.len(),
            text: source[s..].iter().collect(),
        });
    }
    out
}

fn english_ratio(text: &str) -> Option<f64> {
    let source: Vec<char> = text.chars().collect();
    let words = words(&source);
    if words.is_empty() {
        return None;
    }
    let known = words
        .iter()
        .filter(|w| COMMON_WORDS.contains(&w.text.to_lowercase().as_str()))
        .count();
    Some(known as f64 / words.len() as f64)
}

#[async_trait]
impl Engine for RepeatedWordEngine {
    async fn lint(&mut self, text: &str) -> Result<Vec<Lint>, EngineError> {
        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }

        let source: Vec<char> = text.chars().collect();
        let words = words(&source);
        let mut lints = Vec::new();

        if self.config.is_enabled("repeated_words", true) {
            for pair in words.windows(2) {
                let (first, second) = (&pair[0], &pair[1]);
                let gap_is_space = source[first.end..second.start]
                    .iter()
                    .all(|c| c.is_whitespace());
                if gap_is_space && first.text.to_lowercase() == second.text.to_lowercase() {
                    let span = Span::new(first.start, second.end);
                    lints.push(
                        Lint::new(span, LintKind::Repetition, "Did you mean to repeat this word?")
                            .with_suggestion(Suggestion::ReplaceWith(first.text.clone()))
                            .with_problem_text(span.content(&source)?),
                    );
                }
            }
        }

        if self.config.is_enabled("shouting", true) {
            for word in words.iter().filter(|w| w.text.chars().count() > 1) {
                if word.text.chars().all(|c| c.is_uppercase()) {
                    lints.push(
                        Lint::new(
                            Span::new(word.start, word.end),
                            LintKind::Style,
                            "Avoid writing whole words in capitals.",
                        )
                        .with_problem_text(word.text.clone()),
                    );
                }
            }
        }

        Ok(lints)
    }

    async fn is_likely_english(&mut self, text: &str) -> Result<bool, EngineError> {
        Ok(english_ratio(text).is_some_and(|ratio| ratio >= 0.5))
    }

    async fn isolate_english(&mut self, text: &str) -> Result<String, EngineError> {
        let kept: Vec<&str> = text
            .split_inclusive(['.', '!', '?'])
            .map(str::trim)
            .filter(|sentence| english_ratio(sentence).is_some_and(|ratio| ratio >= 0.5))
            .collect();
        Ok(kept.join(" "))
    }

    fn lint_config(&self) -> LintConfig {
        self.config.clone()
    }

    fn set_lint_config(&mut self, config: LintConfig) -> Result<(), EngineError> {
        if let Some((rule, _)) = config
            .iter()
            .find(|(rule, _)| *rule != "repeated_words" && *rule != "shouting")
        {
            return Err(EngineError::new(format!("unknown rule `{rule}`")));
        }
        self.config = config;
        Ok(())
    }
}

pub(crate) const LOREM_IPSUM: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat. Duis aute irure dolor in reprehenderit in voluptate velit esse cillum dolore eu fugiat nulla pariatur. Excepteur sint occaecat cupidatat non proident, sunt in culpa qui officia deserunt mollit anim id est laborum.";
