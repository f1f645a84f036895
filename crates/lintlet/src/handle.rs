//! Engine-owned value types that cross the worker boundary as opaque handles.
//!
//! None of these are sent by reference. Each one exports itself to JSON and is
//! rebuilt from that JSON on the other side (see [`OpaqueHandle`]).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{CodecError, TypeTag};

/// Export/import capability shared by every handle kind.
pub trait OpaqueHandle: Sized {
    /// Tag written next to the exported payload.
    const KIND: TypeTag;

    /// Produce a self-contained encoding of this handle.
    fn export(&self) -> Result<String, CodecError>;

    /// Rebuild a handle from [`OpaqueHandle::export`] output.
    fn import(payload: &str) -> Result<Self, CodecError>;
}

macro_rules! json_handle {
    ($name:ident) => {
        impl OpaqueHandle for $name {
            const KIND: TypeTag = TypeTag::$name;

            fn export(&self) -> Result<String, CodecError> {
                serde_json::to_string(self)
                    .map_err(|e| CodecError::unsupported(format!("{}: {}", Self::KIND, e)))
            }

            fn import(payload: &str) -> Result<Self, CodecError> {
                serde_json::from_str(payload).map_err(|e| CodecError::invalid(Self::KIND, e))
            }
        }
    };
}

json_handle!(Span);
json_handle!(Suggestion);
json_handle!(Lint);
json_handle!(LintConfig);

/// Half-open range of character offsets, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that the span lies inside a source of `source_len` characters.
    pub fn check_within(&self, source_len: usize) -> Result<(), SpanOutOfBounds> {
        if self.start <= self.end && self.end <= source_len {
            Ok(())
        } else {
            Err(SpanOutOfBounds {
                span: *self,
                source_len,
            })
        }
    }

    /// Characters of `source` covered by this span.
    pub fn content(&self, source: &[char]) -> Result<String, SpanOutOfBounds> {
        self.check_within(source.len())?;
        Ok(source[self.start..self.end].iter().collect())
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("span {span} is out of bounds for text of {source_len} characters")]
pub struct SpanOutOfBounds {
    pub span: Span,
    pub source_len: usize,
}

/// Discriminant of a [`Suggestion`]. Values are stable across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuggestionKind {
    Replace = 0,
    Remove = 1,
}

/// A fix the engine proposes for a [`Lint`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suggestion {
    ReplaceWith(String),
    Remove,
}

impl Suggestion {
    pub fn kind(&self) -> SuggestionKind {
        match self {
            Self::ReplaceWith(_) => SuggestionKind::Replace,
            Self::Remove => SuggestionKind::Remove,
        }
    }

    /// Text that will replace the problem. Empty for [`Suggestion::Remove`].
    pub fn replacement_text(&self) -> &str {
        match self {
            Self::ReplaceWith(text) => text,
            Self::Remove => "",
        }
    }

    /// Apply the suggestion to `source` in place.
    pub fn apply(&self, span: Span, source: &mut Vec<char>) -> Result<(), SpanOutOfBounds> {
        span.check_within(source.len())?;
        match self {
            Self::ReplaceWith(text) => {
                source.splice(span.start..span.end, text.chars());
            }
            Self::Remove => {
                source.drain(span.start..span.end);
            }
        }
        Ok(())
    }
}

/// General category of a lint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LintKind {
    Capitalization,
    Enhancement,
    Formatting,
    Miscellaneous,
    Readability,
    Repetition,
    Spelling,
    Style,
    WordChoice,
}

impl LintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capitalization => "Capitalization",
            Self::Enhancement => "Enhancement",
            Self::Formatting => "Formatting",
            Self::Miscellaneous => "Miscellaneous",
            Self::Readability => "Readability",
            Self::Repetition => "Repetition",
            Self::Spelling => "Spelling",
            Self::Style => "Style",
            Self::WordChoice => "WordChoice",
        }
    }
}

impl fmt::Display for LintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lint {
    span: Span,
    lint_kind: LintKind,
    message: String,
    #[serde(default)]
    suggestions: Vec<Suggestion>,
    /// Source text under `span`, captured when the lint was produced.
    #[serde(default)]
    problem_text: String,
}

impl Lint {
    pub fn new(span: Span, lint_kind: LintKind, message: impl Into<String>) -> Self {
        Self {
            span,
            lint_kind,
            message: message.into(),
            suggestions: Vec::new(),
            problem_text: String::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn with_problem_text(mut self, text: impl Into<String>) -> Self {
        self.problem_text = text.into();
        self
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn lint_kind(&self) -> LintKind {
        self.lint_kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn suggestion_count(&self) -> usize {
        self.suggestions.len()
    }

    pub fn problem_text(&self) -> &str {
        &self.problem_text
    }
}

/// Rule configuration: rule name to enabled, disabled, or unset (engine default).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LintConfig(BTreeMap<String, Option<bool>>);

impl LintConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit setting for `rule`, `None` if absent or unset.
    pub fn get(&self, rule: &str) -> Option<bool> {
        self.0.get(rule).copied().flatten()
    }

    pub fn set(&mut self, rule: impl Into<String>, enabled: Option<bool>) {
        self.0.insert(rule.into(), enabled);
    }

    pub fn with(mut self, rule: impl Into<String>, enabled: Option<bool>) -> Self {
        self.set(rule, enabled);
        self
    }

    /// Whether `rule` is on, falling back to `default` when unset.
    pub fn is_enabled(&self, rule: &str, default: bool) -> bool {
        self.get(rule).unwrap_or(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<bool>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Option<bool>)> for LintConfig {
    fn from_iter<I: IntoIterator<Item = (String, Option<bool>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_len_and_display() {
        let span = Span::new(123, 321);
        assert_eq!(span.len(), 198);
        assert!(!span.is_empty());
        assert_eq!(span.to_string(), "[123, 321)");
        assert!(Span::new(4, 4).is_empty());
    }

    #[test]
    fn span_content_checks_bounds() {
        let source: Vec<char> = "hello world".chars().collect();
        assert_eq!(Span::new(6, 11).content(&source).unwrap(), "world");

        let err = Span::new(6, 12).content(&source).unwrap_err();
        assert_eq!(err.source_len, 11);
        assert_eq!(
            err.to_string(),
            "span [6, 12) is out of bounds for text of 11 characters"
        );
    }

    #[test]
    fn remove_suggestion_drops_span() {
        let mut source: Vec<char> = "The the problem".chars().collect();
        Suggestion::Remove
            .apply(Span::new(3, 7), &mut source)
            .unwrap();
        assert_eq!(source.iter().collect::<String>(), "The problem");
    }

    #[test]
    fn replace_suggestion_handles_length_change() {
        let mut source: Vec<char> = "an test".chars().collect();
        Suggestion::ReplaceWith("a".to_string())
            .apply(Span::new(0, 2), &mut source)
            .unwrap();
        assert_eq!(source.iter().collect::<String>(), "a test");

        let mut source: Vec<char> = "a test".chars().collect();
        Suggestion::ReplaceWith("one".to_string())
            .apply(Span::new(0, 1), &mut source)
            .unwrap();
        assert_eq!(source.iter().collect::<String>(), "one test");
    }

    #[test]
    fn suggestion_kind_and_text() {
        let replace = Suggestion::ReplaceWith("there".to_string());
        assert_eq!(replace.kind(), SuggestionKind::Replace);
        assert_eq!(replace.replacement_text(), "there");
        assert_eq!(Suggestion::Remove.kind(), SuggestionKind::Remove);
        assert_eq!(Suggestion::Remove.replacement_text(), "");
        assert_eq!(SuggestionKind::Replace as u8, 0);
        assert_eq!(SuggestionKind::Remove as u8, 1);
    }

    #[test]
    fn lint_export_import_preserves_accessors() {
        let lint = Lint::new(Span::new(8, 10), LintKind::Spelling, "Did you mean `a`?")
            .with_suggestion(Suggestion::ReplaceWith("a".to_string()))
            .with_problem_text("an");

        let back = Lint::import(&lint.export().unwrap()).unwrap();
        assert_eq!(back.message(), lint.message());
        assert_eq!(back.lint_kind(), lint.lint_kind());
        assert_eq!(back.span(), lint.span());
        assert_eq!(back.suggestion_count(), 1);
        assert_eq!(back.problem_text(), "an");
    }

    #[test]
    fn lint_config_exports_unset_rules_as_null() {
        let config = LintConfig::new()
            .with("repeated_words", Some(true))
            .with("spell_check", None);

        insta::assert_snapshot!(config.export().unwrap(), @r#"{"repeated_words":true,"spell_check":null}"#);
        assert!(config.is_enabled("repeated_words", false));
        assert!(!config.is_enabled("spell_check", false));
        assert!(config.is_enabled("missing", true));
    }

    #[test]
    fn import_rejects_wrong_shape() {
        let err = Span::import(r#"{"start":1}"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidPayload { kind: TypeTag::Span, .. }));
    }
}
