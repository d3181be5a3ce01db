use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Analysis field holding the lemma.
pub const LEMMA_FIELD: &str = "lex";
/// Analysis field holding the part of speech.
pub const POS_FIELD: &str = "gr.pos";

/// Identity of one word slot inside one rendered sentence, shown as `w<sentence>_<word>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WordId {
    pub sentence: usize,
    pub word: usize,
}

impl WordId {
    pub const fn new(sentence: usize, word: usize) -> Self {
        Self { sentence, word }
    }
}

impl fmt::Display for WordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}_{}", self.sentence, self.word)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Word,
    Punct,
    #[default]
    #[serde(other)]
    Other,
}

/// One analysis field value as the backend stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Other(Value),
}

impl FieldValue {
    /// Flattens the value for display; lists are joined with `", "`.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::List(items) => items.join(", "),
            FieldValue::Other(value) => value_text(value),
        }
    }
}

/// One candidate parse of a token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Analysis(BTreeMap<String, FieldValue>);

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn lemma(&self) -> Option<&FieldValue> {
        self.get(LEMMA_FIELD)
    }

    pub fn part_of_speech(&self) -> Option<&FieldValue> {
        self.get(POS_FIELD)
    }

    /// Every field except the lemma and part of speech, ordered by name.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0
            .iter()
            .filter(|(name, _)| name.as_str() != LEMMA_FIELD && name.as_str() != POS_FIELD)
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(skip)]
    pub index: usize,
    #[serde(rename = "wf", default)]
    pub surface: Option<String>,
    #[serde(rename = "wtype", default)]
    pub kind: TokenKind,
    #[serde(rename = "off_start", default)]
    pub offset_start: Option<usize>,
    #[serde(rename = "off_end", default)]
    pub offset_end: Option<usize>,
    #[serde(rename = "ana", default)]
    pub analyses: Vec<Analysis>,
}

impl Token {
    pub fn word(index: usize, surface: &str, offset_start: usize, offset_end: usize) -> Self {
        Self {
            index,
            surface: Some(surface.to_string()),
            kind: TokenKind::Word,
            offset_start: Some(offset_start),
            offset_end: Some(offset_end),
            analyses: Vec::new(),
        }
    }

    pub fn with_analysis(mut self, analysis: Analysis) -> Self {
        self.analyses.push(analysis);
        self
    }

    /// Parses one backend word record field by field. A malformed field degrades
    /// only itself: bad offsets drop the wrapper, a bad analysis empties its slot.
    pub fn from_value(index: usize, value: &Value) -> Self {
        let Some(record) = value.as_object() else {
            debug!(index, "word record is not an object");
            return Token {
                index,
                ..Token::default()
            };
        };
        let kind = match record.get("wtype") {
            None | Some(Value::Null) => TokenKind::default(),
            Some(raw) => TokenKind::deserialize(raw).unwrap_or_else(|err| {
                debug!(index, error = %err, "unreadable word type");
                TokenKind::Other
            }),
        };
        Token {
            index,
            surface: record.get("wf").and_then(scalar_text),
            kind,
            offset_start: record.get("off_start").and_then(as_offset),
            offset_end: record.get("off_end").and_then(as_offset),
            analyses: parse_analyses(index, record.get("ana")),
        }
    }

    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }

    /// Half-open character span, present only for non-empty, well-ordered offsets.
    pub fn span(&self) -> Option<(usize, usize)> {
        match (self.offset_start, self.offset_end) {
            (Some(start), Some(end)) if start < end => Some((start, end)),
            _ => None,
        }
    }
}

/// A sentence hit from the search backend, reduced to what rendering needs.
#[derive(Debug, Clone, Default)]
pub struct Sentence {
    pub number: usize,
    pub text: String,
    pub tokens: Vec<Token>,
    pub highlighted: Option<String>,
    pub match_tree: Option<Value>,
    pub relations_satisfied: bool,
    pub doc_id: Option<String>,
    pub lang: Option<String>,
}

impl Sentence {
    pub fn new(number: usize, text: impl Into<String>, tokens: Vec<Token>) -> Self {
        Self {
            number,
            text: text.into(),
            tokens,
            relations_satisfied: true,
            ..Self::default()
        }
    }

    /// Builds a sentence from one entry of `hits.hits`. Returns `None` when the hit
    /// has no `_source` record at all.
    pub fn from_hit(number: usize, hit: &Value) -> Option<Self> {
        let source = hit.get("_source")?.as_object()?;
        let text = source
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tokens = source
            .get("words")
            .and_then(Value::as_array)
            .map(|words| {
                words
                    .iter()
                    .enumerate()
                    .map(|(idx, word)| Token::from_value(idx, word))
                    .collect()
            })
            .unwrap_or_default();
        let highlighted = match hit.pointer("/highlight/text") {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Array(items)) => items.first().and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        let relations_satisfied = hit
            .get("relations_satisfied")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        Some(Self {
            number,
            text,
            tokens,
            highlighted,
            match_tree: hit.get("inner_hits").cloned(),
            relations_satisfied,
            doc_id: source.get("doc_id").and_then(scalar_text),
            lang: source.get("lang").and_then(scalar_text),
        })
    }

    pub fn with_highlight(mut self, highlighted: impl Into<String>) -> Self {
        self.highlighted = Some(highlighted.into());
        self
    }

    pub fn word_id(&self, index: usize) -> WordId {
        WordId::new(self.number, index)
    }
}

fn as_offset(value: &Value) -> Option<usize> {
    value.as_u64().and_then(|n| usize::try_from(n).ok())
}

// Unreadable analyses keep their slot as an empty analysis so that `_nested`
// analysis offsets from the match tree still line up.
fn parse_analyses(index: usize, raw: Option<&Value>) -> Vec<Analysis> {
    let items = match raw {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items.as_slice(),
        Some(single @ Value::Object(_)) => std::slice::from_ref(single),
        Some(_) => {
            debug!(index, "word analyses are not a list");
            return Vec::new();
        }
    };
    items
        .iter()
        .enumerate()
        .map(|(ana, item)| {
            Analysis::deserialize(item).unwrap_or_else(|err| {
                debug!(index, ana, error = %err, "unreadable analysis");
                Analysis::default()
            })
        })
        .collect()
}

/// Renders a string or number as text; other JSON shapes yield `None`.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Best-effort text form of any JSON value.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}
