//! Renders corpus search hits into annotated HTML.
//!
//! A sentence hit carries raw text, a word table with character offsets, the
//! backend highlighter's `<em>`-marked copy of the text and an `inner_hits` tree
//! explaining which words matched which query term. [`matches::extract`] reads the
//! tree, [`compose::render`] merges everything into flat word wrappers, and
//! [`ResultViewer`] does this for whole result pages.

pub mod batch;
pub mod compose;
mod error;
pub mod header;
pub mod matches;
pub mod model;
pub mod popup;
pub mod settings;
#[cfg(feature = "web")]
pub mod web;
pub mod word_table;

pub use batch::{NOTHING_FOUND, ResultViewer, SentenceBatch, SentenceContext, WordBatch};
pub use compose::{BoundaryEvents, SpanId, SweepState, render, render_sentence};
pub use error::{Result, ViewerError};
pub use header::{DocumentMap, DocumentStore, Metadata, NoDocuments};
pub use matches::{MatchOffsets, TermMatch, extract};
pub use model::{Analysis, FieldValue, Sentence, Token, TokenKind, WordId};
pub use settings::{CorpusSettings, Languages};
