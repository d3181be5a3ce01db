use crate::compose;
use crate::header::{self, DocumentStore, NoDocuments};
use crate::matches::{self, MatchOffsets};
use crate::model::Sentence;
use crate::settings::CorpusSettings;
use crate::word_table;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

pub const NOTHING_FOUND: &str = "Nothing found.";

/// One rendered sentence of a result page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceContext {
    pub header: Option<String>,
    pub language: String,
    pub text: String,
    pub relations_satisfied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceBatch {
    pub occurrences: u64,
    pub sentences: u64,
    pub docs: u64,
    pub message: String,
    pub contexts: Vec<SentenceContext>,
}

impl SentenceBatch {
    pub fn nothing_found() -> Self {
        Self {
            occurrences: 0,
            sentences: 0,
            docs: 0,
            message: NOTHING_FOUND.to_string(),
            contexts: Vec::new(),
        }
    }

    pub fn is_nothing_found(&self) -> bool {
        self.message == NOTHING_FOUND
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBatch {
    pub occurrences: u64,
    pub sentences: u64,
    pub docs: u64,
    pub message: String,
    pub words: Vec<String>,
}

impl WordBatch {
    pub fn nothing_found() -> Self {
        Self {
            occurrences: 0,
            sentences: 0,
            docs: 0,
            message: NOTHING_FOUND.to_string(),
            words: Vec::new(),
        }
    }
}

/// Turns backend search responses into rendered result pages.
pub struct ResultViewer<D = NoDocuments> {
    settings: CorpusSettings,
    documents: D,
}

impl ResultViewer<NoDocuments> {
    pub fn without_documents(settings: CorpusSettings) -> Self {
        Self::new(settings, NoDocuments)
    }
}

impl<D: DocumentStore> ResultViewer<D> {
    pub fn new(settings: CorpusSettings, documents: D) -> Self {
        Self {
            settings,
            documents,
        }
    }

    pub fn settings(&self) -> &CorpusSettings {
        &self.settings
    }

    /// Renders a sentence search response. Hits are rendered in parallel; the
    /// position of a hit in the page is its sentence number.
    pub fn process_sentences(&self, response: &Value) -> SentenceBatch {
        let Some(total) = total_hits(response).filter(|&total| total > 0) else {
            debug!("sentence response reports no hits");
            return SentenceBatch::nothing_found();
        };
        let hits = page_hits(response);
        let rendered: Vec<(SentenceContext, usize)> = hits
            .par_iter()
            .enumerate()
            .map(|(number, hit)| self.render_hit(hit, number, true))
            .collect();
        let occurrences: u64 = rendered.iter().map(|(_, matched)| *matched as u64).sum();
        let contexts: Vec<SentenceContext> =
            rendered.into_iter().map(|(context, _)| context).collect();
        info!(
            total,
            rendered = contexts.len(),
            occurrences,
            "Rendered sentence page"
        );
        SentenceBatch {
            occurrences,
            sentences: total,
            docs: doc_count(response),
            message: String::new(),
            contexts,
        }
    }

    /// Renders one entry of `hits.hits`.
    pub fn process_sentence(&self, hit: &Value, number: usize, with_header: bool) -> SentenceContext {
        self.render_hit(hit, number, with_header).0
    }

    /// Renders a word-frequency search response as table rows.
    pub fn process_words(&self, response: &Value) -> WordBatch {
        let Some(total) = total_hits(response).filter(|&total| total > 0) else {
            debug!("word response reports no hits");
            return WordBatch::nothing_found();
        };
        let words: Vec<String> = page_hits(response)
            .par_iter()
            .filter_map(word_table::render_row)
            .collect();
        info!(total, rendered = words.len(), "Rendered word page");
        WordBatch {
            occurrences: total,
            sentences: 0,
            docs: doc_count(response),
            message: String::new(),
            words,
        }
    }

    fn render_hit(&self, hit: &Value, number: usize, with_header: bool) -> (SentenceContext, usize) {
        let Some(sentence) = Sentence::from_hit(number, hit) else {
            debug!(number, "hit has no source record");
            return (self.empty_context(None, true), 0);
        };
        let language = self.settings.language_name(sentence.lang.as_deref().unwrap_or_default());
        if sentence.text.is_empty() {
            debug!(number, "hit has no sentence text");
            return (self.empty_context(Some(language), sentence.relations_satisfied), 0);
        }

        let matches = sentence
            .match_tree
            .as_ref()
            .map(|tree| matches::extract(tree, number))
            .unwrap_or_else(MatchOffsets::new);
        let header = with_header.then(|| {
            header::build(
                sentence.doc_id.as_deref(),
                &self.documents,
                &self.settings.viewable_meta,
            )
        });
        let text = compose::render_sentence(&sentence, &matches);
        let context = SentenceContext {
            header,
            language,
            text,
            relations_satisfied: sentence.relations_satisfied,
        };
        (context, matches.len())
    }

    fn empty_context(&self, language: Option<String>, relations_satisfied: bool) -> SentenceContext {
        SentenceContext {
            header: None,
            language: language.unwrap_or_default(),
            text: String::new(),
            relations_satisfied,
        }
    }
}

/// `hits.total`, either a bare count or `{"value": n}`.
fn total_hits(response: &Value) -> Option<u64> {
    match response.pointer("/hits/total")? {
        Value::Number(number) => number.as_u64(),
        Value::Object(total) => total.get("value").and_then(Value::as_u64),
        _ => None,
    }
}

fn doc_count(response: &Value) -> u64 {
    response
        .pointer("/aggregations/agg_ndocs/value")
        .and_then(|value| value.as_u64().or_else(|| value.as_f64().map(|v| v as u64)))
        .unwrap_or(0)
}

fn page_hits(response: &Value) -> &[Value] {
    response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}
