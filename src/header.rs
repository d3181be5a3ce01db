use crate::compose::escape_text;
use crate::model::value_text;
use crate::popup::escape_attr;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Write;

pub type Metadata = Map<String, Value>;
/// In-memory document metadata keyed by document id.
pub type DocumentMap = HashMap<String, Metadata>;

/// Source of per-document metadata used for sentence headers.
pub trait DocumentStore: Sync {
    fn document_metadata(&self, doc_id: &str) -> Option<Metadata>;
}

/// A store that knows no documents; every header comes out empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDocuments;

impl DocumentStore for NoDocuments {
    fn document_metadata(&self, _doc_id: &str) -> Option<Metadata> {
        None
    }
}

impl DocumentStore for DocumentMap {
    fn document_metadata(&self, doc_id: &str) -> Option<Metadata> {
        self.get(doc_id).cloned()
    }
}

impl<F> DocumentStore for F
where
    F: Fn(&str) -> Option<Metadata> + Sync,
{
    fn document_metadata(&self, doc_id: &str) -> Option<Metadata> {
        self(doc_id)
    }
}

/// Unwraps a search-backend document lookup (`hits.hits[0]._source`).
pub fn metadata_from_response(response: &Value) -> Option<Metadata> {
    response
        .pointer("/hits/hits/0/_source")
        .and_then(Value::as_object)
        .cloned()
}

/// Builds the header shown above a sentence: title, author and dates of the
/// document it came from, plus a `data-meta` tooltip listing `viewable_meta`.
pub fn build<D>(doc_id: Option<&str>, documents: &D, viewable_meta: &[String]) -> String
where
    D: DocumentStore + ?Sized,
{
    let Some(meta) = doc_id.and_then(|id| documents.document_metadata(id)) else {
        return r#"<span class="context_header" data-meta=""></span>"#.to_string();
    };

    let mut body = String::new();
    match meta.get("title") {
        Some(title) => {
            let _ = write!(body, r#"<span class="ch_title">{}</span>"#, field_html(title));
        }
        None => body.push_str(r#"<span class="ch_title">-</span>"#),
    }
    if let Some(author) = meta.get("author") {
        let _ = write!(body, r#"<span class="ch_author">{}</span>"#, field_html(author));
    }
    if let Some(issue) = meta.get("issue").map(value_text).filter(|s| !s.is_empty()) {
        let _ = write!(body, r#"<span class="ch_date">{}</span>"#, escape_text(&issue));
    }
    if let (Some(year1), Some(year2)) = (meta.get("year1"), meta.get("year2")) {
        let mut dates = field_html(year1);
        if year1 != year2 {
            let _ = write!(dates, "&ndash;{}", field_html(year2));
        }
        let _ = write!(body, r#"<span class="ch_date">{dates}</span>"#);
    }

    let mut tooltip = String::new();
    for field in viewable_meta {
        if let Some(value) = meta.get(field) {
            let _ = write!(tooltip, "{field}: {}\\n", value_text(value));
        }
    }
    format!(
        r#"<span class="context_header" data-meta="{}">{body}</span>"#,
        escape_attr(&tooltip)
    )
}

fn field_html(value: &Value) -> String {
    escape_text(&value_text(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> DocumentMap {
        let mut docs = DocumentMap::new();
        let meta = json!({
            "title": "War & Peace",
            "author": "L. Tolstoy",
            "issue": "",
            "year1": 1865,
            "year2": 1869,
            "genre": "novel \"epic\""
        });
        docs.insert("7".to_string(), meta.as_object().unwrap().clone());
        docs
    }

    #[test]
    fn full_header() {
        let header = build(Some("7"), &store(), &["genre".to_string(), "missing".to_string()]);
        assert_eq!(
            header,
            concat!(
                r#"<span class="context_header" data-meta="genre: novel &quot;epic&quot;\n">"#,
                r#"<span class="ch_title">War &amp; Peace</span>"#,
                r#"<span class="ch_author">L. Tolstoy</span>"#,
                r#"<span class="ch_date">1865&ndash;1869</span>"#,
                "</span>"
            )
        );
    }

    #[test]
    fn missing_fields_are_omitted() {
        let docs = |_: &str| json!({"year1": 2001, "year2": 2001}).as_object().cloned();
        let header = build(Some("any"), &docs, &[]);
        assert_eq!(
            header,
            r#"<span class="context_header" data-meta=""><span class="ch_title">-</span><span class="ch_date">2001</span></span>"#
        );
    }

    #[test]
    fn unknown_document_gives_empty_header() {
        let empty = r#"<span class="context_header" data-meta=""></span>"#;
        assert_eq!(build(Some("8"), &store(), &[]), empty);
        assert_eq!(build(None, &store(), &[]), empty);
        assert_eq!(build(Some("7"), &NoDocuments, &[]), empty);
    }

    #[test]
    fn unwraps_backend_document_response() {
        let response = json!({"hits": {"hits": [{"_source": {"title": "T"}}]}});
        let meta = metadata_from_response(&response).unwrap();
        assert_eq!(meta.get("title"), Some(&json!("T")));
        assert!(metadata_from_response(&json!({"hits": {"hits": []}})).is_none());
    }
}
