use crate::compose::escape_text;
use crate::model::Token;
use crate::popup;
use serde_json::Value;
use std::collections::BTreeSet;

/// Renders one word-frequency hit as a results table row. Returns `None` when the
/// hit carries no `_source` record.
pub fn render_row(hit: &Value) -> Option<String> {
    let source = hit.get("_source").filter(|source| source.is_object())?;
    let token = Token::from_value(0, source);
    let surface = token.surface.as_deref().unwrap_or_default();
    let popup = popup::escape_attr(&popup::build(&token, &BTreeSet::new()));
    Some(format!(
        concat!(
            r#"<tr><td><span class="word" data-ana="{popup}">{word}</span></td>"#,
            "<td>{freq}</td><td>{rank}</td><td>{n_sents}</td><td>{n_docs}</td>",
            r#"<td><span class="search_w" data-wf="{wf}">&gt;&gt; GO!</span></td></tr>"#
        ),
        popup = popup,
        word = escape_text(surface),
        freq = count(source, "freq"),
        rank = count(source, "rank"),
        n_sents = count(source, "n_sents"),
        n_docs = count(source, "n_docs"),
        wf = popup::escape_attr(surface),
    ))
}

fn count(source: &Value, field: &str) -> String {
    match source.get(field) {
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(text)) => escape_text(text),
        _ => "0".to_string(),
    }
}
