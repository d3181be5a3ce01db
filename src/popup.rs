use crate::model::{Analysis, FieldValue, Token};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Builds the hover payload for one word: its surface form followed by one block
/// per analysis, with the analyses in `matching` flagged as `popup_match`.
///
/// The result is raw HTML. It is escaped once, by whoever embeds it in an
/// attribute (see [`escape_attr`]).
pub fn build(token: &Token, matching: &BTreeSet<usize>) -> String {
    let mut popup = String::from(r#"<div class="popup_word">"#);
    if let Some(surface) = &token.surface {
        let _ = write!(popup, r#"<span class="popup_wf">{surface}</span>"#);
    }
    let numbered = token.analyses.len() > 1;
    for (idx, analysis) in token.analyses.iter().enumerate() {
        if analysis.is_empty() {
            continue;
        }
        popup.push_str(r#"<div class="popup_ana"#);
        if matching.contains(&idx) {
            popup.push_str(" popup_match");
        }
        popup.push_str(r#"">"#);
        if numbered {
            let _ = write!(popup, "{}. ", idx + 1);
        }
        popup.push_str(&analysis_body(analysis));
        popup.push_str("</div>");
    }
    popup.push_str("</div>");
    popup
}

fn analysis_body(analysis: &Analysis) -> String {
    let mut body = String::new();
    if let Some(lemma) = analysis.lemma() {
        let _ = write!(body, r#"<span class="popup_lex">{}</span> "#, lemma.display());
    }
    if let Some(pos) = analysis.part_of_speech() {
        let _ = write!(body, r#"<span class="popup_pos">{}</span> "#, pos.display());
    }
    for (name, value) in analysis.attributes() {
        push_field(&mut body, name, value);
    }
    body
}

fn push_field(body: &mut String, name: &str, value: &FieldValue) {
    let _ = write!(
        body,
        r#"<span class="popup_field">{name}: <span class="popup_value">{}</span></span>"#,
        value.display()
    );
}

/// Escapes a string for use inside a double-quoted attribute value.
pub fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 4);
    for ch in input.chars() {
        match ch {
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}
