//! Span compositor: merges word boundaries and highlighter markers into one set
//! of boundary events, then sweeps the sentence once emitting flat, properly
//! nested `<span class="word ...">` wrappers.
//!
//! Offsets are character offsets into the raw sentence text. Every wrapper covers
//! a run of text with a constant set of open spans; whenever that set changes the
//! current wrapper is closed and a new one opened, so wrappers never interleave.

use crate::matches::MatchOffsets;
use crate::model::{Sentence, Token, WordId};
use crate::popup;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};

pub const HIGHLIGHT_OPEN: &str = "<em>";
pub const HIGHLIGHT_CLOSE: &str = "</em>";
const HIGHLIGHT_CLASS: &str = "smatch";
const LINE_BREAK: &str = "<br>";
const BLANK_LINE: &str = r#"<span class="newline"></span>"#;
const WRAPPER_CLOSE: &str = "</span>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpanId {
    Word(WordId),
    /// A fragment the backend highlighter marked.
    Highlight,
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanId::Word(word) => write!(f, "{word}"),
            SpanId::Highlight => f.write_str(HIGHLIGHT_CLASS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundaryEvents {
    pub opens: BTreeMap<usize, BTreeSet<SpanId>>,
    pub closes: BTreeMap<usize, BTreeSet<SpanId>>,
}

impl BoundaryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, offset: usize, id: SpanId) {
        self.opens.entry(offset).or_default().insert(id);
    }

    pub fn close(&mut self, offset: usize, id: SpanId) {
        self.closes.entry(offset).or_default().insert(id);
    }

    /// Reads highlighter markers out of `marked` and records them at their offsets
    /// in the marker-free text.
    pub fn from_highlighted(marked: &str) -> Self {
        let mut events = Self::new();
        let mut consumed = 0usize;
        let mut pending_open = None;
        for (position, (byte, _)) in marked.char_indices().enumerate() {
            let rest = &marked[byte..];
            if rest.starts_with(HIGHLIGHT_OPEN) {
                let offset = position - consumed;
                events.open(offset, SpanId::Highlight);
                pending_open = Some(offset);
                consumed += HIGHLIGHT_OPEN.len();
            } else if rest.starts_with(HIGHLIGHT_CLOSE) {
                let offset = position - consumed;
                if pending_open == Some(offset) {
                    // `<em></em>` marks nothing.
                    events.remove_open(offset, SpanId::Highlight);
                } else {
                    events.close(offset, SpanId::Highlight);
                }
                pending_open = None;
                consumed += HIGHLIGHT_CLOSE.len();
            }
        }
        events
    }

    /// Adds one open and one close event per word token with a usable span.
    pub fn add_tokens(&mut self, tokens: &[Token], sentence: usize) {
        for token in tokens.iter().filter(|token| token.is_word()) {
            let Some((start, end)) = token.span() else {
                continue;
            };
            let id = SpanId::Word(WordId::new(sentence, token.index));
            self.open(start, id);
            self.close(end, id);
        }
    }

    /// Moves highlight boundaries that fall strictly inside a word outward to that
    /// word's edges, so a highlight never splits a word.
    pub fn snap_highlights(&mut self, tokens: &[Token]) {
        let spans: Vec<(usize, usize)> = tokens
            .iter()
            .filter(|token| token.is_word())
            .filter_map(Token::span)
            .collect();
        let inside = |offset: usize| {
            spans
                .iter()
                .copied()
                .find(|&(start, end)| start < offset && offset < end)
        };

        let opens: Vec<usize> = highlight_offsets(&self.opens);
        for offset in opens {
            if let Some((start, _)) = inside(offset) {
                self.remove_open(offset, SpanId::Highlight);
                self.open(start, SpanId::Highlight);
            }
        }
        let closes: Vec<usize> = highlight_offsets(&self.closes);
        for offset in closes {
            if let Some((_, end)) = inside(offset) {
                remove_event(&mut self.closes, offset, SpanId::Highlight);
                self.close(end, SpanId::Highlight);
            }
        }
    }

    pub fn merge(&mut self, other: BoundaryEvents) {
        for (offset, ids) in other.opens {
            self.opens.entry(offset).or_default().extend(ids);
        }
        for (offset, ids) in other.closes {
            self.closes.entry(offset).or_default().extend(ids);
        }
    }

    pub fn has_events_at(&self, offset: usize) -> bool {
        self.opens.contains_key(&offset) || self.closes.contains_key(&offset)
    }

    fn remove_open(&mut self, offset: usize, id: SpanId) {
        remove_event(&mut self.opens, offset, id);
    }
}

fn highlight_offsets(events: &BTreeMap<usize, BTreeSet<SpanId>>) -> Vec<usize> {
    events
        .iter()
        .filter(|(_, ids)| ids.contains(&SpanId::Highlight))
        .map(|(&offset, _)| offset)
        .collect()
}

fn remove_event(events: &mut BTreeMap<usize, BTreeSet<SpanId>>, offset: usize, id: SpanId) {
    if let Some(ids) = events.get_mut(&offset) {
        ids.remove(&id);
        if ids.is_empty() {
            events.remove(&offset);
        }
    }
}

/// What a boundary did to the wrapper currently being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transition {
    pub close_wrapper: bool,
    pub open_wrapper: bool,
}

/// The set of spans open at the sweep position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepState {
    open: BTreeSet<SpanId>,
}

impl SweepState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies all closes, then all opens, at one offset.
    pub fn step(
        &mut self,
        closing: Option<&BTreeSet<SpanId>>,
        opening: Option<&BTreeSet<SpanId>>,
    ) -> Transition {
        let close_wrapper = !self.open.is_empty();
        if close_wrapper {
            if let Some(closing) = closing {
                self.open.retain(|id| !closing.contains(id));
            }
        }
        if let Some(opening) = opening {
            self.open.extend(opening.iter().copied());
        }
        Transition {
            close_wrapper,
            open_wrapper: !self.open.is_empty() && (close_wrapper || opening.is_some()),
        }
    }

    pub fn open_spans(&self) -> &BTreeSet<SpanId> {
        &self.open
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

/// Renders one sentence. `highlighted` is the backend highlighter's copy of
/// `text` with inline `<em>` markers, when there is one.
pub fn render(
    text: &str,
    tokens: &[Token],
    matches: &MatchOffsets,
    highlighted: Option<&str>,
    sentence: usize,
) -> String {
    let mut events = highlighted
        .map(BoundaryEvents::from_highlighted)
        .unwrap_or_default();
    events.snap_highlights(tokens);
    events.add_tokens(tokens, sentence);

    let by_index: BTreeMap<usize, &Token> =
        tokens.iter().map(|token| (token.index, token)).collect();
    let chars: Vec<char> = text.chars().collect();
    let trailing_newlines_from = chars
        .iter()
        .rposition(|&ch| ch != '\n')
        .map_or(0, |last| last + 1);

    let mut out = String::with_capacity(text.len() * 2);
    let mut state = SweepState::new();
    for (offset, &ch) in chars.iter().enumerate() {
        if events.has_events_at(offset) {
            let transition = state.step(events.closes.get(&offset), events.opens.get(&offset));
            if transition.close_wrapper {
                out.push_str(WRAPPER_CLOSE);
            }
            if transition.open_wrapper {
                out.push_str(&wrapper_open(state.open_spans(), &by_index, matches));
            }
        }
        match ch {
            '\n' if offset == 0 || offset >= trailing_newlines_from => out.push_str(BLANK_LINE),
            '\n' => out.push_str(LINE_BREAK),
            other => push_text_char(&mut out, other),
        }
    }
    if !state.is_empty() {
        out.push_str(WRAPPER_CLOSE);
    }
    out
}

pub fn render_sentence(sentence: &Sentence, matches: &MatchOffsets) -> String {
    render(
        &sentence.text,
        &sentence.tokens,
        matches,
        sentence.highlighted.as_deref(),
        sentence.number,
    )
}

fn wrapper_open(
    open: &BTreeSet<SpanId>,
    tokens: &BTreeMap<usize, &Token>,
    matches: &MatchOffsets,
) -> String {
    let classes = open
        .iter()
        .map(|id| span_classes(id, matches))
        .collect::<Vec<_>>()
        .join(" ");
    let popups = open_popups(open, tokens, matches);
    format!(
        r#"<span class="word {classes}" data-ana="{}">"#,
        popup::escape_attr(&popups)
    )
}

fn span_classes(id: &SpanId, matches: &MatchOffsets) -> String {
    let mut classes = id.to_string();
    if let SpanId::Word(word) = id {
        let terms = matches.terms(word);
        if !terms.is_empty() {
            classes.push_str(" wmatch");
            for term in terms {
                let _ = write!(classes, " wmatch_{term}");
            }
        }
    }
    classes
}

// Word ids carry the token's own index, which need not be its slice position.
fn open_popups(
    open: &BTreeSet<SpanId>,
    tokens: &BTreeMap<usize, &Token>,
    matches: &MatchOffsets,
) -> String {
    let mut popups = String::new();
    for id in open {
        let SpanId::Word(word) = id else {
            continue;
        };
        let Some(token) = tokens.get(&word.word).filter(|token| token.is_word()) else {
            continue;
        };
        popups.push_str(&popup::build(token, &matches.matching_analyses(word)));
    }
    popups
}

fn push_text_char(out: &mut String, ch: char) {
    match ch {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        other => out.push(other),
    }
}

/// Escapes text content the way the sweep escapes sentence characters.
pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        push_text_char(&mut out, ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::TermMatch;
    use crate::model::{Analysis, FieldValue};

    fn word(sentence: usize, index: usize) -> SpanId {
        SpanId::Word(WordId::new(sentence, index))
    }

    fn cat_and_dog() -> Vec<Token> {
        vec![Token::word(0, "cat", 0, 3), Token::word(1, "dog", 8, 11)]
    }

    #[test]
    fn wraps_matched_and_plain_words() {
        let matches: MatchOffsets = [(WordId::new(0, 0), TermMatch::new("w0", None))]
            .into_iter()
            .collect();
        let html = render("cat and dog", &cat_and_dog(), &matches, None, 0);
        let cat_popup = popup::escape_attr(&popup::build(&cat_and_dog()[0], &BTreeSet::new()));
        let dog_popup = popup::escape_attr(&popup::build(&cat_and_dog()[1], &BTreeSet::new()));
        assert_eq!(
            html,
            format!(
                r#"<span class="word w0_0 wmatch wmatch_w0" data-ana="{cat_popup}">cat</span> and <span class="word w0_1" data-ana="{dog_popup}">dog</span>"#
            )
        );
    }

    #[test]
    fn popup_follows_token_index_not_slice_position() {
        let dog = Token::word(1, "dog", 8, 11)
            .with_analysis(Analysis::new().with_field("lex", FieldValue::Text("dog".into())));
        let html = render("cat and dog", std::slice::from_ref(&dog), &MatchOffsets::new(), None, 0);
        let dog_popup = popup::escape_attr(&popup::build(&dog, &BTreeSet::new()));
        assert_eq!(
            html,
            format!(r#"cat and <span class="word w0_1" data-ana="{dog_popup}">dog</span>"#)
        );

        // Reordered slice: each wrapper still gets its own token's popup.
        let cat = Token::word(0, "cat", 0, 3);
        let html = render("cat and dog", &[dog.clone(), cat.clone()], &MatchOffsets::new(), None, 0);
        let cat_popup = popup::escape_attr(&popup::build(&cat, &BTreeSet::new()));
        assert!(html.starts_with(&format!(r#"<span class="word w0_0" data-ana="{cat_popup}">cat</span>"#)));
        assert!(html.ends_with(&format!(r#"<span class="word w0_1" data-ana="{dog_popup}">dog</span>"#)));
    }

    #[test]
    fn highlight_offsets_are_marker_free() {
        let events = BoundaryEvents::from_highlighted("A <em>cat</em> ran");
        assert_eq!(events.opens.get(&2), Some(&BTreeSet::from([SpanId::Highlight])));
        assert_eq!(events.closes.get(&5), Some(&BTreeSet::from([SpanId::Highlight])));

        let events = BoundaryEvents::from_highlighted("<em>a</em> b <em>cd</em>");
        assert!(events.opens.contains_key(&0));
        assert!(events.closes.contains_key(&1));
        assert!(events.opens.contains_key(&4));
        assert!(events.closes.contains_key(&6));
    }

    #[test]
    fn aligned_highlight_shares_the_token_wrapper() {
        let tokens = vec![Token::word(0, "cat", 2, 5)];
        let html = render("A cat ran", &tokens, &MatchOffsets::new(), Some("A <em>cat</em> ran"), 0);
        assert_eq!(html.matches("<span").count(), 1);
        assert!(html.starts_with(r#"A <span class="word w0_0 smatch" data-ana=""#));
        assert!(html.ends_with(">cat</span> ran"));
    }

    #[test]
    fn empty_token_list_only_escapes_and_breaks_lines() {
        let html = render("a < b\nc & d\n\n", &[], &MatchOffsets::new(), None, 0);
        assert_eq!(
            html,
            r#"a &lt; b<br>c &amp; d<span class="newline"></span><span class="newline"></span>"#
        );
        let leading = render("\nx", &[], &MatchOffsets::new(), None, 0);
        assert_eq!(leading, r#"<span class="newline"></span>x"#);
    }

    #[test]
    fn overlapping_words_collapse_into_flat_groups() {
        // "ab" spans [0,2) and "bc" spans [1,3): three flat wrappers, never nested.
        let tokens = vec![Token::word(0, "ab", 0, 2), Token::word(1, "bc", 1, 3)];
        let html = render("abc", &tokens, &MatchOffsets::new(), None, 4);
        let classes: Vec<&str> = html
            .split(r#"<span class="word "#)
            .skip(1)
            .map(|part| part.split('"').next().unwrap())
            .collect();
        assert_eq!(classes, vec!["w4_0", "w4_0 w4_1", "w4_1"]);
        assert_eq!(html.matches("<span").count(), html.matches("</span>").count());
    }

    #[test]
    fn adjacent_words_close_then_reopen() {
        let tokens = vec![Token::word(0, "ab", 0, 2), Token::word(1, "cd", 2, 4)];
        let html = render("abcd", &tokens, &MatchOffsets::new(), None, 0);
        assert!(html.contains(r#"ab</span><span class="word w0_1""#));
        assert!(html.ends_with("cd</span>"));
    }

    #[test]
    fn non_word_tokens_are_not_wrapped() {
        let mut comma = Token::word(1, ",", 3, 4);
        comma.kind = crate::model::TokenKind::Punct;
        let tokens = vec![Token::word(0, "cat", 0, 3), comma];
        let html = render("cat,", &tokens, &MatchOffsets::new(), None, 0);
        assert!(html.ends_with("cat</span>,"));
        assert!(!html.contains("w0_1"));
    }

    #[test]
    fn partial_highlight_snaps_to_word_edges() {
        let tokens = vec![Token::word(0, "catalog", 0, 7)];
        let mut events = BoundaryEvents::from_highlighted("cat<em>alo</em>g");
        events.snap_highlights(&tokens);
        assert_eq!(events.opens.get(&0), Some(&BTreeSet::from([SpanId::Highlight])));
        assert_eq!(events.closes.get(&7), Some(&BTreeSet::from([SpanId::Highlight])));
        assert!(!events.opens.contains_key(&3));
        assert!(!events.closes.contains_key(&6));

        let html = render("catalog", &tokens, &MatchOffsets::new(), Some("cat<em>alo</em>g"), 0);
        assert_eq!(html.matches("<span").count(), 1);
    }

    #[test]
    fn empty_highlight_is_dropped() {
        let events = BoundaryEvents::from_highlighted("a<em></em>b");
        assert!(events.opens.is_empty());
        assert!(events.closes.is_empty());
    }

    #[test]
    fn wrapper_payload_flags_matching_analyses() {
        let token = Token::word(0, "saw", 0, 3)
            .with_analysis(Analysis::new().with_field("lex", FieldValue::Text("see".into())))
            .with_analysis(Analysis::new().with_field("lex", FieldValue::Text("saw".into())));
        let matches: MatchOffsets = [
            (WordId::new(0, 0), TermMatch::new("w1", Some(1))),
            (WordId::new(0, 0), TermMatch::new("w2", None)),
        ]
        .into_iter()
        .collect();
        let html = render("saw", &[token], &matches, None, 0);
        assert!(html.contains(r#"class="word w0_0 wmatch wmatch_w1 wmatch_w2""#));
        assert!(html.contains("popup_ana popup_match"));
        assert!(!html.contains("&amp;"));
    }

    #[test]
    fn wrapper_payload_is_attribute_escaped_once() {
        let token = Token::word(0, r#"a"b"#, 0, 3)
            .with_analysis(Analysis::new().with_field("lex", FieldValue::Text("x<y".into())));
        let html = render(r#"a"b"#, &[token], &MatchOffsets::new(), None, 0);
        assert!(html.contains("popup_wf&quot;&gt;a&quot;b&lt;/span&gt;"));
        assert!(html.contains("popup_lex&quot;&gt;x&lt;y&lt;/span&gt;"));
        assert!(!html.contains("&amp;"));
        assert!(html.ends_with(r#">a"b</span>"#));
    }

    #[test]
    fn sweep_state_applies_closes_before_opens() {
        let mut state = SweepState::new();
        let first = BTreeSet::from([word(0, 0)]);
        let t = state.step(None, Some(&first));
        assert_eq!(t, Transition { close_wrapper: false, open_wrapper: true });

        let second = BTreeSet::from([word(0, 1)]);
        let t = state.step(Some(&first), Some(&second));
        assert_eq!(t, Transition { close_wrapper: true, open_wrapper: true });
        assert_eq!(state.open_spans(), &second);

        let t = state.step(Some(&second), None);
        assert_eq!(t, Transition { close_wrapper: true, open_wrapper: false });
        assert!(state.is_empty());

        let t = state.step(Some(&second), None);
        assert_eq!(t, Transition::default());
    }

    #[test]
    fn token_past_end_of_text_is_force_closed() {
        let tokens = vec![Token::word(0, "cat", 0, 40)];
        let html = render("cat", &tokens, &MatchOffsets::new(), None, 0);
        assert!(html.ends_with("cat</span>"));
    }

    #[test]
    fn multibyte_text_uses_character_offsets() {
        let tokens = vec![Token::word(0, "кот", 0, 3), Token::word(1, "ест", 4, 7)];
        let html = render("кот ест", &tokens, &MatchOffsets::new(), Some("кот <em>ест</em>"), 0);
        assert!(html.contains(">кот</span> <span"));
        assert!(html.contains(r#"class="word w0_1 smatch""#));
    }
}
