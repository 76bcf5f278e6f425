use crate::tokenizer::{Analyzer, Term};
use std::collections::HashSet;

/// Cut a window of `window` words on each side of the first word that
/// contains a query term, wrapping matching words in `<em>`. Without a match
/// the first `window` words are returned.
pub fn snippet(text: &str, terms: &[Term], analyzer: Analyzer, window: usize) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    let wanted: HashSet<&str> = terms.iter().map(String::as_str).collect();
    let is_match = |w: &str| analyzer.analyze(w).iter().any(|t| wanted.contains(t.as_str()));

    let (start, end) = match words.iter().position(|w| is_match(w)) {
        Some(i) => (i.saturating_sub(window), (i + window + 1).min(words.len())),
        None => (0, window.min(words.len())),
    };
    let out: Vec<String> = words[start..end]
        .iter()
        .map(|w| if is_match(w) { format!("<em>{w}</em>") } else { (*w).to_string() })
        .collect();
    Some(out.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centers_on_first_match() {
        let s = snippet("one two three Four five six", &["four".into()], Analyzer::default(), 1).unwrap();
        assert_eq!(s, "three <em>Four</em> five");
    }

    #[test]
    fn falls_back_to_leading_words() {
        let s = snippet("one two three", &["zzz".into()], Analyzer::default(), 2).unwrap();
        assert_eq!(s, "one two");
        assert!(snippet("   ", &[], Analyzer::default(), 2).is_none());
    }
}
