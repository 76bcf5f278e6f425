use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// A normalized token used as an index key.
pub type Term = String;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Tokenize text into terms using NFKC normalization and lowercasing, splitting on
/// every run of characters that is neither a letter nor a digit.
///
/// Garbage or empty input yields an empty vector.
pub fn tokenize(text: &str) -> Vec<Term> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
}

/// Text analysis applied identically at build and query time.
///
/// An index records the analyzer it was built with so queries against it
/// normalize the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analyzer {
    pub remove_stopwords: bool,
}

impl Analyzer {
    pub fn new(remove_stopwords: bool) -> Self { Self { remove_stopwords } }

    pub fn analyze(&self, text: &str) -> Vec<Term> {
        let mut terms = tokenize(text);
        if self.remove_stopwords {
            terms.retain(|t| !is_stopword(t));
        }
        terms
    }
}
