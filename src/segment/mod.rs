//! Paragraph, sentence and word segmentation.

pub mod cache;

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use cache::{CacheStats, ParagraphLayout, SegmentCache, SentenceLayout};

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n+").expect("paragraph break pattern is valid"));
static SENTENCE_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+\s+").expect("sentence candidate pattern is valid"));
static SINGLE_INITIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]\.$").expect("initial pattern is valid"));
static ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.$").expect("ordinal pattern is valid"));

const TITLES: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.", "sra.", "dra.", "jr.", "st.", "vs.", "etc.",
    "e.g.", "i.e.",
];

/// What to do with whitespace-only paragraphs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParagraphPolicy {
    /// Blank paragraphs vanish; every paragraph has at least one sentence.
    #[default]
    Drop,
    /// Blank paragraphs are kept as entries with zero sentences.
    Retain,
}

/// Decides whether a tentative sentence boundary is real.
pub trait BoundaryClassifier: Send + Sync {
    /// `preceding` is the text of the candidate sentence up to and including
    /// the terminal punctuation run; `punctuation` is the last character of
    /// that run.
    fn is_boundary(&self, preceding: &str, punctuation: char) -> bool;
}

/// Abbreviation-list classifier: titles, single capital initials and
/// numbered items suppress a `.` boundary.
#[derive(Debug, Clone)]
pub struct AbbreviationClassifier {
    abbreviations: HashSet<String>,
}

impl Default for AbbreviationClassifier {
    fn default() -> Self {
        Self {
            abbreviations: TITLES.iter().map(|title| title.to_string()).collect(),
        }
    }
}

impl AbbreviationClassifier {
    /// Extends the list, e.g. with locale specific titles. Entries are
    /// matched case-insensitively and must include the trailing period.
    pub fn with_abbreviations<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.abbreviations.extend(
            extra
                .into_iter()
                .map(|abbr| abbr.as_ref().trim().to_lowercase())
                .filter(|abbr| !abbr.is_empty()),
        );
        self
    }

    fn is_abbreviation(&self, token: &str) -> bool {
        self.abbreviations.contains(&token.to_lowercase())
            || SINGLE_INITIAL.is_match(token)
            || ORDINAL.is_match(token)
    }
}

impl BoundaryClassifier for AbbreviationClassifier {
    fn is_boundary(&self, preceding: &str, punctuation: char) -> bool {
        if punctuation != '.' {
            return true;
        }
        match preceding.split_whitespace().next_back() {
            Some(token) => !self.is_abbreviation(token),
            None => true,
        }
    }
}

/// A classifier plus a paragraph policy.
pub struct Segmenter {
    classifier: Box<dyn BoundaryClassifier>,
    policy: ParagraphPolicy,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(AbbreviationClassifier::default(), ParagraphPolicy::Drop)
    }
}

impl std::fmt::Debug for Segmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segmenter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Segmenter {
    pub fn new(classifier: impl BoundaryClassifier + 'static, policy: ParagraphPolicy) -> Self {
        Self {
            classifier: Box::new(classifier),
            policy,
        }
    }

    pub fn with_policy(policy: ParagraphPolicy) -> Self {
        Self::new(AbbreviationClassifier::default(), policy)
    }

    pub fn policy(&self) -> ParagraphPolicy {
        self.policy
    }

    /// Splits on runs of newlines. Returned paragraphs are trimmed; under
    /// [`ParagraphPolicy::Retain`] blank ones come back as `""`.
    pub fn split_paragraphs<'a>(&self, text: &'a str) -> Vec<&'a str> {
        PARAGRAPH_BREAK
            .split(text)
            .map(str::trim)
            .filter(|paragraph| self.policy == ParagraphPolicy::Retain || !paragraph.is_empty())
            .collect()
    }

    pub fn split_sentences(&self, paragraph: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut sentence_start = 0;

        for candidate in SENTENCE_CANDIDATE.find_iter(paragraph) {
            let punctuation_end = candidate.start() + candidate.as_str().trim_end().len();
            let preceding = &paragraph[sentence_start..punctuation_end];
            let punctuation = preceding.chars().next_back().unwrap_or('.');
            if !self.classifier.is_boundary(preceding, punctuation) {
                continue;
            }
            push_sentence(&mut sentences, preceding);
            sentence_start = candidate.end();
        }

        push_sentence(&mut sentences, &paragraph[sentence_start..]);
        sentences
    }
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let sentence = raw.trim();
    if !sentence.is_empty() {
        sentences.push(sentence.to_string());
    }
}

/// Splits `text` into paragraphs with the default segmenter.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    Segmenter::default().split_paragraphs(text)
}

/// Splits a paragraph into sentences with the default abbreviation rules.
pub fn split_sentences(paragraph: &str) -> Vec<String> {
    Segmenter::default().split_sentences(paragraph)
}

pub fn split_words(sentence: &str) -> Vec<&str> {
    sentence.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_titles_and_initials_inside_sentences() {
        let sentences = split_sentences("Dr. Smith arrived at 9 A.M. He brought Mr. Jones.");
        assert_eq!(
            sentences,
            vec!["Dr. Smith arrived at 9 A.M.", "He brought Mr. Jones."]
        );
    }

    #[test]
    fn retains_terminal_punctuation() {
        let sentences = split_sentences("First sentence! Second sentence? Last sentence.");
        assert_eq!(
            sentences,
            vec!["First sentence!", "Second sentence?", "Last sentence."]
        );
    }

    #[test]
    fn merges_single_initials_and_numbered_items() {
        let sentences = split_sentences("Written by J. R. Tolkien. See item 2. for details. Done");
        assert_eq!(
            sentences,
            vec!["Written by J. R. Tolkien.", "See item 2. for details.", "Done"]
        );
    }

    #[test]
    fn spanish_titles_from_the_default_list() {
        let sentences = split_sentences("El Sr. López llegó. Hola.");
        assert_eq!(sentences, vec!["El Sr. López llegó.", "Hola."]);
    }

    #[test]
    fn extra_abbreviations_extend_the_classifier() {
        let classifier = AbbreviationClassifier::default().with_abbreviations(["approx."]);
        let segmenter = Segmenter::new(classifier, ParagraphPolicy::Drop);
        let sentences = segmenter.split_sentences("It weighs approx. ten kilos. Heavy.");
        assert_eq!(sentences, vec!["It weighs approx. ten kilos.", "Heavy."]);
    }

    #[test]
    fn punctuation_without_whitespace_is_not_a_boundary() {
        let sentences = split_sentences("Version 1.5 shipped.Really? Yes!");
        assert_eq!(sentences, vec!["Version 1.5 shipped.Really?", "Yes!"]);
    }

    #[test]
    fn whitespace_only_sentences_are_filtered() {
        assert!(split_sentences("   ").is_empty());
        assert_eq!(split_sentences("Wait!!   Ok"), vec!["Wait!!", "Ok"]);
    }

    #[test]
    fn drops_blank_paragraphs_by_default() {
        let paragraphs = split_paragraphs("\nOne\n\n\n  \nTwo\nThree\n");
        assert_eq!(paragraphs, vec!["One", "Two", "Three"]);
    }

    #[test]
    fn retains_blank_paragraphs_when_asked() {
        let segmenter = Segmenter::with_policy(ParagraphPolicy::Retain);
        let paragraphs = segmenter.split_paragraphs("One\n  \nTwo");
        assert_eq!(paragraphs, vec!["One", "", "Two"]);
    }

    #[test]
    fn splits_words_on_whitespace_runs() {
        assert_eq!(split_words("  a\tb   c\n"), vec!["a", "b", "c"]);
        assert!(split_words(" ").is_empty());
    }
}
