use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use log::trace;

use super::{split_words, Segmenter};
use crate::document::Document;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceLayout {
    pub text: String,
    pub words: Vec<String>,
}

impl SentenceLayout {
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParagraphLayout {
    pub sentences: Vec<SentenceLayout>,
}

impl ParagraphLayout {
    fn derive(paragraph: &str, segmenter: &Segmenter) -> Self {
        let sentences = segmenter
            .split_sentences(paragraph)
            .into_iter()
            .map(|text| {
                let words = split_words(&text).into_iter().map(str::to_string).collect();
                SentenceLayout { text, words }
            })
            .collect();
        Self { sentences }
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug)]
pub struct SegmentCache {
    capacity: usize,
    paragraphs: HashMap<u64, Arc<[String]>>,
    layouts: HashMap<(u64, usize), Arc<ParagraphLayout>>,
    order: VecDeque<(u64, usize)>,
    hits: u64,
    misses: u64,
}

impl Default for SegmentCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SegmentCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            paragraphs: HashMap::new(),
            layouts: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Trimmed paragraph texts of `document`.
    pub fn paragraphs(&mut self, document: &Document, segmenter: &Segmenter) -> Arc<[String]> {
        if let Some(paragraphs) = self.paragraphs.get(&document.revision()) {
            return Arc::clone(paragraphs);
        }
        let paragraphs: Arc<[String]> = segmenter
            .split_paragraphs(document.text())
            .into_iter()
            .map(str::to_string)
            .collect();
        self.paragraphs
            .insert(document.revision(), Arc::clone(&paragraphs));
        paragraphs
    }

    /// Sentence/word layout of one paragraph; `None` when the index is out
    /// of range.
    pub fn layout(
        &mut self,
        document: &Document,
        segmenter: &Segmenter,
        paragraph_index: usize,
    ) -> Option<Arc<ParagraphLayout>> {
        let key = (document.revision(), paragraph_index);
        if let Some(layout) = self.layouts.get(&key) {
            self.hits += 1;
            return Some(Arc::clone(layout));
        }

        let paragraphs = self.paragraphs(document, segmenter);
        let paragraph = paragraphs.get(paragraph_index)?;
        self.misses += 1;
        trace!(
            "segment cache miss revision={} paragraph={paragraph_index}",
            document.revision()
        );
        let layout = Arc::new(ParagraphLayout::derive(paragraph, segmenter));
        self.insert(key, Arc::clone(&layout));
        Some(layout)
    }

    fn insert(&mut self, key: (u64, usize), layout: Arc<ParagraphLayout>) {
        while self.layouts.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.layouts.remove(&oldest);
                }
                None => break,
            }
        }
        self.layouts.insert(key, layout);
        self.order.push_back(key);
    }

    /// Drops every entry that does not belong to `revision`.
    pub fn retain_revision(&mut self, revision: u64) {
        self.paragraphs.retain(|rev, _| *rev == revision);
        self.layouts.retain(|(rev, _), _| *rev == revision);
        self.order.retain(|(rev, _)| *rev == revision);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.layouts.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::from_text("cache-test", text)
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let document = doc("One. Two.\n\nThree four.");
        let segmenter = Segmenter::default();
        let mut cache = SegmentCache::default();

        let first = cache.layout(&document, &segmenter, 0).unwrap();
        let second = cache.layout(&document, &segmenter, 0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.sentence_count(), 2);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn out_of_range_paragraph_is_none() {
        let document = doc("Only.");
        let mut cache = SegmentCache::default();
        assert!(cache.layout(&document, &Segmenter::default(), 3).is_none());
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn new_revision_invalidates_old_entries() {
        let segmenter = Segmenter::default();
        let mut cache = SegmentCache::default();
        let before = doc("Old text.");
        cache.layout(&before, &segmenter, 0).unwrap();

        let after = doc("New text. Longer now.");
        cache.retain_revision(after.revision());
        assert_eq!(cache.stats().entries, 0);

        let layout = cache.layout(&after, &segmenter, 0).unwrap();
        assert_eq!(layout.sentences[1].text, "Longer now.");
    }

    #[test]
    fn evicts_oldest_entry_past_capacity() {
        let document = doc("A.\nB.\nC.");
        let segmenter = Segmenter::default();
        let mut cache = SegmentCache::with_capacity(2);
        for index in 0..3 {
            cache.layout(&document, &segmenter, index).unwrap();
        }
        assert_eq!(cache.stats().entries, 2);
        cache.layout(&document, &segmenter, 0).unwrap();
        assert_eq!(cache.stats().misses, 4);
    }
}
