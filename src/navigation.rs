use std::sync::Arc;

use log::debug;

use crate::{
    document::{Document, DocumentId},
    position::Position,
    segment::{CacheStats, ParagraphLayout, SegmentCache, Segmenter},
};

/// Edges are no-ops; paragraphs without sentences are skipped.
#[derive(Debug)]
pub struct Navigator {
    document: Document,
    segmenter: Arc<Segmenter>,
    cache: SegmentCache,
    paragraphs: Arc<[String]>,
    position: Position,
}

impl Navigator {
    pub fn new(document: Document, segmenter: Arc<Segmenter>) -> Self {
        let mut cache = SegmentCache::default();
        let paragraphs = cache.paragraphs(&document, &segmenter);
        let mut navigator = Self {
            document,
            segmenter,
            cache,
            paragraphs,
            position: Position::START,
        };
        navigator.position = navigator.resolve(Position::START);
        navigator
    }

    /// Replaces the document and resets to the start.
    pub fn load(&mut self, document: Document) -> Position {
        self.cache.retain_revision(document.revision());
        self.paragraphs = self.cache.paragraphs(&document, &self.segmenter);
        debug!(
            "loaded document {} revision={} paragraphs={}",
            document.id(),
            document.revision(),
            self.paragraphs.len()
        );
        self.document = document;
        self.position = self.resolve(Position::START);
        self.position
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_id(&self) -> &DocumentId {
        self.document.id()
    }

    pub fn paragraph_count(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn sentence_count(&mut self, paragraph_index: usize) -> usize {
        self.layout(paragraph_index)
            .map(|layout| layout.sentence_count())
            .unwrap_or(0)
    }

    pub fn word_count(&mut self, paragraph_index: usize, sentence_index: usize) -> usize {
        self.layout(paragraph_index)
            .and_then(|layout| {
                layout
                    .sentences
                    .get(sentence_index)
                    .map(|sentence| sentence.word_count())
            })
            .unwrap_or(0)
    }

    pub fn current_sentence_text(&mut self) -> Option<String> {
        let Position {
            paragraph_index,
            sentence_index,
            ..
        } = self.position;
        self.layout(paragraph_index)
            .and_then(|layout| layout.sentences.get(sentence_index).map(|s| s.text.clone()))
    }

    pub fn current_word(&mut self) -> Option<String> {
        let Position {
            paragraph_index,
            sentence_index,
            word_index,
        } = self.position;
        self.layout(paragraph_index).and_then(|layout| {
            layout
                .sentences
                .get(sentence_index)
                .and_then(|sentence| sentence.words.get(word_index).cloned())
        })
    }

    /// Page of the current paragraph, when the document carries page data.
    pub fn page_of_current_paragraph(&self) -> Option<u32> {
        self.document
            .pages()
            .and_then(|pages| pages.page_of(self.position.paragraph_index))
    }

    /// True on the last word of the last non-empty paragraph.
    pub fn is_at_end(&mut self) -> bool {
        let Position {
            paragraph_index,
            sentence_index,
            word_index,
        } = self.position;
        let sentences = self.sentence_count(paragraph_index);
        let words = self.word_count(paragraph_index, sentence_index);
        word_index + 1 >= words
            && sentence_index + 1 >= sentences
            && self.next_non_empty(paragraph_index).is_none()
    }

    pub fn move_next_word(&mut self) -> Option<Position> {
        let Position {
            paragraph_index: p,
            sentence_index: s,
            word_index: w,
        } = self.position;
        let target = if w + 1 < self.word_count(p, s) {
            Position::new(p, s, w + 1)
        } else if s + 1 < self.sentence_count(p) {
            Position::new(p, s + 1, 0)
        } else {
            Position::new(self.next_non_empty(p)?, 0, 0)
        };
        self.commit(target)
    }

    pub fn move_prev_word(&mut self) -> Option<Position> {
        let Position {
            paragraph_index: p,
            sentence_index: s,
            word_index: w,
        } = self.position;
        let target = if w > 0 {
            Position::new(p, s, w - 1)
        } else if s > 0 {
            Position::new(p, s - 1, self.last_word(p, s - 1))
        } else {
            let previous = self.prev_non_empty(p)?;
            let last_sentence = self.last_sentence(previous);
            Position::new(
                previous,
                last_sentence,
                self.last_word(previous, last_sentence),
            )
        };
        self.commit(target)
    }

    pub fn move_next_sentence(&mut self) -> Option<Position> {
        let Position {
            paragraph_index: p,
            sentence_index: s,
            ..
        } = self.position;
        let target = if s + 1 < self.sentence_count(p) {
            Position::new(p, s + 1, 0)
        } else {
            Position::new(self.next_non_empty(p)?, 0, 0)
        };
        self.commit(target)
    }

    pub fn move_prev_sentence(&mut self) -> Option<Position> {
        let Position {
            paragraph_index: p,
            sentence_index: s,
            ..
        } = self.position;
        let target = if s > 0 {
            Position::new(p, s - 1, 0)
        } else {
            let previous = self.prev_non_empty(p)?;
            Position::new(previous, self.last_sentence(previous), 0)
        };
        self.commit(target)
    }

    pub fn move_next_paragraph(&mut self) -> Option<Position> {
        let next = self.next_non_empty(self.position.paragraph_index)?;
        self.commit(Position::new(next, 0, 0))
    }

    pub fn move_prev_paragraph(&mut self) -> Option<Position> {
        let previous = self.prev_non_empty(self.position.paragraph_index)?;
        self.commit(Position::new(previous, 0, 0))
    }

    /// Clamps `target` into the document and moves there. Never fails.
    pub fn jump_to(&mut self, target: Position) -> Option<Position> {
        let resolved = self.resolve(target);
        self.commit(resolved)
    }

    fn commit(&mut self, target: Position) -> Option<Position> {
        if target == self.position {
            return None;
        }
        self.position = target;
        Some(target)
    }

    /// Clamps paragraph, then sentence, then word. An empty target paragraph
    /// snaps to the nearest non-empty one, forward first.
    fn resolve(&mut self, target: Position) -> Position {
        let Some(last_paragraph) = self.paragraphs.len().checked_sub(1) else {
            return Position::START;
        };
        let mut paragraph = target.paragraph_index.min(last_paragraph);
        if self.sentence_count(paragraph) == 0 {
            match self
                .next_non_empty(paragraph)
                .or_else(|| self.prev_non_empty(paragraph))
            {
                Some(non_empty) => paragraph = non_empty,
                None => return Position::new(paragraph, 0, 0),
            }
        }
        let sentence = target.sentence_index.min(self.last_sentence(paragraph));
        let word = target.word_index.min(self.last_word(paragraph, sentence));
        Position::new(paragraph, sentence, word)
    }

    fn next_non_empty(&mut self, from: usize) -> Option<usize> {
        ((from + 1)..self.paragraphs.len()).find(|&index| self.sentence_count(index) > 0)
    }

    fn prev_non_empty(&mut self, from: usize) -> Option<usize> {
        (0..from.min(self.paragraphs.len()))
            .rev()
            .find(|&index| self.sentence_count(index) > 0)
    }

    fn last_sentence(&mut self, paragraph_index: usize) -> usize {
        self.sentence_count(paragraph_index).saturating_sub(1)
    }

    fn last_word(&mut self, paragraph_index: usize, sentence_index: usize) -> usize {
        self.word_count(paragraph_index, sentence_index)
            .saturating_sub(1)
    }

    fn layout(&mut self, paragraph_index: usize) -> Option<Arc<ParagraphLayout>> {
        self.cache
            .layout(&self.document, &self.segmenter, paragraph_index)
    }
}
