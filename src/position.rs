use std::fmt;

use serde::{Deserialize, Serialize};

/// Reading location as a paragraph / sentence / word index triple.
///
/// Ordering is document order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub paragraph_index: usize,
    pub sentence_index: usize,
    pub word_index: usize,
}

impl Position {
    pub const START: Position = Position::new(0, 0, 0);

    pub const fn new(paragraph_index: usize, sentence_index: usize, word_index: usize) -> Self {
        Self {
            paragraph_index,
            sentence_index,
            word_index,
        }
    }

    /// Same paragraph and sentence, ignoring the word.
    pub fn same_sentence(&self, other: &Position) -> bool {
        self.paragraph_index == other.paragraph_index
            && self.sentence_index == other.sentence_index
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.paragraph_index, self.sentence_index, self.word_index
        )
    }
}
