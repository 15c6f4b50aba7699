//! Word, sentence and paragraph navigation over plain text, with timed
//! autoscroll and sentence-paced speech driving the same reading position.

pub mod autoscroll;
pub mod config;
pub mod document;
pub mod logging;
pub mod navigation;
pub mod notify;
pub mod position;
pub mod progress;
pub mod segment;
pub mod session;
pub mod speech;

pub use autoscroll::WordsPerMinute;
pub use config::{ConfigError, ReaderConfig};
pub use document::{Document, DocumentError, DocumentId, PageMap};
pub use navigation::Navigator;
pub use notify::{ChangeCause, ChannelObserver, LogObserver, PositionChange, PositionObserver};
pub use position::Position;
pub use progress::ProgressFile;
pub use segment::{AbbreviationClassifier, BoundaryClassifier, ParagraphPolicy, Segmenter};
pub use session::{Navigation, SessionBuilder, SessionError, SessionHandle, SessionStatus};
pub use speech::{SpeechBackend, SpeechState};
