use log::info;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::mpsc;

use crate::{document::DocumentId, position::Position};

/// What caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    Navigation,
    Jump,
    Autoscroll,
    Speech,
    Load,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionChange {
    pub document_id: DocumentId,
    pub position: Position,
    pub timestamp: OffsetDateTime,
    pub cause: ChangeCause,
}

pub trait PositionObserver: Send {
    fn position_changed(&mut self, change: &PositionChange);
}

impl<F> PositionObserver for F
where
    F: FnMut(&PositionChange) + Send,
{
    fn position_changed(&mut self, change: &PositionChange) {
        self(change)
    }
}

#[derive(Default)]
pub struct Notifier {
    observers: Vec<Box<dyn PositionObserver>>,
}

impl Notifier {
    pub fn subscribe(&mut self, observer: Box<dyn PositionObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn publish(&mut self, document_id: &DocumentId, position: Position, cause: ChangeCause) {
        let change = PositionChange {
            document_id: document_id.clone(),
            position,
            timestamp: OffsetDateTime::now_utc(),
            cause,
        };
        for observer in &mut self.observers {
            observer.position_changed(&change);
        }
    }
}

/// Forwards changes into a channel, e.g. for a renderer running elsewhere.
/// A dropped receiver just stops the forwarding.
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<PositionChange>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PositionChange>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl PositionObserver for ChannelObserver {
    fn position_changed(&mut self, change: &PositionChange) {
        let _ = self.sender.send(change.clone());
    }
}

/// Logs every change at info level.
pub struct LogObserver;

impl PositionObserver for LogObserver {
    fn position_changed(&mut self, change: &PositionChange) {
        info!(
            "position {} in {} ({:?})",
            change.position, change.document_id, change.cause
        );
    }
}
