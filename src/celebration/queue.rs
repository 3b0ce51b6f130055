// Ordered queue of detected sales awaiting celebration.

use std::collections::VecDeque;

use crate::board::model::QueuedCelebration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// No celebration in flight; the queue may still hold waiting events.
    Idle,
    /// Exactly one celebration is being presented.
    Processing,
}

/// FIFO queue releasing events one at a time to the sequencer.
///
/// Presentation order equals enqueue order; no event is dropped, and a new
/// celebration never starts while one is in flight.
#[derive(Debug)]
pub struct CelebrationQueue {
    items: VecDeque<QueuedCelebration>,
    state: QueueState,
}

impl CelebrationQueue {
    pub fn new() -> Self {
        CelebrationQueue {
            items: VecDeque::new(),
            state: QueueState::Idle,
        }
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn waiting(&self) -> usize {
        self.items.len()
    }

    /// Append an event. When idle, transitions to `Processing` and returns
    /// the head event for immediate presentation; while processing, the
    /// event just waits its turn.
    pub fn enqueue(&mut self, event: QueuedCelebration) -> Option<QueuedCelebration> {
        self.items.push_back(event);
        if self.state == QueueState::Idle {
            self.state = QueueState::Processing;
            return self.items.pop_front();
        }
        None
    }

    /// Called when the sequencer finishes a celebration. Returns the next
    /// event to present, or transitions back to `Idle` when the queue is
    /// empty.
    pub fn complete(&mut self) -> Option<QueuedCelebration> {
        match self.items.pop_front() {
            Some(next) => Some(next),
            None => {
                self.state = QueueState::Idle;
                None
            }
        }
    }
}

impl Default for CelebrationQueue {
    fn default() -> Self {
        Self::new()
    }
}
