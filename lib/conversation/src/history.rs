//! Bounded conversation history for a single user.

use crate::turn::ConversationTurn;
use std::collections::VecDeque;

/// Chronological sequence of turns capped at a fixed capacity.
///
/// Appending past capacity evicts the oldest turns first. Eviction works on
/// single turns, so a user turn can leave while its reply stays.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl ConversationHistory {
    /// Creates an empty history holding at most `capacity` turns.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a turn and returns how many old turns were evicted.
    pub fn push(&mut self, turn: ConversationTurn) -> usize {
        self.turns.push_back(turn);

        let mut evicted = 0;
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Returns up to `limit` of the most recent turns, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(limit);
        self.turns.iter().skip(skip).cloned().collect()
    }

    /// Returns the number of turns held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns true if no turns are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
