//! Conversation memory: the ordered log of answered turns.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use autospec_core::error::{AutoSpecError, Result};
use autospec_core::types::Turn;

#[derive(Debug, Default)]
struct MemoryState {
    turns: VecDeque<Turn>,
    epoch: u64,
}

/// Append-only log of (question, answer) turns, cleared only on reset.
///
/// Cloning yields another handle to the same log. Appends are serialized by
/// an internal lock, so turns are stored in completion order.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    state: Arc<Mutex<MemoryState>>,
    max_turns: Option<usize>,
}

impl ConversationMemory {
    /// Unbounded memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory that keeps only the most recent `max_turns` turns when set.
    pub fn with_max_turns(max_turns: Option<usize>) -> Self {
        Self {
            state: Arc::default(),
            max_turns,
        }
    }

    // A panic while holding the lock cannot leave the deque half-updated,
    // so a poisoned lock is recovered rather than reported.
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(&self, question: impl Into<String>, answer: impl Into<String>) {
        let mut state = self.lock();
        self.push(&mut state, Turn::new(question, answer));
    }

    /// Append a turn only if the memory has not been cleared since `epoch`.
    pub fn append_if_epoch(
        &self,
        epoch: u64,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<()> {
        let mut state = self.lock();
        if state.epoch != epoch {
            return Err(AutoSpecError::SessionReset);
        }
        self.push(&mut state, Turn::new(question, answer));
        Ok(())
    }

    fn push(&self, state: &mut MemoryState, turn: Turn) {
        state.turns.push_back(turn);
        if let Some(max) = self.max_turns {
            while state.turns.len() > max {
                state.turns.pop_front();
            }
        }
    }

    /// All stored turns, oldest first.
    pub fn history(&self) -> Vec<Turn> {
        self.lock().turns.iter().cloned().collect()
    }

    /// The current epoch together with a consistent copy of the history.
    pub fn snapshot(&self) -> (u64, Vec<Turn>) {
        let state = self.lock();
        (state.epoch, state.turns.iter().cloned().collect())
    }

    /// Drop every turn and start a new epoch.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.turns.clear();
        state.epoch += 1;
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn len(&self) -> usize {
        self.lock().turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().turns.is_empty()
    }

    pub fn max_turns(&self) -> Option<usize> {
        self.max_turns
    }
}
