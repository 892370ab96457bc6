use crate::models::EditParams;

/// One undo/redo snapshot: which committed base image is current, plus the live params
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryState {
    pub base_idx: usize,
    pub params: EditParams,
}

/// Linear undo/redo history with a cursor
#[derive(Debug, Clone, Default)]
pub struct History {
    states: Vec<HistoryState>,
    cursor: usize,
    suspended: bool,
}

impl History {
    pub fn new(initial: HistoryState) -> Self {
        Self {
            states: vec![initial],
            cursor: 0,
            suspended: false,
        }
    }

    /// Rebuild a history from stored states. The cursor is clamped into range.
    pub fn from_parts(states: Vec<HistoryState>, cursor: usize) -> Option<Self> {
        if states.is_empty() {
            return None;
        }
        let cursor = cursor.min(states.len() - 1);
        Some(Self {
            states,
            cursor,
            suspended: false,
        })
    }

    /// Record a snapshot. Returns false when nothing was recorded: pushes are
    /// suspended, or the snapshot equals the current one.
    pub fn push(&mut self, state: HistoryState) -> bool {
        if self.suspended {
            return false;
        }
        if self.states.get(self.cursor) == Some(&state) {
            return false;
        }
        self.states.truncate(self.cursor + 1);
        self.states.push(state);
        self.cursor = self.states.len() - 1;
        true
    }

    pub fn undo(&mut self) -> Option<&HistoryState> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.states.get(self.cursor)
    }

    pub fn redo(&mut self) -> Option<&HistoryState> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.states.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.states.len()
    }

    pub fn current(&self) -> Option<&HistoryState> {
        self.states.get(self.cursor)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn states(&self) -> &[HistoryState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Stop recording until [`History::resume`] is called
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }
}
