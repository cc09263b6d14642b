use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExtremumKind {
    Min,
    Max,
}

impl ExtremumKind {
    /// Returns true if `candidate` can never again be the extremum once
    /// `value` was added after it.
    fn supersedes(self, value: f64, candidate: f64) -> bool {
        match self {
            ExtremumKind::Min => candidate > value,
            ExtremumKind::Max => candidate < value,
        }
    }
}

/// Monotonic deque of extremum candidates. Front is always the extremum of
/// all values currently in the window.
///
/// Equal values are all kept, so each occurrence still in the window has its
/// own entry and evicting one of them leaves the others in place.
#[derive(Debug)]
pub(crate) struct ExtremumTracker {
    kind: ExtremumKind,
    candidates: VecDeque<f64>,
}

impl ExtremumTracker {
    pub fn new(kind: ExtremumKind) -> Self {
        Self {
            kind,
            candidates: VecDeque::new(),
        }
    }

    pub fn push(&mut self, value: f64) {
        while let Some(back) = self.candidates.back()
            && self.kind.supersedes(value, *back)
        {
            self.candidates.pop_back();
        }
        self.candidates.push_back(value);
    }

    /// Must be called with the value of the oldest observation leaving the
    /// window. If it is not at the front it was already superseded.
    pub fn evict(&mut self, value: f64) {
        if self.candidates.front() == Some(&value) {
            self.candidates.pop_front();
        }
    }

    pub fn current(&self) -> Option<f64> {
        self.candidates.front().copied()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.candidates.len()
    }
}
