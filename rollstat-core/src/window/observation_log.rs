use std::{collections::VecDeque, time::Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Observation {
    pub value: f64,
    pub inserted_at: Instant,
}

/// Window members in insertion order, oldest at the front.
#[derive(Debug, Default)]
pub(crate) struct ObservationLog {
    buffer: VecDeque<Observation>,
}

impl ObservationLog {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::new(),
        }
    }

    pub fn append(&mut self, value: f64, inserted_at: Instant) {
        debug_assert!(
            self.buffer
                .back()
                .is_none_or(|newest| newest.inserted_at <= inserted_at),
            "observations have to be appended in timestamp order"
        );
        self.buffer.push_back(Observation { value, inserted_at });
    }

    pub fn oldest(&self) -> Option<&Observation> {
        self.buffer.front()
    }

    pub fn newest(&self) -> Option<&Observation> {
        self.buffer.back()
    }

    pub fn evict_oldest(&mut self) -> Option<Observation> {
        self.buffer.pop_front()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.buffer.iter().map(|observation| observation.value)
    }
}
