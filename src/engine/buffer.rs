use crate::models::Sample;

/// In-memory staging area between polling and flushing. Owned by exactly one
/// job; rows leave only through `drain_all`.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    rows: Vec<Sample>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn push(&mut self, sample: Sample) {
        self.rows.push(sample);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Take every buffered row, leaving the buffer empty. Insertion order is
    /// preserved.
    pub fn drain_all(&mut self) -> Vec<Sample> {
        std::mem::take(&mut self.rows)
    }
}
