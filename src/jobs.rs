//! In-process job buffer.
//!
//! Upload completion enqueues `transcode_clip` jobs here; an in-process
//! worker (or a test) drains the buffer and processes each entry. The buffer
//! is the contract point an external queue would replace in production.

use std::sync::Mutex;

use serde_json::Value;

/// Job name used for clip transcoding.
pub const TRANSCODE_CLIP: &str = "transcode_clip";

/// A buffered job entry.
#[derive(Debug, Clone)]
pub struct JobEntry {
    /// Job name, e.g. [`TRANSCODE_CLIP`].
    pub name: String,
    /// Job payload.
    pub payload: Value,
}

/// FIFO buffer of pending jobs.
#[derive(Debug, Default)]
pub struct JobBuffer {
    entries: Mutex<Vec<JobEntry>>,
}

impl JobBuffer {
    /// Append a job to the buffer.
    pub fn enqueue(&self, name: &str, payload: Value) {
        let mut entries = self.entries.lock().expect("job buffer poisoned");
        entries.push(JobEntry {
            name: name.to_string(),
            payload,
        });
    }

    /// Remove and return every buffered job, oldest first.
    pub fn drain(&self) -> Vec<JobEntry> {
        let mut entries = self.entries.lock().expect("job buffer poisoned");
        std::mem::take(&mut *entries)
    }

    /// Copy the buffered jobs without consuming them.
    pub fn snapshot(&self) -> Vec<JobEntry> {
        self.entries.lock().expect("job buffer poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enqueue_then_drain_preserves_order() {
        let buffer = JobBuffer::default();
        buffer.enqueue(TRANSCODE_CLIP, json!({ "clipId": "c1", "src": "s1" }));
        buffer.enqueue(TRANSCODE_CLIP, json!({ "clipId": "c2", "src": "s2" }));

        assert_eq!(buffer.snapshot().len(), 2);
        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].payload["clipId"], "c1");
        assert_eq!(drained[1].payload["clipId"], "c2");
        assert!(buffer.drain().is_empty());
    }
}
