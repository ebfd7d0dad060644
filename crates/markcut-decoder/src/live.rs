use std::thread;
use std::time::Duration;

use markcut_types::{CancelToken, Cancelled};
use tracing::{debug, warn};

use crate::core::FrameIndex;

/// Result of waiting for a recording that ran dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// More frames arrived; the new available count is attached.
    Grew(u64),
    /// The producer finished and nothing new will arrive.
    Ended,
    /// The producer is still writing but stopped delivering frames.
    Stalled,
}

/// Bounded poll-and-sleep applied when a decoder returns no picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallPolicy {
    pub retries: u32,
    pub sleep: Duration,
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self {
            retries: 6,
            sleep: Duration::from_secs(10),
        }
    }
}

impl StallPolicy {
    pub fn new(retries: u32, sleep: Duration) -> Self {
        Self { retries, sleep }
    }

    /// Polls `index` until it reports more than `seen` frames, the recording
    /// finishes, or the retries are used up.
    pub fn wait_for_growth(
        &self,
        index: &dyn FrameIndex,
        seen: u64,
        cancel: &CancelToken,
    ) -> Result<Availability, Cancelled> {
        let mut attempt = 0;
        loop {
            cancel.check()?;
            let available = index.indexed_frames();
            if available > seen {
                debug!(seen, available, attempt, "recording grew");
                return Ok(Availability::Grew(available));
            }
            if !index.is_recording() {
                debug!(seen, "recording finished");
                return Ok(Availability::Ended);
            }
            if attempt >= self.retries {
                warn!(
                    seen,
                    retries = self.retries,
                    "recording is still being written but delivers no frames"
                );
                return Ok(Availability::Stalled);
            }
            attempt += 1;
            debug!(seen, attempt, sleep_ms = self.sleep.as_millis() as u64, "waiting for recording");
            thread::sleep(self.sleep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MemoryIndex, RecordingProgress};

    #[test]
    fn finished_recording_ends_immediately() {
        let index = MemoryIndex::new(25.0, 1, RecordingProgress::finished(10));
        let policy = StallPolicy::new(3, Duration::from_secs(60));
        let outcome = policy.wait_for_growth(&index, 10, &CancelToken::new());
        assert_eq!(outcome, Ok(Availability::Ended));
    }

    #[test]
    fn live_recording_without_growth_stalls() {
        let index = MemoryIndex::new(25.0, 1, RecordingProgress::live(10));
        let policy = StallPolicy::new(2, Duration::from_millis(1));
        let outcome = policy.wait_for_growth(&index, 10, &CancelToken::new());
        assert_eq!(outcome, Ok(Availability::Stalled));
    }

    #[test]
    fn growth_from_producer_thread_is_observed() {
        let progress = RecordingProgress::live(10);
        let index = MemoryIndex::new(25.0, 1, progress.clone());
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            progress.grow(5);
        });
        let policy = StallPolicy::new(500, Duration::from_millis(2));
        let outcome = policy.wait_for_growth(&index, 10, &CancelToken::new());
        producer.join().unwrap();
        assert_eq!(outcome, Ok(Availability::Grew(15)));
    }

    #[test]
    fn cancellation_interrupts_polling() {
        let index = MemoryIndex::new(25.0, 1, RecordingProgress::live(10));
        let cancel = CancelToken::new();
        cancel.cancel();
        let policy = StallPolicy::new(100, Duration::from_secs(1));
        assert_eq!(policy.wait_for_growth(&index, 10, &cancel), Err(Cancelled));
    }
}
