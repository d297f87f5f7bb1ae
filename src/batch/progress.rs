//! Progress reporting

use std::sync::mpsc::{Sender, SyncSender};
use log::{info, warn};
use crate::batch::job::{JobId, JobStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub input_name: String,
    pub status: JobStatus,
    /// Jobs in a terminal state, this one included. Never decreases.
    pub completed: usize,
    pub total: usize,
}

impl ProgressEvent {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

/// Consumer of progress events. Called from the thread that runs the batch;
/// implementations must return promptly.
pub trait ProgressSink {
    fn report(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent),
{
    fn report(&self, event: &ProgressEvent) {
        self(event)
    }
}

impl ProgressSink for Sender<ProgressEvent> {
    fn report(&self, event: &ProgressEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(event.clone());
    }
}

/// Bounded channel: events are dropped when the receiver falls behind.
impl ProgressSink for SyncSender<ProgressEvent> {
    fn report(&self, event: &ProgressEvent) {
        let _ = self.try_send(event.clone());
    }
}

/// Logs every event through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, event: &ProgressEvent) {
        match event.status {
            JobStatus::Failed => warn!(
                "[{}/{} {:3.0}%] {} failed",
                event.completed, event.total, event.fraction() * 100.0, event.input_name
            ),
            status => info!(
                "[{}/{} {:3.0}%] {} {}",
                event.completed, event.total, event.fraction() * 100.0, event.input_name, status
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::mpsc;

    fn event(completed: usize) -> ProgressEvent {
        ProgressEvent {
            job_id: JobId(0),
            input_name: "a.wav".to_string(),
            status: JobStatus::Succeeded,
            completed,
            total: 4,
        }
    }

    #[test]
    fn test_closure_sink() {
        let seen = RefCell::new(Vec::new());
        let sink = |e: &ProgressEvent| seen.borrow_mut().push(e.completed);
        sink.report(&event(1));
        sink.report(&event(2));
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_sync_sender_never_blocks() {
        let (tx, rx) = mpsc::sync_channel(1);
        tx.report(&event(1));
        tx.report(&event(2));
        assert_eq!(rx.try_recv().unwrap().completed, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sender_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        tx.report(&event(1));
    }

    #[test]
    fn test_fraction() {
        assert_eq!(event(1).fraction(), 0.25);
        LogProgress.report(&event(4));
    }
}
