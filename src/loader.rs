//! Background batch prefetching.
//!
//! A producer thread drains the batch source into a bounded channel while
//! the consumer processes the previous batch. Order is preserved.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::debug;

use crate::sample::Batch;
use crate::{Error, Result};

enum Message {
    Batch(Result<Batch>),
    Done,
}

/// Iterator over batches produced on a background thread.
///
/// Yields `LoaderFailure` if the producer stops without signalling
/// completion, or if a timeout is set and no batch arrives in time.
pub struct PrefetchLoader {
    receiver: Receiver<Message>,
    handle: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
    finished: bool,
}

impl PrefetchLoader {
    /// Start draining `source` with up to `capacity` batches buffered.
    pub fn spawn<I>(source: I, capacity: usize) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Batch>> + Send + 'static,
    {
        let (sender, receiver) = bounded(capacity);

        let handle = thread::Builder::new()
            .name("batch-prefetch".to_string())
            .spawn(move || {
                let mut produced = 0usize;
                for item in source {
                    if sender.send(Message::Batch(item)).is_err() {
                        // Consumer dropped
                        return;
                    }
                    produced += 1;
                }
                debug!(batches = produced, "Batch source exhausted");
                let _ = sender.send(Message::Done);
            })
            .map_err(|e| Error::LoaderFailure(format!("failed to start prefetch thread: {}", e)))?;

        Ok(Self {
            receiver,
            handle: Some(handle),
            timeout: None,
            finished: false,
        })
    }

    /// Fail instead of blocking when no batch arrives within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn fail(&mut self, message: String) -> Option<Result<Batch>> {
        self.finished = true;
        Some(Err(Error::LoaderFailure(message)))
    }

    fn producer_panic(&mut self) -> String {
        match self.handle.take().map(JoinHandle::join) {
            Some(Err(payload)) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                format!("batch producer panicked: {}", reason)
            }
            _ => "batch producer stopped before signalling completion".to_string(),
        }
    }
}

impl Iterator for PrefetchLoader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let message = match self.timeout {
            Some(timeout) => match self.receiver.recv_timeout(timeout) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => {
                    return self.fail(format!("no batch received within {:?}", timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let message = self.producer_panic();
                    return self.fail(message);
                }
            },
            None => match self.receiver.recv() {
                Ok(message) => message,
                Err(_) => {
                    let message = self.producer_panic();
                    return self.fail(message);
                }
            },
        };

        match message {
            Message::Batch(item) => Some(item),
            Message::Done => {
                self.finished = true;
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Pose, Sample};

    fn batch(timestamp: i64) -> Batch {
        let sample = Sample::new(timestamp, Pose::new([0.0, 0.0], 0.0), Vec::new(), Vec::new()).unwrap();
        Batch::new(vec![sample])
    }

    fn timestamps(items: Vec<Result<Batch>>) -> Vec<i64> {
        items
            .into_iter()
            .map(|item| item.unwrap().samples[0].timestamp)
            .collect()
    }

    #[test]
    fn test_preserves_order() {
        let source: Vec<Result<Batch>> = (0..20).map(|t| Ok(batch(t))).collect();
        let loader = PrefetchLoader::spawn(source, 2).unwrap();
        assert_eq!(timestamps(loader.collect()), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_source() {
        let loader = PrefetchLoader::spawn(Vec::<Result<Batch>>::new(), 1).unwrap();
        assert_eq!(loader.count(), 0);
    }

    #[test]
    fn test_source_errors_are_forwarded() {
        let source = vec![Ok(batch(1)), Err(Error::InvalidInput("bad chunk".to_string())), Ok(batch(2))];
        let items: Vec<Result<Batch>> = PrefetchLoader::spawn(source, 1).unwrap().collect();
        assert_eq!(items.len(), 3);
        assert!(matches!(items[1], Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_producer_panic_is_reported() {
        let source = (0..3).map(|t| {
            if t == 1 {
                panic!("chunk reader crashed");
            }
            Ok(batch(t))
        });
        let items: Vec<Result<Batch>> = PrefetchLoader::spawn(source, 1).unwrap().collect();

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        match &items[1] {
            Err(Error::LoaderFailure(message)) => assert!(message.contains("chunk reader crashed")),
            other => panic!("expected loader failure, got {:?}", other.as_ref().map(|b| b.len())),
        }
    }

    #[test]
    fn test_timeout() {
        let source = (0..2).map(|t| {
            thread::sleep(Duration::from_millis(500));
            Ok(batch(t))
        });
        let mut loader = PrefetchLoader::spawn(source, 1)
            .unwrap()
            .with_timeout(Duration::from_millis(10));

        assert!(matches!(loader.next(), Some(Err(Error::LoaderFailure(_)))));
        assert!(loader.next().is_none());
    }
}
