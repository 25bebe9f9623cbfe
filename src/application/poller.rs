use super::dispatcher::{Dispatcher, Disposition};
use crate::ports::queue::MessageQueuePort;
use crate::ports::storage::BlobStorePort;
use crate::ports::transcoder::Transcoder;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Long-poll wait per receive call.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(20);

/// Pause after a failed receive before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Messages passed to the dispatcher
    pub handled: u64,
    /// Of those, messages removed from the queue
    pub acknowledged: u64,
}

/// Feeds queue messages to the dispatcher strictly one at a time.
pub struct QueuePoller<S, Q, T> {
    dispatcher: Dispatcher<S, Q, T>,
    wait: Duration,
}

impl<S, Q, T> QueuePoller<S, Q, T>
where
    S: BlobStorePort,
    Q: MessageQueuePort,
    T: Transcoder,
{
    pub fn new(dispatcher: Dispatcher<S, Q, T>, wait: Duration) -> Self {
        Self { dispatcher, wait }
    }

    /// Polls until `shutdown` is cancelled. A job in progress always runs to completion.
    pub async fn run(&self, shutdown: CancellationToken) -> PollSummary {
        let mut summary = PollSummary::default();
        info!(wait = ?self.wait, "polling for jobs");

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.dispatcher.queue().receive(self.wait) => received,
            };

            match received {
                Ok(Some(message)) => {
                    debug!(message_id = ?message.id, body = %message.body, "received message");
                    let disposition = self.dispatcher.handle(message).await;
                    summary.handled += 1;
                    if disposition == Disposition::Acknowledged {
                        summary.acknowledged += 1;
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "failed to receive from queue");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!(handled = summary.handled, "poller stopped");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::{AckPolicy, DispatchSettings};
    use crate::domain::jobs::{AckToken, QueueMessage};
    use crate::ports::queue::MockMessageQueuePort;
    use crate::ports::storage::MockBlobStorePort;
    use crate::ports::transcoder::MockTranscoder;
    use mockall::Sequence;
    use tempfile::tempdir;

    fn test_event(n: usize) -> QueueMessage {
        QueueMessage {
            id: Some(format!("m-{}", n)),
            body: r#"{"Event":"s3:TestEvent"}"#.to_string(),
            ack_token: AckToken(format!("receipt-{}", n)),
        }
    }

    #[tokio::test]
    async fn test_handles_messages_then_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let shutdown = CancellationToken::new();
        let mut queue = MockMessageQueuePort::new();
        let mut seq = Sequence::new();

        queue
            .expect_receive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(test_event(1))));
        queue
            .expect_delete()
            .withf(|token| token.0 == "receipt-1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        queue
            .expect_receive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        queue
            .expect_receive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(test_event(2))));
        let stop = shutdown.clone();
        queue
            .expect_delete()
            .withf(|token| token.0 == "receipt-2")
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                stop.cancel();
                Ok(())
            });

        let dispatcher = Dispatcher::new(
            MockBlobStorePort::new(),
            queue,
            MockTranscoder::new(),
            DispatchSettings {
                work_dir: dir.path().to_path_buf(),
                ack_policy: AckPolicy::Always,
                ..DispatchSettings::default()
            },
        );
        let poller = QueuePoller::new(dispatcher, Duration::from_millis(10));

        let summary = poller.run(shutdown).await;
        assert_eq!(
            summary,
            PollSummary {
                handled: 2,
                acknowledged: 2
            }
        );
    }

    #[tokio::test]
    async fn test_receive_errors_do_not_stop_the_loop() {
        let dir = tempdir().unwrap();
        let shutdown = CancellationToken::new();
        let mut queue = MockMessageQueuePort::new();
        let mut seq = Sequence::new();

        queue
            .expect_receive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err("service unavailable".into()));
        let stop = shutdown.clone();
        queue
            .expect_receive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                stop.cancel();
                Ok(None)
            });

        let dispatcher = Dispatcher::new(
            MockBlobStorePort::new(),
            queue,
            MockTranscoder::new(),
            DispatchSettings {
                work_dir: dir.path().to_path_buf(),
                ..DispatchSettings::default()
            },
        );
        let poller = QueuePoller::new(dispatcher, Duration::from_millis(10));

        let summary = poller.run(shutdown).await;
        assert_eq!(summary.handled, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_polls() {
        let dir = tempdir().unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let mut queue = MockMessageQueuePort::new();
        queue.expect_receive().never();

        let dispatcher = Dispatcher::new(
            MockBlobStorePort::new(),
            queue,
            MockTranscoder::new(),
            DispatchSettings {
                work_dir: dir.path().to_path_buf(),
                ..DispatchSettings::default()
            },
        );

        let summary = QueuePoller::new(dispatcher, DEFAULT_WAIT).run(shutdown).await;
        assert_eq!(summary, PollSummary::default());
    }
}
