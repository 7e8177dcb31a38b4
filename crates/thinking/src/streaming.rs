//! Stream shape adapters
//!
//! A response stream arrives either pull-based (`futures::Stream`) or
//! push-based (a bounded tokio channel the producer writes into). The tag
//! transformer only works on the pull shape, so the stream is normalized on
//! the way in and converted back to the caller's shape on the way out.

use crate::types::{StreamPart, ThinkingError};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::fmt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Number of parts buffered between the transformer task and a push consumer
const PUSH_CHANNEL_CAPACITY: usize = 1;

pub type PartPullStream = BoxStream<'static, StreamPart>;

/// Response stream in one of the two supported shapes
pub enum PartStream {
    /// Consumer pulls parts on demand
    Pull(PartPullStream),
    /// Producer pushes parts into a bounded channel. Dropping the receiver
    /// cancels the producer.
    Push(mpsc::Receiver<StreamPart>),
}

impl fmt::Debug for PartStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartStream::Pull(_) => f.write_str("PartStream::Pull(..)"),
            PartStream::Push(_) => f.write_str("PartStream::Push(..)"),
        }
    }
}

impl PartStream {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = StreamPart> + Send + 'static,
    {
        PartStream::Pull(stream.boxed())
    }

    /// View either shape as a pull stream
    pub fn into_stream(self) -> PartPullStream {
        match self {
            PartStream::Pull(stream) => stream,
            PartStream::Push(receiver) => receiver_into_stream(receiver),
        }
    }

    /// Drain the stream, mostly useful in tests and for small responses
    pub async fn collect_parts(self) -> Vec<StreamPart> {
        self.into_stream().collect().await
    }
}

/// The shape a normalized stream came in, used to convert the transformed
/// stream back
#[derive(Debug)]
pub enum StreamShape {
    Pull,
    Push(Handle),
}

/// Turn any supported stream into a pull stream plus the shape needed to
/// recreate it.
///
/// Push streams are converted back by a task on the current tokio runtime, so
/// their absence is reported here rather than when the stream is first read.
pub fn normalize(stream: PartStream) -> Result<(PartPullStream, StreamShape), ThinkingError> {
    match stream {
        PartStream::Pull(stream) => Ok((stream, StreamShape::Pull)),
        PartStream::Push(receiver) => {
            let handle = Handle::try_current().map_err(|_| ThinkingError::RuntimeUnavailable)?;
            Ok((receiver_into_stream(receiver), StreamShape::Push(handle)))
        }
    }
}

impl StreamShape {
    /// Wrap `parts` back into the shape the stream originally had
    pub fn recreate(self, parts: PartPullStream) -> PartStream {
        match self {
            StreamShape::Pull => PartStream::Pull(parts),
            StreamShape::Push(handle) => PartStream::Push(stream_into_receiver(parts, &handle)),
        }
    }
}

/// Pull parts out of a push channel. The receiver is released when the
/// stream ends or is dropped early.
fn receiver_into_stream(receiver: mpsc::Receiver<StreamPart>) -> PartPullStream {
    ReceiverStream::new(receiver).boxed()
}

/// Feed a pull stream into a fresh push channel.
///
/// The upstream is only advanced once the channel has room, so a slow
/// consumer throttles the whole pipeline. When the receiver goes away the
/// task drops the upstream right away, also while it is waiting on it.
fn stream_into_receiver(mut parts: PartPullStream, handle: &Handle) -> mpsc::Receiver<StreamPart> {
    let (tx, rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);

    handle.spawn(async move {
        loop {
            let Ok(permit) = tx.reserve().await else {
                debug!("Push stream consumer cancelled");
                break;
            };

            let next = tokio::select! {
                next = parts.next() => next,
                _ = tx.closed() => {
                    debug!("Push stream consumer cancelled while waiting for upstream");
                    break;
                }
            };

            match next {
                Some(part) => permit.send(part),
                None => break,
            }
        }
        // Dropping the upstream here releases whatever it holds
        drop(parts);
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct ReleaseCounter(Arc<AtomicUsize>);

    impl Drop for ReleaseCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn parts(texts: &[&str]) -> Vec<StreamPart> {
        texts.iter().map(|t| StreamPart::text_delta(*t)).collect()
    }

    /// Wrap `stream` so that dropping it bumps `released`
    fn guarded<S>(stream: S, released: Arc<AtomicUsize>) -> PartPullStream
    where
        S: futures::Stream<Item = StreamPart> + Send + 'static,
    {
        let guard = ReleaseCounter(released);
        stream
            .map(move |part| {
                let _keep = &guard;
                part
            })
            .boxed()
    }

    async fn wait_released(released: &AtomicUsize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while released.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("upstream was not released");
    }

    #[tokio::test]
    async fn test_pull_shape_roundtrip() {
        let input = PartStream::from_stream(stream::iter(parts(&["a", "b"])));
        let (pull, shape) = normalize(input).unwrap();
        let output = shape.recreate(pull);

        assert!(matches!(output, PartStream::Pull(_)));
        assert_eq!(output.collect_parts().await, parts(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_push_shape_roundtrip() {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for part in parts(&["x", "y", "z"]) {
                tx.send(part).await.unwrap();
            }
        });

        let (pull, shape) = normalize(PartStream::Push(rx)).unwrap();
        let output = shape.recreate(pull);

        assert!(matches!(output, PartStream::Push(_)));
        assert_eq!(output.collect_parts().await, parts(&["x", "y", "z"]));
    }

    #[test]
    fn test_push_shape_without_runtime() {
        let (_tx, rx) = mpsc::channel(1);
        let result = normalize(PartStream::Push(rx));
        assert!(matches!(result, Err(ThinkingError::RuntimeUnavailable)));
    }

    #[tokio::test]
    async fn test_push_cancellation_releases_upstream() {
        let released = Arc::new(AtomicUsize::new(0));
        let endless = guarded(
            stream::repeat_with(|| StreamPart::text_delta("tick")),
            released.clone(),
        );
        let output = StreamShape::Push(Handle::current()).recreate(endless);

        let PartStream::Push(mut rx) = output else {
            panic!("expected push stream");
        };
        assert_eq!(rx.recv().await, Some(StreamPart::text_delta("tick")));
        drop(rx);

        wait_released(&released).await;
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_push_cancellation_while_upstream_pending() {
        let released = Arc::new(AtomicUsize::new(0));
        let pending = guarded(stream::pending(), released.clone());

        let PartStream::Push(rx) = StreamShape::Push(Handle::current()).recreate(pending) else {
            panic!("expected push stream");
        };
        drop(rx);

        wait_released(&released).await;
    }

    #[tokio::test]
    async fn test_receiver_released_when_pull_side_dropped() {
        let (tx, rx) = mpsc::channel(1);
        let (mut pull, _shape) = normalize(PartStream::Push(rx)).unwrap();

        tx.send(StreamPart::text_delta("one")).await.unwrap();
        assert_eq!(pull.next().await, Some(StreamPart::text_delta("one")));
        drop(pull);

        assert!(tx.is_closed());
    }
}
