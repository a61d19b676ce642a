use std::marker::PhantomData;
use std::time::Instant;

use async_channel::{Receiver, Sender};
use futures_core::Stream;
use futures_lite::{FutureExt, StreamExt};
use futures_timer::Delay;

/// Why [`recv_until`] returned.
pub(crate) enum Wake<T> {
    Message(T),
    Deadline,
    Closed,
}

/// Receives the next message, giving up at `deadline` if one is set.
pub(crate) async fn recv_until<T>(receiver: &Receiver<T>, deadline: Option<Instant>) -> Wake<T> {
    let recv = async {
        match receiver.recv().await {
            Ok(message) => Wake::Message(message),
            Err(_) => Wake::Closed,
        }
    };
    let Some(deadline) = deadline else {
        return recv.await;
    };
    let dur_wait = deadline.saturating_duration_since(Instant::now());
    if dur_wait.is_zero() {
        return Wake::Deadline;
    }
    recv.or(async {
        Delay::new(dur_wait).await;
        Wake::Deadline
    })
    .await
}

/// Receiving half of [`oneshot`].
pub(crate) struct Oneshot<T>(Receiver<T>);

impl<T> Oneshot<T> {
    /// `None` if the sending closure was dropped without being called.
    pub async fn recv(self) -> Option<T> {
        self.0.recv().await.ok()
    }
}

/// A completion closure paired with a future of the value it is called with.
pub(crate) fn oneshot<T: Send + 'static>() -> (impl FnOnce(T) + Send + 'static, Oneshot<T>) {
    let (sender, receiver): (Sender<T>, Receiver<T>) = async_channel::bounded(1);
    let complete = move |value| {
        let _ = sender.try_send(value);
    };
    (complete, Oneshot(receiver))
}

/// Wraps the main stream and also checks an event stream; ends and fuses the main stream when
/// the event stream ends or the checker returns true for a received event item.
pub struct StreamUntil<T, E, S, F>
where
    T: Send + Unpin,
    E: Send,
    S: Stream<Item = E> + Send + Unpin,
    F: Fn(&E) -> bool + Send + Sync + Unpin + 'static,
{
    stream: S,
    event_checker: F,
    ph: PhantomData<T>,
}

impl<T, E, S, F> StreamUntil<T, E, S, F>
where
    T: Send + Unpin,
    E: Send,
    S: Stream<Item = E> + Send + Unpin,
    F: Fn(&E) -> bool + Send + Sync + Unpin + 'static,
{
    /// Creates the `StreamUntil`.
    pub fn create(
        stream: impl Stream<Item = T> + Send + Unpin,
        event_stream: S,
        event_checker: F,
    ) -> impl Stream<Item = T> + Send + Unpin {
        stream
            .or(StreamUntil {
                stream: event_stream,
                event_checker,
                ph: PhantomData,
            })
            .fuse()
    }
}

impl<T, E, S, F> futures_core::Stream for StreamUntil<T, E, S, F>
where
    T: Send + Unpin,
    E: Send,
    S: Stream<Item = E> + Send + Unpin,
    F: Fn(&E) -> bool + Send + Sync + Unpin + 'static,
{
    type Item = T;
    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use futures_core::task::Poll;
        // drain unrelated events so the waker stays registered with the event stream
        loop {
            match self.stream.poll_next(cx) {
                Poll::Ready(Some(event)) if (self.event_checker)(&event) => return Poll::Ready(None),
                Poll::Ready(Some(_)) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
