// SPDX-License-Identifier: Apache-2.0

//! Hand-off channel between the read loop and the consumer.
//!
//! A zero-capacity channel: every send completes only when the consumer takes
//! the item, so a slow consumer stalls the producer and at most one item is in
//! flight.

use flume::r#async::RecvStream;
use flume::{Receiver, Sender};

use crate::supervisor::Supervisor;

pub struct BoundedSender<T> {
    tx: Sender<T>,
}

/// Result of a send that may be interrupted by the session supervisor.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The consumer took the item.
    Sent,
    /// The session started dying before the consumer took the item.
    Cancelled,
    /// The consumer dropped its receiver.
    Disconnected,
}

impl<T> BoundedSender<T> {
    /// Send, giving up when the supervisor starts dying.
    ///
    /// In stop-at-EOF mode the dying signal does not abandon the hand-off:
    /// lines still in the file must reach the consumer.
    pub async fn send_until_dying(&self, item: T, supervisor: &Supervisor) -> Delivery {
        let send = self.tx.send_async(item);
        tokio::pin!(send);

        tokio::select! {
            biased;
            result = &mut send => return delivery(result),
            _ = supervisor.dying() => {}
        }

        if supervisor.is_draining() {
            delivery(send.await)
        } else {
            Delivery::Cancelled
        }
    }
}

fn delivery<T>(result: Result<(), flume::SendError<T>>) -> Delivery {
    match result {
        Ok(()) => Delivery::Sent,
        Err(_) => Delivery::Disconnected,
    }
}

pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> Clone for BoundedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> BoundedReceiver<T> {
    pub async fn next(&self) -> Option<T> {
        match self.rx.recv_async().await {
            Ok(item) => Some(item),
            Err(_e) => None, // disconnected
        }
    }

    /// Borrow the channel as a `Stream` of items, ending when the
    /// producer is gone.
    pub fn stream(&self) -> RecvStream<'_, T> {
        self.rx.stream()
    }
}

/// Create a rendezvous channel.
pub fn rendezvous<T>() -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(0);
    (BoundedSender { tx }, BoundedReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::{Delivery, rendezvous};
    use crate::supervisor::Supervisor;
    use tokio_test::{assert_pending, assert_ready, task::spawn};

    #[tokio::test]
    async fn send_completes_only_on_receive() {
        let (tx, rx) = rendezvous();
        let sup = Supervisor::new();

        let mut send1 = spawn(async { tx.send_until_dying(10, &sup).await });
        // No buffer: the sender waits for a receiver
        assert_pending!(send1.poll());

        let mut recv1 = spawn(async { rx.next().await });
        assert_eq!(Some(10), assert_ready!(recv1.poll()));

        assert!(send1.is_woken());
        assert_eq!(Delivery::Sent, assert_ready!(send1.poll()));
    }

    #[tokio::test]
    async fn receiver_sees_end_when_sender_dropped() {
        let (tx, rx) = rendezvous::<u32>();
        let mut recv1 = spawn(async { rx.next().await });
        assert_pending!(recv1.poll());

        drop(tx);
        assert_eq!(None, assert_ready!(recv1.poll()));
    }

    #[tokio::test]
    async fn sender_fails_on_rx_close() {
        let (tx, rx) = rendezvous();
        let sup = Supervisor::new();
        drop(rx);

        let mut send1 = spawn(async { tx.send_until_dying(10, &sup).await });
        assert_eq!(Delivery::Disconnected, assert_ready!(send1.poll()));
    }

    #[tokio::test]
    async fn send_until_dying_is_cancelled_by_stop() {
        let (tx, _rx) = rendezvous();
        let sup = Supervisor::new();

        let mut send1 = spawn(async { tx.send_until_dying(10, &sup).await });
        assert_pending!(send1.poll());

        sup.stop();
        assert!(send1.is_woken());
        assert_eq!(Delivery::Cancelled, assert_ready!(send1.poll()));
    }

    #[tokio::test]
    async fn send_until_dying_keeps_waiting_while_draining() {
        let (tx, rx) = rendezvous();
        let sup = Supervisor::new();

        let mut send1 = spawn(async { tx.send_until_dying(7, &sup).await });
        assert_pending!(send1.poll());

        sup.stop_at_eof();
        assert_pending!(send1.poll());

        let mut recv1 = spawn(async { rx.next().await });
        assert_eq!(Some(7), assert_ready!(recv1.poll()));
        assert_eq!(Delivery::Sent, assert_ready!(send1.poll()));
    }

    #[tokio::test]
    async fn stream_ends_when_sender_dropped() {
        use futures::StreamExt;

        let (tx, rx) = rendezvous();
        let sup = Supervisor::new();
        let producer = tokio::spawn(async move {
            for i in 0..3 {
                tx.send_until_dying(i, &sup).await;
            }
        });

        let items: Vec<u32> = rx.stream().collect().await;
        assert_eq!(items, vec![0, 1, 2]);
        producer.await.unwrap();
    }
}
