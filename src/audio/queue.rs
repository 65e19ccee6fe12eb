//! # Frame Queues
//!
//! The two per-call FIFO queues (inbound-for-recognition and
//! outbound-for-transport) are unbounded mpsc channels with exactly one
//! producer each. The terminal sentinel is channel closure: `finish()` on the
//! sender closes the channel, a blocked `recv()` wakes with `None`, and every
//! later `recv()` returns `None` immediately. Closing twice is a no-op, so a
//! session can never emit more than one sentinel per queue.
//!
//! Unbounded on purpose: a slow consumer must never block the transport
//! receive loop. Call durations bound the growth.

use crate::audio::codec::MediaFrame;
use tokio::sync::mpsc;

/// Create a connected frame queue pair.
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FrameSender { inner: Some(tx) }, FrameReceiver { inner: rx })
}

/// Producing half of a frame queue. Single-owner; dropping it without calling
/// [`FrameSender::finish`] closes the queue the same way.
pub struct FrameSender {
    inner: Option<mpsc::UnboundedSender<MediaFrame>>,
}

impl FrameSender {
    /// Enqueue one frame. Returns the frame back if the queue is already
    /// finished or the consumer is gone, so callers can notice and stop
    /// producing.
    pub fn send(&self, frame: MediaFrame) -> Result<(), MediaFrame> {
        match &self.inner {
            Some(tx) => tx.send(frame).map_err(|e| e.0),
            None => Err(frame),
        }
    }

    /// Push the sentinel: close the queue. Idempotent.
    pub fn finish(&mut self) {
        self.inner.take();
    }

    /// Whether the sentinel has already been pushed.
    pub fn is_finished(&self) -> bool {
        self.inner.is_none()
    }
}

/// Consuming half of a frame queue.
pub struct FrameReceiver {
    inner: mpsc::UnboundedReceiver<MediaFrame>,
}

impl FrameReceiver {
    /// Dequeue the next frame, waiting until one is available. `None` is the
    /// sentinel: the producer finished and every already-queued frame has been
    /// delivered.
    pub async fn recv(&mut self) -> Option<MediaFrame> {
        self.inner.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(byte: u8) -> MediaFrame {
        MediaFrame::new(vec![byte; 4])
    }

    /// Consumption order equals push order for any frames queued before the
    /// sentinel.
    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let (mut tx, mut rx) = frame_channel();
        for i in 0..10u8 {
            tx.send(frame(i)).unwrap();
        }
        tx.finish();

        for i in 0..10u8 {
            assert_eq!(rx.recv().await, Some(frame(i)));
        }
        assert_eq!(rx.recv().await, None);
    }

    /// The sentinel unblocks a waiting consumer, and later dequeues see it
    /// immediately.
    #[tokio::test]
    async fn test_sentinel_unblocks_waiting_recv() {
        let (mut tx, mut rx) = frame_channel();

        let waiter = tokio::spawn(async move {
            let first = rx.recv().await;
            let second = rx.recv().await;
            (first, second)
        });

        // Give the consumer a moment to block on the empty queue
        tokio::task::yield_now().await;
        tx.finish();

        let (first, second) = waiter.await.unwrap();
        assert_eq!(first, None);
        assert_eq!(second, None);
    }

    /// Finishing twice is a no-op, and sends after the sentinel are rejected
    /// instead of re-opening the queue.
    #[tokio::test]
    async fn test_finish_is_idempotent() {
        let (mut tx, mut rx) = frame_channel();
        tx.send(frame(1)).unwrap();
        tx.finish();
        tx.finish();
        assert!(tx.is_finished());
        assert!(tx.send(frame(2)).is_err());

        assert_eq!(rx.recv().await, Some(frame(1)));
        assert_eq!(rx.recv().await, None);
        assert_eq!(rx.recv().await, None);
    }

    /// Frames enqueued before the sentinel are all delivered even when the
    /// sentinel arrives while the queue is still full.
    #[tokio::test]
    async fn test_queued_frames_survive_close() {
        let (mut tx, mut rx) = frame_channel();
        for i in 0..100u8 {
            tx.send(frame(i)).unwrap();
        }
        tx.finish();

        let mut delivered = 0u32;
        while rx.recv().await.is_some() {
            delivered += 1;
        }
        assert_eq!(delivered, 100);
    }
}
