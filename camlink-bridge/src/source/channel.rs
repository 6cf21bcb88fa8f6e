//! Async-to-pipeline frame channel
//!
//! For integration layers that receive frames in async code (a network
//! client, a device SDK callback bridged into tokio). The async side holds a
//! [`FrameSender`]; the [`ChannelSource`] end is driven by a `SourcePump`.
//! The stream ends when every sender has been dropped.

use super::EncodedAudioSource;
use crate::audio::types::EncodedFrame;
use crate::error::{Error, Result};
use tokio::sync::mpsc;

/// Bounded frame channel with `capacity` frames of slack
pub fn channel(capacity: usize) -> (FrameSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (FrameSender { tx }, ChannelSource { rx })
}

#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<EncodedFrame>,
}

impl FrameSender {
    /// Send, waiting for room
    pub async fn send(&self, frame: EncodedFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| Error::Source("Frame channel closed".to_string()))
    }

    /// Send without waiting; a full channel drops the frame
    pub fn try_send(&self, frame: EncodedFrame) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::Source("Frame channel full".to_string()),
            mpsc::error::TrySendError::Closed(_) => {
                Error::Source("Frame channel closed".to_string())
            }
        })
    }

    /// Send from synchronous code (not from inside an async task)
    pub fn blocking_send(&self, frame: EncodedFrame) -> Result<()> {
        self.tx
            .blocking_send(frame)
            .map_err(|_| Error::Source("Frame channel closed".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct ChannelSource {
    rx: mpsc::Receiver<EncodedFrame>,
}

impl EncodedAudioSource for ChannelSource {
    fn next_frame(&mut self) -> Result<Option<EncodedFrame>> {
        Ok(self.rx.blocking_recv())
    }

    fn describe(&self) -> String {
        "frame channel".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_arrive_in_order_then_end() {
        let (tx, mut source) = channel(4);
        tx.try_send(EncodedFrame::new(vec![0xD5; 8], 1, 8000)).unwrap();
        tx.try_send(EncodedFrame::new(vec![0xD5; 8], 2, 8000)).unwrap();
        drop(tx);

        assert_eq!(source.next_frame().unwrap().unwrap().sequence, 1);
        assert_eq!(source.next_frame().unwrap().unwrap().sequence, 2);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_full_channel_rejects_try_send() {
        let (tx, _source) = channel(1);
        tx.try_send(EncodedFrame::new(vec![0; 4], 0, 8000)).unwrap();
        let err = tx.try_send(EncodedFrame::new(vec![0; 4], 1, 8000)).unwrap_err();
        assert!(err.to_string().contains("full"));
    }

    #[tokio::test]
    async fn test_async_sender_feeds_blocking_source() {
        let (tx, mut source) = channel(8);
        let reader = tokio::task::spawn_blocking(move || {
            let mut seen = Vec::new();
            while let Some(frame) = source.next_frame().unwrap() {
                seen.push(frame.sequence);
            }
            seen
        });

        for seq in 0..5 {
            tx.send(EncodedFrame::new(vec![0x55; 16], seq, 8000)).await.unwrap();
        }
        drop(tx);

        assert_eq!(reader.await.unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
