//! Direct and queued send paths.
//!
//! Direct sends write through the transport under the sink lock. Queued sends
//! hand frames to a bounded channel drained by a write pump that is spawned on
//! first use; a full queue is reported after `send_buff_timeout` instead of
//! blocking the caller.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

use super::{Connection, ConnectionError, lock};
use crate::metrics::{self, Direction, ErrorKind};

/// Send-path state guarded by the connection's gate lock. The lock is never
/// held across an await.
#[derive(Default)]
pub(super) struct SendGate {
    pub(super) closed: bool,
    pub(super) queue: Option<mpsc::Sender<Bytes>>,
}

impl Connection {
    /// Write preformatted bytes straight to the transport.
    ///
    /// # Errors
    /// Returns [`ConnectionError::Closed`] once the connection is stopping
    /// and [`ConnectionError::Io`] if the write fails, in which case the
    /// connection is stopped.
    pub async fn send(&self, frame: &[u8]) -> Result<(), ConnectionError> {
        if lock(&self.gate).closed {
            return Err(ConnectionError::Closed);
        }
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(ConnectionError::Closed);
        };
        let result = tokio::select! {
            biased;
            res = sink.write_frame(frame) => res,
            () = self.lifetime.cancelled() => return Err(ConnectionError::Closed),
        };
        if let Err(err) = result {
            tracing::warn!(conn_id = %self.id, error = %err, "write failed");
            self.stop();
            return Err(err.into());
        }
        metrics::inc_frames(Direction::Outbound, 1);
        Ok(())
    }

    /// Pack `data` as message `msg_id` and write it directly.
    ///
    /// # Errors
    /// See [`Connection::send`]; packing failures return
    /// [`ConnectionError::Pack`].
    pub async fn send_msg(&self, msg_id: u32, data: &[u8]) -> Result<(), ConnectionError> {
        let frame = self.pack(msg_id, data)?;
        self.send(&frame).await
    }

    /// Queue preformatted bytes for the write pump.
    ///
    /// # Errors
    /// Returns [`ConnectionError::QueueFull`] if no slot frees up within the
    /// configured enqueue timeout and [`ConnectionError::Closed`] once the
    /// connection is stopping.
    pub async fn send_to_queue(self: &Arc<Self>, frame: Bytes) -> Result<(), ConnectionError> {
        let tx = self.queue_sender()?;
        match tx.send_timeout(frame, self.config.send_buff_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!(conn_id = %self.id, "send queue full");
                metrics::inc_errors(ErrorKind::QueueFull);
                Err(ConnectionError::QueueFull)
            }
            Err(SendTimeoutError::Closed(_)) => Err(ConnectionError::Closed),
        }
    }

    /// Pack `data` as message `msg_id` and queue it.
    ///
    /// # Errors
    /// See [`Connection::send_to_queue`]; packing failures return
    /// [`ConnectionError::Pack`].
    pub async fn send_buff_msg(
        self: &Arc<Self>,
        msg_id: u32,
        data: &[u8],
    ) -> Result<(), ConnectionError> {
        let frame = self.pack(msg_id, data)?;
        self.send_to_queue(frame).await
    }

    /// Sender for the outbound queue, starting the write pump on first use.
    fn queue_sender(self: &Arc<Self>) -> Result<mpsc::Sender<Bytes>, ConnectionError> {
        let mut gate = lock(&self.gate);
        if gate.closed || self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        if let Some(tx) = &gate.queue {
            return Ok(tx.clone());
        }
        let (tx, rx) = mpsc::channel(self.config.max_msg_chan_len);
        gate.queue = Some(tx.clone());
        drop(gate);
        tokio::spawn(Arc::clone(self).write_pump(rx));
        Ok(tx)
    }

    async fn write_pump(self: Arc<Self>, mut rx: mpsc::Receiver<Bytes>) {
        tracing::trace!(conn_id = %self.id, "write pump started");
        loop {
            let frame = tokio::select! {
                biased;
                () = self.lifetime.cancelled() => break,
                frame = rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            let mut guard = self.sink.lock().await;
            let Some(sink) = guard.as_mut() else { break };
            let result = tokio::select! {
                biased;
                res = sink.write_frame(&frame) => res,
                () = self.lifetime.cancelled() => break,
            };
            drop(guard);
            if let Err(err) = result {
                tracing::warn!(conn_id = %self.id, error = %err, "queued write failed");
                self.stop();
                break;
            }
            metrics::inc_frames(Direction::Outbound, 1);
        }
        tracing::trace!(conn_id = %self.id, "write pump stopped");
    }

    /// Mark the send paths closed and drop the queue sender so the write
    /// pump drains out.
    pub(super) fn close_send_paths(&self) {
        let mut gate = lock(&self.gate);
        gate.closed = true;
        gate.queue = None;
    }
}
