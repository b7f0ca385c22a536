//! Serving a connection: read pump and finalization.

use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, atomic::Ordering},
};

use futures::FutureExt;

use super::{ByteSource, Connection, lock};
use crate::{
    frame::FrameDecoder,
    metrics::{self, Direction, ErrorKind},
    panic::format_panic,
    request::Request,
};

impl Connection {
    /// Drive the connection until it stops, then finalize it.
    ///
    /// Runs the on-start hook, binds the configured heartbeat and spawns the
    /// read pump over `source`. Returns once finalization has completed.
    pub async fn serve(self: Arc<Self>, source: Box<dyn ByteSource>) {
        tracing::debug!(conn_id = %self.id, peer = ?self.addrs.peer, "connection started");
        self.touch();
        self.config.hooks.run_on_start(&self).await;
        if let Some(checker) = &self.config.heartbeat {
            let mut handle = checker.bind(Arc::clone(&self));
            handle.start();
            self.set_heartbeat(handle);
        }

        let reader = Arc::clone(&self);
        let pump = tokio::spawn(async move {
            let conn = Arc::clone(&reader);
            if let Err(panic) = AssertUnwindSafe(reader.read_pump(source))
                .catch_unwind()
                .await
            {
                let panic_msg = format_panic(&*panic);
                tracing::error!(conn_id = %conn.id, panic = %panic_msg, "read pump panicked");
            }
            conn.stop();
        });

        self.lifetime.cancelled().await;
        self.finalize().await;
        if let Err(err) = pump.await {
            tracing::debug!(conn_id = %self.id, error = %err, "read pump task failed");
        }
    }

    async fn read_pump(self: Arc<Self>, mut source: Box<dyn ByteSource>) {
        let mut decoder = FrameDecoder::new(self.config.length_field);
        let mut buf = vec![0u8; self.config.io_read_buff_size];
        loop {
            let read = tokio::select! {
                biased;
                () = self.lifetime.cancelled() => break,
                res = source.read_chunk(&mut buf) => res,
            };
            let n = match read {
                Ok(0) => {
                    tracing::debug!(conn_id = %self.id, "peer closed connection");
                    break;
                }
                Ok(n) => n,
                Err(err) => {
                    tracing::debug!(conn_id = %self.id, error = %err, "read failed");
                    break;
                }
            };
            self.touch();

            let frames = match decoder.decode(&buf[..n]) {
                Ok(frames) => frames,
                Err(err) => {
                    tracing::warn!(conn_id = %self.id, error = %err, "framing violation");
                    metrics::inc_errors(ErrorKind::Protocol);
                    break;
                }
            };
            metrics::inc_frames(Direction::Inbound, frames.len() as u64);
            for frame in frames {
                let message = match self.config.packer.unpack_frame(frame) {
                    Ok(message) => message,
                    Err(err) => {
                        tracing::warn!(conn_id = %self.id, error = %err, "malformed packet");
                        metrics::inc_errors(ErrorKind::Protocol);
                        self.stop();
                        return;
                    }
                };
                let request = Request::new(Arc::clone(&self), message);
                // A full worker queue must not hold the pump past `stop()`.
                tokio::select! {
                    biased;
                    () = self.lifetime.cancelled() => return,
                    () = self.config.dispatcher.submit(request) => {}
                }
            }
        }
        self.stop();
    }

    /// Release everything the connection holds. Runs once; later calls
    /// return immediately.
    pub(crate) async fn finalize(self: &Arc<Self>) {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return;
        }
        self.lifetime.cancel();
        self.config.hooks.run_on_stop(self).await;
        self.close_send_paths();
        if let Some(handle) = lock(&self.heartbeat).take() {
            handle.stop();
        }
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink
            && let Err(err) = sink.close().await
        {
            tracing::debug!(conn_id = %self.id, error = %err, "transport shutdown failed");
        }
        if let Some(manager) = self.config.manager() {
            manager.remove(self.id);
        }
        lock(&self.slot).take();
        tracing::info!(conn_id = %self.id, peer = ?self.addrs.peer, "connection stopped");
    }
}
