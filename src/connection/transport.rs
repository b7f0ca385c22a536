//! Byte transports a [`Connection`](super::Connection) can drive.
//!
//! A connection reads raw chunks from a [`ByteSource`] and writes whole frames
//! to a [`FrameSink`]. Stream transports (plain TCP, TLS, in-memory duplex
//! pipes) pass bytes straight through; WebSocket transports carry each
//! outgoing frame in one binary message and feed every inbound binary or text
//! message to the frame decoder as ordinary stream bytes.

use std::io;

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use futures::{
    SinkExt,
    StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};

/// Read half of a transport.
#[async_trait]
pub trait ByteSource: Send {
    /// Read at most `buf.len()` bytes. `Ok(0)` signals end of stream.
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Write half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one complete frame and flush it.
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Close the write direction.
    async fn close(&mut self) -> io::Result<()>;
}

/// Boxed read and write halves of one transport.
pub type TransportHalves = (Box<dyn ByteSource>, Box<dyn FrameSink>);

/// [`ByteSource`] over any [`AsyncRead`].
pub struct StreamSource<R>(R);

#[async_trait]
impl<R> ByteSource for StreamSource<R>
where
    R: AsyncRead + Send + Unpin,
{
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> { self.0.read(buf).await }
}

/// [`FrameSink`] over any [`AsyncWrite`].
pub struct StreamSink<W>(W);

#[async_trait]
impl<W> FrameSink for StreamSink<W>
where
    W: AsyncWrite + Send + Unpin,
{
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.0.write_all(frame).await?;
        self.0.flush().await
    }

    async fn close(&mut self) -> io::Result<()> { self.0.shutdown().await }
}

/// Split a byte stream into connection halves.
pub fn split_stream<S>(stream: S) -> TransportHalves
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(StreamSource(reader)), Box::new(StreamSink(writer)))
}

/// [`ByteSource`] reading the payloads of WebSocket data messages.
pub struct WebSocketSource<S> {
    inner: SplitStream<WebSocketStream<S>>,
    pending: Bytes,
}

#[async_trait]
impl<S> ByteSource for WebSocketSource<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if !self.pending.is_empty() {
                let n = buf.len().min(self.pending.len());
                buf[..n].copy_from_slice(&self.pending[..n]);
                self.pending.advance(n);
                return Ok(n);
            }
            match self.inner.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(0),
                Some(Err(err)) => return Err(io::Error::other(err)),
                Some(Ok(Message::Binary(data))) => self.pending = Bytes::from(data),
                Some(Ok(Message::Text(text))) => {
                    self.pending = Bytes::copy_from_slice(text.as_bytes());
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

/// [`FrameSink`] sending each frame as one binary WebSocket message.
pub struct WebSocketSink<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> FrameSink for WebSocketSink<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.inner
            .send(Message::binary(frame.to_vec()))
            .await
            .map_err(io::Error::other)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.close().await.map_err(io::Error::other)
    }
}

/// Split an upgraded WebSocket into connection halves.
pub fn split_websocket<S>(socket: WebSocketStream<S>) -> TransportHalves
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (sink, stream) = socket.split();
    (
        Box::new(WebSocketSource {
            inner: stream,
            pending: Bytes::new(),
        }),
        Box::new(WebSocketSink { inner: sink }),
    )
}
