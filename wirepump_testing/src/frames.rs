//! Raw frame I/O for driving a server from tests.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};
use tokio_util::codec::FramedRead;
use wirepump::{
    frame::FrameDecoder,
    message::Message,
    pack::{DataPack, PackError, PackKind},
};

/// Concatenate the packed form of every `(msg_id, data)` pair.
///
/// # Errors
/// Returns the first [`PackError`] raised by `packer`.
pub fn encode_frames(packer: &dyn DataPack, frames: &[(u32, &[u8])]) -> Result<Vec<u8>, PackError> {
    let mut wire = Vec::new();
    for (msg_id, data) in frames {
        wire.extend_from_slice(&packer.pack(*msg_id, data)?);
    }
    Ok(wire)
}

/// TCP client that writes packed frames and reads decoded messages.
pub struct FrameClient {
    packer: Arc<dyn DataPack>,
    reader: FramedRead<OwnedReadHalf, FrameDecoder>,
    writer: OwnedWriteHalf,
}

impl FrameClient {
    /// Connect using the default layout and a 4 KiB payload limit.
    ///
    /// # Errors
    /// Returns any error from connecting.
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        Self::connect_with(addr, PackKind::LengthType.build(4096)).await
    }

    /// Connect using `packer` for both directions.
    ///
    /// # Errors
    /// Returns any error from connecting.
    pub async fn connect_with(addr: SocketAddr, packer: Arc<dyn DataPack>) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read, writer) = stream.into_split();
        let reader = FramedRead::new(read, FrameDecoder::new(packer.length_field()));
        Ok(Self {
            packer,
            reader,
            writer,
        })
    }

    /// Pack and write one message.
    ///
    /// # Errors
    /// Returns an error if packing or writing fails.
    pub async fn send(&mut self, msg_id: u32, data: &[u8]) -> io::Result<()> {
        let frame = self
            .packer
            .pack(msg_id, data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.send_raw(&frame).await
    }

    /// Write bytes exactly as given.
    ///
    /// # Errors
    /// Returns any write error.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    /// Next message, or `None` once the server closes the stream.
    ///
    /// # Errors
    /// Returns an error if the stream fails or carries an invalid frame.
    pub async fn recv(&mut self) -> io::Result<Option<Message>> {
        match self.reader.next().await {
            None => Ok(None),
            Some(frame) => self
                .packer
                .unpack_frame(frame?)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }

    /// Like [`FrameClient::recv`], giving up after `limit`. Elapsed waits
    /// yield `Ok(None)` too; pair with [`FrameClient::is_open`] when the
    /// difference matters.
    ///
    /// # Errors
    /// See [`FrameClient::recv`].
    pub async fn recv_timeout(&mut self, limit: Duration) -> io::Result<Option<Message>> {
        tokio::time::timeout(limit, self.recv())
            .await
            .unwrap_or(Ok(None))
    }

    /// `true` unless the stream ends or fails within `grace`. A frame arriving
    /// in the meantime is discarded.
    pub async fn is_open(&mut self, grace: Duration) -> bool {
        match tokio::time::timeout(grace, self.reader.next()).await {
            Err(_) | Ok(Some(Ok(_))) => true,
            Ok(None | Some(Err(_))) => false,
        }
    }

    /// Close the write half so the server sees end of stream.
    ///
    /// # Errors
    /// Returns any shutdown error.
    pub async fn close(mut self) -> io::Result<()> { self.writer.shutdown().await }
}
