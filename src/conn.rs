//! One transport connection carrying framed control messages and raw file bodies
//!
//! There is no read-ahead: a framed read consumes exactly the length prefix and
//! its payload, and a raw read consumes exactly the requested byte count. Which
//! of the two comes next is decided by the caller's position in the exchange.

use crate::checksum::Md5Stream;
use crate::error::{Result, TransferError};
use crate::protocol::{
    timeouts, Checksum, ChecksumMessage, Envelope, Response, RetrievalResponse, LEN_PREFIX,
    STREAM_CHUNK,
};
use crate::protocol_core::{decode_envelope, encode_envelope, parse_frame_header};
use indicatif::ProgressBar;
use std::io;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

pub struct Connection<S> {
    stream: S,
    closed: bool,
}

impl Connection<TcpStream> {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            TransferError::Transport(io::Error::new(e.kind(), format!("connect {}: {}", addr, e)))
        })?;
        let _ = stream.set_nodelay(true);
        Ok(Self::new(stream))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TransferError::Transport(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection already closed",
            )));
        }
        Ok(())
    }

    /// Encode and write one envelope as a single write
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        self.ensure_open()?;
        let frame = encode_envelope(envelope)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one framed envelope; `Ok(None)` when the peer disconnected before
    /// sending any byte of a new frame.
    pub async fn receive(&mut self) -> Result<Option<Envelope>> {
        self.ensure_open()?;
        let mut hdr = [0u8; LEN_PREFIX];
        let mut filled = 0;
        while filled < LEN_PREFIX {
            let n = self.stream.read(&mut hdr[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(TransferError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("EOF after {} of {} frame header bytes", filled, LEN_PREFIX),
                )));
            }
            filled += n;
        }
        let len = parse_frame_header(&hdr)?;
        let mut payload = vec![0u8; len];
        if len > 0 {
            self.stream.read_exact(&mut payload).await?;
        }
        decode_envelope(&payload).map(Some)
    }

    /// Raw passthrough read of exactly `buf.len()` bytes
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        self.stream.read_exact(buf).await?;
        Ok(())
    }

    /// Raw passthrough write
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.stream.write_all(buf).await?;
        Ok(())
    }

    /// Copy exactly `len` raw bytes from the connection into `sink`, hashing them.
    ///
    /// `sink_path` only labels local write errors.
    pub async fn recv_raw_into<W>(
        &mut self,
        sink: &mut W,
        sink_path: &Path,
        len: u64,
        sum: &mut Md5Stream,
        progress: Option<&ProgressBar>,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        self.ensure_open()?;
        if let Some(pb) = progress {
            pb.set_length(len);
            pb.set_position(0);
        }
        let mut buf = vec![0u8; chunk_len(len)];
        let mut remaining = len;
        while remaining > 0 {
            let to_read = remaining.min(buf.len() as u64) as usize;
            let n = self.stream.read(&mut buf[..to_read]).await?;
            if n == 0 {
                return Err(TransferError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "unexpected EOF during raw file body: got {} of {} bytes",
                        len - remaining,
                        len
                    ),
                )));
            }
            sink.write_all(&buf[..n])
                .await
                .map_err(|e| TransferError::local(sink_path, e))?;
            sum.update(&buf[..n]);
            remaining -= n as u64;
            if let Some(pb) = progress {
                pb.inc(n as u64);
            }
        }
        sink.flush()
            .await
            .map_err(|e| TransferError::local(sink_path, e))?;
        Ok(len)
    }

    /// Copy exactly `len` raw bytes from `source` onto the connection, hashing them.
    ///
    /// A source that ends early is a local error; extra source bytes are not sent.
    pub async fn send_raw_from<R>(
        &mut self,
        source: &mut R,
        source_path: &Path,
        len: u64,
        sum: &mut Md5Stream,
        progress: Option<&ProgressBar>,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        self.ensure_open()?;
        if let Some(pb) = progress {
            pb.set_length(len);
            pb.set_position(0);
        }
        let mut buf = vec![0u8; chunk_len(len)];
        let mut remaining = len;
        while remaining > 0 {
            let to_read = remaining.min(buf.len() as u64) as usize;
            let n = source
                .read(&mut buf[..to_read])
                .await
                .map_err(|e| TransferError::local(source_path, e))?;
            if n == 0 {
                return Err(TransferError::local(
                    source_path,
                    io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("file ended after {} of {} bytes", len - remaining, len),
                    ),
                ));
            }
            self.stream.write_all(&buf[..n]).await?;
            sum.update(&buf[..n]);
            remaining -= n as u64;
            if let Some(pb) = progress {
                pb.inc(n as u64);
            }
        }
        self.stream.flush().await?;
        Ok(len)
    }

    pub async fn send_response(&mut self, success: bool, message: impl Into<String>) -> Result<()> {
        self.send(&Envelope::response(success, message)).await
    }

    pub async fn send_retrieval_response(
        &mut self,
        success: bool,
        message: impl Into<String>,
        size: u64,
    ) -> Result<()> {
        self.send(&Envelope::retrieval_response(success, message, size))
            .await
    }

    pub async fn send_checksum(&mut self, checksum: Checksum) -> Result<()> {
        self.send(&Envelope::Checksum(ChecksumMessage { checksum }))
            .await
    }

    async fn receive_some(&mut self, expected: &str) -> Result<Envelope> {
        match self.receive().await? {
            Some(envelope) => Ok(envelope),
            None => Err(TransferError::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed by peer while awaiting {}", expected),
            ))),
        }
    }

    pub async fn expect_response(&mut self) -> Result<Response> {
        match self.receive_some("Response").await? {
            Envelope::Response(r) => Ok(r),
            other => Err(unexpected("Response", &other)),
        }
    }

    pub async fn expect_retrieval_response(&mut self) -> Result<RetrievalResponse> {
        match self.receive_some("RetrievalResponse").await? {
            Envelope::RetrievalResponse(r) => Ok(r),
            other => Err(unexpected("RetrievalResponse", &other)),
        }
    }

    pub async fn expect_checksum(&mut self) -> Result<Checksum> {
        match self.receive_some("ChecksumMessage").await? {
            Envelope::Checksum(c) => Ok(c.checksum),
            other => Err(unexpected("ChecksumMessage", &other)),
        }
    }

    /// Best-effort failure notice; gives up after `timeouts::NOTIFY_MS`.
    /// Returns whether the envelope was written.
    pub async fn notify(&mut self, envelope: &Envelope) -> bool {
        if self.closed {
            return false;
        }
        matches!(
            timeout(Duration::from_millis(timeouts::NOTIFY_MS), self.send(envelope)).await,
            Ok(Ok(()))
        )
    }

    /// Shut down the transport. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.stream.shutdown().await;
    }
}

fn chunk_len(len: u64) -> usize {
    (len.min(STREAM_CHUNK as u64) as usize).max(1)
}

fn unexpected(expected: &str, got: &Envelope) -> TransferError {
    TransferError::Protocol(format!("expected {}, got {}", expected, got.kind()))
}
