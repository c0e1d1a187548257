//! Byte-level connection and line framing.
//!
//! A [`Transport`] owns one connection attempt: the TCP socket and, when
//! enabled, the TLS session layered on top of it. Reads and writes go
//! through separate halves so a pending read never blocks a writer. The
//! only way to interrupt a pending read is [`Transport::dispose`], which
//! shuts the socket down underneath both halves.

use std::io;
use std::net::Shutdown;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use socket2::{SockRef, Socket};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadBuf,
};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use super::error::{IrcError, Result};
use super::tls;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The active stream: plain TCP or TLS over TCP.
pub enum IrcStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for IrcStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IrcStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            IrcStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IrcStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            IrcStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            IrcStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IrcStream::Plain(s) => Pin::new(s).poll_flush(cx),
            IrcStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IrcStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            IrcStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Open a TCP connection, failing with [`IrcError::ConnectTimeout`] when it
/// is not established within `timeout`.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => {
            tracing::error!(host = %host, port, error = %e, "TCP connection failed");
            Err(IrcError::Connect(e))
        }
        Err(_) => {
            tracing::error!(host = %host, port, timeout = ?timeout, "TCP connection timed out");
            Err(IrcError::ConnectTimeout(timeout))
        }
    }
}

/// Upgrade a freshly connected socket to TLS. On failure the socket is
/// dropped, closing it.
pub async fn upgrade_tls(
    stream: TcpStream,
    hostname: &str,
    skip_cert_validation: bool,
) -> Result<TlsStream<TcpStream>> {
    if skip_cert_validation {
        tracing::warn!(host = %hostname, "TLS certificate validation is disabled");
    }
    let config = tls::client_config(skip_cert_validation).map_err(|e| IrcError::Tls(e.to_string()))?;
    let server_name =
        ServerName::try_from(hostname.to_string()).map_err(|e| IrcError::Tls(e.to_string()))?;

    let connector = TlsConnector::from(Arc::new(config));
    let tls_stream = connector.connect(server_name, stream).await.map_err(|e| {
        tracing::error!(host = %hostname, error = %e, "TLS handshake failed");
        IrcError::Tls(e.to_string())
    })?;

    tracing::info!(host = %hostname, verify = !skip_cert_validation, "TLS handshake completed");
    Ok(tls_stream)
}

/// Upper bound on one inbound line, terminator included.
pub const MAX_LINE_LEN: usize = 8192;

/// Read up to the next `\n`, stopping after [`MAX_LINE_LEN`] bytes. A TLS
/// session truncated without `close_notify` counts as end of stream.
async fn read_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    match reader.take(MAX_LINE_LEN as u64).read_until(b'\n', buf).await {
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            tracing::debug!(error = %e, "Peer closed without close_notify");
            Ok(0)
        }
        other => other,
    }
}

pub struct Transport {
    reader: Mutex<BufReader<ReadHalf<IrcStream>>>,
    writer: Mutex<WriteHalf<IrcStream>>,
    socket: Socket,
    disposed: AtomicBool,
}

impl Transport {
    /// Connect to `host:port` and optionally upgrade to TLS before any
    /// protocol bytes are exchanged.
    pub async fn open(
        host: &str,
        port: u16,
        use_tls: bool,
        skip_cert_validation: bool,
    ) -> Result<Self> {
        let tcp = connect(host, port, CONNECT_TIMEOUT).await?;
        tracing::info!(host = %host, port, tls = use_tls, "TCP connected");

        let socket = SockRef::from(&tcp).try_clone().map_err(IrcError::Connect)?;
        let stream = if use_tls {
            IrcStream::Tls(Box::new(upgrade_tls(tcp, host, skip_cert_validation).await?))
        } else {
            IrcStream::Plain(tcp)
        };
        Ok(Self::from_parts(stream, socket))
    }

    fn from_parts(stream: IrcStream, socket: Socket) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
            socket,
            disposed: AtomicBool::new(false),
        }
    }

    /// Write one line followed by CRLF. Concurrent callers never interleave
    /// partial lines.
    pub async fn write_line(&self, text: &str) -> Result<()> {
        if text.contains(['\r', '\n']) {
            return Err(IrcError::InvalidLine);
        }
        let mut framed = Vec::with_capacity(text.len() + 2);
        framed.extend_from_slice(text.as_bytes());
        framed.extend_from_slice(b"\r\n");

        let mut writer = self.writer.lock().await;
        writer.write_all(&framed).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Wait for the next line. Returns `None` at end of stream, including
    /// after [`Transport::dispose`] on platforms where shutdown reads as EOF
    /// and when a TLS peer closes without sending `close_notify`.
    ///
    /// A line longer than [`MAX_LINE_LEN`] is discarded up to its terminator
    /// and reported as [`IrcError::MalformedLine`]; the stream stays usable.
    pub async fn read_line(&self) -> Result<Option<String>> {
        let mut reader = self.reader.lock().await;
        let mut buf = Vec::new();
        if read_capped(&mut *reader, &mut buf).await? == 0 {
            return Ok(None);
        }
        if !buf.ends_with(b"\n") && buf.len() >= MAX_LINE_LEN {
            let mut rest = Vec::new();
            loop {
                rest.clear();
                if read_capped(&mut *reader, &mut rest).await? == 0 || rest.ends_with(b"\n") {
                    break;
                }
            }
            buf.truncate(64);
            let head = String::from_utf8_lossy(&buf).into_owned();
            tracing::warn!(limit = MAX_LINE_LEN, "Inbound line exceeds length limit. Discarded");
            return Err(IrcError::MalformedLine(format!("{}...", head)));
        }
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Shut the connection down, waking any pending read. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            if e.kind() != io::ErrorKind::NotConnected {
                tracing::debug!(error = %e, "Socket shutdown failed");
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
