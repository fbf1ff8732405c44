//! Daemon socket connection.
//!
//! The connection manager only needs "give me a fresh byte stream". That is
//! the [`Connector`] seam: production uses [`UnixConnector`] on the daemon's
//! well-known socket path, tests plug in anything that is
//! `AsyncRead + AsyncWrite`.
//!
//! # Example
//!
//! ```ignore
//! use cne_client::transport::{Connector, UnixConnector};
//!
//! let connector = UnixConnector::new("/dev/socket/cnd");
//! let stream = connector.connect().await?;
//! ```

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed future type for connector methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A connected, bidirectional byte stream.
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> LinkStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Boxed stream returned by connectors.
pub type BoxedStream = Box<dyn LinkStream>;

/// Opens connections to the daemon.
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection.
    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>>;

    /// Human-readable peer address for logs.
    fn describe(&self) -> String;
}

/// Unix domain socket connector.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
}

impl UnixConnector {
    /// Connector for the socket at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
impl Connector for UnixConnector {
    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
        Box::pin(async move {
            let stream = tokio::net::UnixStream::connect(&self.path).await?;
            Ok(Box::new(stream) as BoxedStream)
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(not(unix))]
impl Connector for UnixConnector {
    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
        Box::pin(async move {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Unix domain sockets are not available on this platform",
            ))
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
