//! Platform-specific pipe/socket implementation.
//!
//! - Unix: Unix Domain Socket
//! - Windows: Named Pipe
//!
//! A streaming connection uses two one-way pipes derived from a base name:
//! `<base>.incoming` carries client-to-server traffic and `<base>.outgoing`
//! carries server-to-client traffic.
//!
//! # Example
//!
//! ```ignore
//! use streamwire::transport::{pipe_path, PipeListener, INCOMING_SUFFIX};
//!
//! let path = pipe_path("bot", INCOMING_SUFFIX);
//! let listener = PipeListener::bind(&path).await?;
//! let stream = listener.accept().await?;
//! ```

use crate::error::Result;

/// Suffix of the client-to-server pipe.
pub const INCOMING_SUFFIX: &str = "incoming";

/// Suffix of the server-to-client pipe.
pub const OUTGOING_SUFFIX: &str = "outgoing";

/// Derive the platform pipe path for a base name and direction suffix.
///
/// Format:
/// - Unix: `{tmp}/{base}.{suffix}.sock`
/// - Windows: `\\.\pipe\{base}.{suffix}`
pub fn pipe_path(base_name: &str, suffix: &str) -> String {
    #[cfg(unix)]
    {
        std::env::temp_dir()
            .join(format!("{}.{}.sock", base_name, suffix))
            .to_string_lossy()
            .into_owned()
    }

    #[cfg(windows)]
    {
        format!(r"\\.\pipe\{}.{}", base_name, suffix)
    }
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::unix::io::AsRawFd;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use tokio::net::{UnixListener, UnixStream};

    /// Unix Domain Socket listener.
    pub struct PipeListener {
        listener: UnixListener,
        path: String,
        _lock: PathLock,
    }

    /// Unix Domain Socket stream (connected).
    pub struct PipeStream {
        stream: UnixStream,
    }

    /// Exclusive advisory lock on `<socket>.lock`, held for the listener's lifetime.
    struct PathLock {
        file: File,
        path: String,
    }

    impl PathLock {
        fn try_acquire(socket_path: &str) -> Result<Self> {
            let path = format!("{}.lock", socket_path);
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&path)?;

            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc != 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Err(io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!("address already in use: {}", socket_path),
                    )
                    .into());
                }
                return Err(err.into());
            }

            Ok(Self { file, path })
        }
    }

    impl Drop for PathLock {
        fn drop(&mut self) {
            // Unlink while still locked so a racing bind cannot lock the old inode.
            let _ = std::fs::remove_file(&self.path);
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }

    impl PipeListener {
        /// Bind to a Unix socket path.
        ///
        /// Ownership of the name is decided by a lock file next to the
        /// socket, so the live listener is never touched. A second bind
        /// fails with `AddrInUse`; a leftover socket file from a dead
        /// process is replaced.
        pub async fn bind(path: &str) -> Result<Self> {
            let lock = PathLock::try_acquire(path)?;

            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!("Removed stale socket {}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            let listener = UnixListener::bind(path)?;

            Ok(Self {
                listener,
                path: path.to_string(),
                _lock: lock,
            })
        }

        /// Accept a single connection.
        pub async fn accept(&self) -> Result<PipeStream> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(PipeStream { stream })
        }

        /// Get the socket path.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl Drop for PipeListener {
        fn drop(&mut self) {
            // The lock is released after this, when `_lock` drops.
            let _ = std::fs::remove_file(&self.path);
        }
    }

    /// Connect to a listening pipe.
    pub async fn connect_pipe(path: &str) -> Result<PipeStream> {
        let stream = UnixStream::connect(path).await?;
        Ok(PipeStream { stream })
    }

    impl AsyncRead for PipeStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.stream).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for PipeStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.stream).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.stream).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.stream).poll_shutdown(cx)
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions};
    use tokio::sync::Mutex;

    /// ERROR_PIPE_BUSY
    const PIPE_BUSY: i32 = 231;

    /// Windows Named Pipe listener.
    pub struct PipeListener {
        path: String,
        next: Mutex<Option<NamedPipeServer>>,
    }

    /// Windows Named Pipe stream (connected).
    pub enum PipeStream {
        /// Server end of the pipe.
        Server(NamedPipeServer),
        /// Client end of the pipe.
        Client(NamedPipeClient),
    }

    impl PipeListener {
        /// Create the first instance of a Named Pipe.
        ///
        /// Fails if another server already owns the name.
        pub async fn bind(path: &str) -> Result<Self> {
            let server = ServerOptions::new().first_pipe_instance(true).create(path)?;

            Ok(Self {
                path: path.to_string(),
                next: Mutex::new(Some(server)),
            })
        }

        /// Accept a single connection.
        pub async fn accept(&self) -> Result<PipeStream> {
            let mut next = self.next.lock().await;
            let server = match next.take() {
                Some(server) => server,
                None => ServerOptions::new().create(&self.path)?,
            };

            server.connect().await?;
            Ok(PipeStream::Server(server))
        }

        /// Get the pipe path.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    /// Connect to a listening pipe, waiting while every instance is busy.
    pub async fn connect_pipe(path: &str) -> Result<PipeStream> {
        loop {
            match ClientOptions::new().open(path) {
                Ok(client) => return Ok(PipeStream::Client(client)),
                Err(e) if e.raw_os_error() == Some(PIPE_BUSY) => {}
                Err(e) => return Err(e.into()),
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    impl AsyncRead for PipeStream {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => Pin::new(pipe).poll_read(cx, buf),
                PipeStream::Client(pipe) => Pin::new(pipe).poll_read(cx, buf),
            }
        }
    }

    impl AsyncWrite for PipeStream {
        fn poll_write(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => Pin::new(pipe).poll_write(cx, buf),
                PipeStream::Client(pipe) => Pin::new(pipe).poll_write(cx, buf),
            }
        }

        fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => Pin::new(pipe).poll_flush(cx),
                PipeStream::Client(pipe) => Pin::new(pipe).poll_flush(cx),
            }
        }

        fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => Pin::new(pipe).poll_shutdown(cx),
                PipeStream::Client(pipe) => Pin::new(pipe).poll_shutdown(cx),
            }
        }
    }
}

// ============================================================================
// Platform-independent re-exports
// ============================================================================

#[cfg(unix)]
pub use unix_impl::{connect_pipe, PipeListener, PipeStream};

#[cfg(windows)]
pub use windows_impl::{connect_pipe, PipeListener, PipeStream};
