//! Host connection with phase deadlines and forced termination.

use super::wire;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::net::Shutdown;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

const OPEN: u8 = 0;
const CLOSED: u8 = 1;

/// Session state shared with the cancellation watcher.
///
/// Whichever of `close` and the watcher performs the Open→Closed transition
/// first owns the graceful shutdown; termination itself is idempotent.
pub(crate) struct SessionState {
    state: AtomicU8,
    /// Fires when the session must stop all I/O. Child of the external
    /// cancellation token.
    kill: CancellationToken,
    /// Second handle on the socket, used to shut it down from outside the
    /// task that owns the stream.
    socket: std::net::TcpStream,
}

impl SessionState {
    /// Transition Open→Closed. Returns `true` for the caller that won.
    pub(crate) fn try_close(&self) -> bool {
        self.state
            .compare_exchange(OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == CLOSED
    }

    /// Abort in-flight I/O and shut the socket down.
    pub(crate) fn terminate(&self) {
        self.state.store(CLOSED, Ordering::Release);
        self.kill.cancel();
        // Already shut down or reset by the peer; nothing left to do.
        let _ = self.socket.shutdown(Shutdown::Both);
    }

    pub(crate) fn killed(&self) -> &CancellationToken {
        &self.kill
    }
}

/// A connection to a host.
///
/// Every read and write is bounded by the current deadline and aborted when
/// the session is terminated.
pub(crate) struct HostConn {
    stream: TcpStream,
    deadline: Instant,
    state: Arc<SessionState>,
    cancel: CancellationToken,
}

impl HostConn {
    /// Wrap a freshly dialed stream.
    pub(crate) fn new(
        stream: TcpStream,
        cancel: CancellationToken,
        initial: Duration,
    ) -> Result<Self> {
        let std_stream = stream.into_std()?;
        let socket = std_stream.try_clone()?;
        let stream = TcpStream::from_std(std_stream)?;

        let state = Arc::new(SessionState {
            state: AtomicU8::new(OPEN),
            kill: cancel.child_token(),
            socket,
        });

        Ok(Self {
            stream,
            deadline: Instant::now() + initial,
            state,
            cancel,
        })
    }

    pub(crate) fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Error to report for I/O on a terminated session.
    pub(crate) fn closed_error(&self) -> Error {
        if self.cancel.is_cancelled() {
            Error::Interrupted
        } else {
            Error::SessionClosed
        }
    }

    /// Move the deadline to `timeout` from now.
    pub(crate) fn extend_deadline(&mut self, timeout: Duration) {
        self.deadline = Instant::now() + timeout;
    }

    /// Borrow the connection; the deadline is reset to `idle` from now when
    /// the borrow ends, whichever way the caller exits.
    pub(crate) fn scoped(&mut self, idle: Duration) -> IdleOnDrop<'_> {
        IdleOnDrop { conn: self, idle }
    }

    pub(crate) async fn write_object<T: Serialize>(
        &mut self,
        phase: &'static str,
        object: &T,
    ) -> Result<()> {
        trace!("Writing {phase}");
        let io = wire::write_object(&mut self.stream, object);
        bounded(phase, self.deadline, &self.state, &self.cancel, io).await
    }

    pub(crate) async fn read_object<T: DeserializeOwned>(
        &mut self,
        phase: &'static str,
        max_len: u64,
    ) -> Result<T> {
        trace!("Reading {phase}");
        let io = wire::read_object(&mut self.stream, max_len);
        bounded(phase, self.deadline, &self.state, &self.cancel, io).await
    }
}

/// Race `io` against the deadline and session termination.
async fn bounded<T>(
    phase: &'static str,
    deadline: Instant,
    state: &SessionState,
    cancel: &CancellationToken,
    io: impl Future<Output = Result<T>>,
) -> Result<T> {
    let closed = || {
        if cancel.is_cancelled() {
            Error::Interrupted
        } else {
            Error::SessionClosed
        }
    };

    tokio::select! {
        biased;
        () = state.kill.cancelled() => Err(closed()),
        res = tokio::time::timeout_at(deadline, io) => match res {
            Err(_) => Err(Error::Timeout(phase)),
            Ok(Err(Error::Io(_))) if state.kill.is_cancelled() => Err(closed()),
            Ok(res) => res,
        },
    }
}

/// Deadline guard returned by [`HostConn::scoped`].
pub(crate) struct IdleOnDrop<'a> {
    conn: &'a mut HostConn,
    idle: Duration,
}

impl Deref for IdleOnDrop<'_> {
    type Target = HostConn;

    fn deref(&self) -> &HostConn {
        self.conn
    }
}

impl DerefMut for IdleOnDrop<'_> {
    fn deref_mut(&mut self) -> &mut HostConn {
        self.conn
    }
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.conn.extend_deadline(self.idle);
    }
}
