// Connection session
//
// Login-gated state machine over one transport connection. The framed
// stream only exists in `Connecting` and `LoggedIn`, so a query on a
// closed or faulted session has nothing to write to and is rejected
// with `Error::InvalidState`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::command::{DeviceClock, Register, Request, Response};
use crate::error::{Error, ProtocolError};
use crate::frame::{Direction, FrameCodec};
use crate::transport::{Connector, TcpConnector, TransportConfig};

/// Observable state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum SessionStateKind {
    #[strum(to_string = "closed")]
    Closed,
    #[strum(to_string = "connecting")]
    Connecting,
    #[strum(to_string = "logged in")]
    LoggedIn,
    #[strum(to_string = "faulted")]
    Faulted,
}

enum SessionState<Io> {
    Closed,
    Connecting(Framed<Io, FrameCodec>),
    LoggedIn(Framed<Io, FrameCodec>),
    Faulted,
}

impl<Io> SessionState<Io> {
    fn kind(&self) -> SessionStateKind {
        match self {
            Self::Closed => SessionStateKind::Closed,
            Self::Connecting(_) => SessionStateKind::Connecting,
            Self::LoggedIn(_) => SessionStateKind::LoggedIn,
            Self::Faulted => SessionStateKind::Faulted,
        }
    }
}

/// One device session: open, login, request/response round trips, logout.
///
/// Requests are never pipelined; every method takes `&mut self` and
/// completes (or times out) before the next one can be issued.
pub struct Session<C: Connector = TcpConnector> {
    connector: C,
    config: TransportConfig,
    state: SessionState<C::Io>,
}

impl Session<TcpConnector> {
    pub fn new(config: TransportConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> Session<C> {
    pub fn with_connector(config: TransportConfig, connector: C) -> Self {
        Self {
            connector,
            config,
            state: SessionState::Closed,
        }
    }

    pub fn state(&self) -> SessionStateKind {
        self.state.kind()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.state, SessionState::LoggedIn(_))
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// `Closed -> Connecting`. On failure the session stays `Closed`.
    pub async fn open(&mut self) -> Result<(), Error> {
        if !matches!(self.state, SessionState::Closed) {
            return Err(self.invalid("open"));
        }
        let io = self.connector.connect(&self.config).await?;
        self.state = SessionState::Connecting(Framed::new(io, FrameCodec));
        debug!(addr = %self.config.addr(), "session connecting");
        Ok(())
    }

    /// `Connecting -> LoggedIn`. Any failure releases the transport and
    /// leaves the session `Closed`.
    pub async fn login(&mut self) -> Result<(), Error> {
        let mut framed = match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Connecting(framed) => framed,
            other => {
                self.state = other;
                return Err(self.invalid("login"));
            }
        };

        match round_trip(&mut framed, &Request::Login, self.config.timeout).await {
            Ok(_) => {
                self.state = SessionState::LoggedIn(framed);
                debug!("session logged in");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "login failed, closing transport");
                Err(err)
            }
        }
    }

    /// Bring the session to `LoggedIn` from whatever state it is in.
    ///
    /// A faulted session is reset first, so it is never reused without
    /// passing back through `Closed`.
    pub async fn ensure_logged_in(&mut self) -> Result<(), Error> {
        match self.state.kind() {
            SessionStateKind::LoggedIn => return Ok(()),
            SessionStateKind::Faulted => self.reset(),
            SessionStateKind::Closed | SessionStateKind::Connecting => {}
        }
        if matches!(self.state, SessionState::Closed) {
            self.open().await?;
        }
        self.login().await
    }

    /// Send the logout request (best effort) and release the transport.
    /// Always ends in `Closed`.
    pub async fn logout(&mut self) {
        let timeout = self.config.timeout;
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::LoggedIn(mut framed) => {
                if let Err(err) = round_trip(&mut framed, &Request::Logout, timeout).await {
                    debug!(error = %err, "logout not acknowledged");
                }
                let _ = tokio::time::timeout(timeout, framed.close()).await;
                debug!("session logged out");
            }
            SessionState::Connecting(_) | SessionState::Faulted | SessionState::Closed => {}
        }
    }

    /// Forcibly drop the transport. `Faulted -> Closed`, or any state to `Closed`.
    pub fn reset(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed).kind();
        if previous != SessionStateKind::Closed {
            debug!(from = %previous, "session reset");
        }
    }

    // ── Round trips (LoggedIn only) ─────────────────────────────────

    /// Read a single register and return its raw value.
    pub async fn read(&mut self, register: Register) -> Result<i64, Error> {
        let request = Request::Read(register);
        match self.exchange(&request).await? {
            Response::Value { raw, .. } => Ok(raw),
            other => Err(unexpected(&request, &other)),
        }
    }

    /// Read many measurement registers with one request. Numbers the
    /// device does not know are absent from the returned map.
    pub async fn bulk_read(&mut self, numbers: &[u16]) -> Result<BTreeMap<u16, i64>, Error> {
        let request = Request::BulkRead(numbers.to_vec());
        match self.exchange(&request).await? {
            Response::Bulk(values) => Ok(values),
            other => Err(unexpected(&request, &other)),
        }
    }

    /// Write a raw value; returns the value the device reports as applied.
    pub async fn write(&mut self, register: Register, raw: i64) -> Result<i64, Error> {
        let request = Request::Write { register, raw };
        match self.exchange(&request).await? {
            Response::Value { raw, .. } => Ok(raw),
            other => Err(unexpected(&request, &other)),
        }
    }

    pub async fn read_clock(&mut self) -> Result<DeviceClock, Error> {
        let request = Request::ReadClock;
        match self.exchange(&request).await? {
            Response::Clock(clock) => Ok(clock),
            other => Err(unexpected(&request, &other)),
        }
    }

    pub async fn set_clock(&mut self, datetime: NaiveDateTime) -> Result<DeviceClock, Error> {
        let request = Request::SetClock(datetime);
        match self.exchange(&request).await? {
            Response::Clock(clock) => Ok(clock),
            other => Err(unexpected(&request, &other)),
        }
    }

    async fn exchange(&mut self, request: &Request) -> Result<Response, Error> {
        // Park the session in `Faulted` while the request is on the wire so
        // a cancelled round trip can never leave a half-read stream behind.
        let mut framed = match std::mem::replace(&mut self.state, SessionState::Faulted) {
            SessionState::LoggedIn(framed) => framed,
            other => {
                self.state = other;
                return Err(self.invalid(request.operation()));
            }
        };

        let result = round_trip(&mut framed, request, self.config.timeout).await;
        match &result {
            Err(err) if err.is_session_fault() => {
                warn!(operation = request.operation(), error = %err, "session faulted");
            }
            _ => self.state = SessionState::LoggedIn(framed),
        }
        result
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state.kind(),
        }
    }
}

impl<C: Connector> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("addr", &self.config.addr())
            .field("state", &self.state.kind())
            .finish_non_exhaustive()
    }
}

async fn round_trip<Io>(
    framed: &mut Framed<Io, FrameCodec>,
    request: &Request,
    timeout: Duration,
) -> Result<Response, Error>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    let operation = request.operation();
    let frame = request.encode()?;
    let timed_out = |_| Error::Timeout { operation, timeout };

    tokio::time::timeout(timeout, framed.send(frame))
        .await
        .map_err(timed_out)??;

    let reply = tokio::time::timeout(timeout, framed.next())
        .await
        .map_err(timed_out)?
        .ok_or(Error::ConnectionClosed)??;

    if reply.direction == Direction::Request {
        return Err(ProtocolError::UnexpectedResponse {
            expected: "response frame".into(),
            got: "request frame".into(),
        }
        .into());
    }

    request.decode_response(&reply)
}

fn unexpected(request: &Request, response: &Response) -> Error {
    ProtocolError::UnexpectedResponse {
        expected: request.operation().to_owned(),
        got: format!("{response:?}"),
    }
    .into()
}
