//! Async client for the login-gated request/response protocol spoken by
//! Heliotherm-family heat pumps over TCP (or a serial-over-TCP bridge).
//!
//! - **[`frame`]**: `FrameCodec`, the `tokio_util` codec for the binary
//!   frame envelope (header, length, ASCII payload, checksum).
//! - **[`command`]**: pure encode/decode of the ASCII command payloads:
//!   login, logout, bulk read, single read, single write, device clock.
//! - **[`Session`]**: the `Closed → Connecting → LoggedIn → Faulted`
//!   state machine, one round trip at a time, every I/O step bounded by
//!   the configured timeout.
//! - **[`transport`]**: the [`Connector`] seam and the production
//!   [`TcpConnector`].
//! - **`sim`** (feature `sim`): a simulated device served on loopback
//!   for integration tests.

pub mod command;
pub mod error;
pub mod frame;
pub mod session;
#[cfg(feature = "sim")]
pub mod sim;
pub mod transport;

pub use command::{Bank, DeviceClock, Register, Request, Response};
pub use error::{Error, ProtocolError};
pub use frame::{Frame, FrameCodec};
pub use session::{Session, SessionStateKind};
pub use transport::{Connector, TcpConnector, TransportConfig};
