//! WebSocket front end: wire protocol, per-connection sessions, the
//! connection limiter, and the axum server that ties them together.

pub mod connections;
pub mod protocol;
pub mod server;
pub mod session;

pub use connections::{ConnectionGuard, ConnectionLimiter};
pub use protocol::{ClientMessage, ProtocolError, RenderRequest, ServerMessage};
pub use server::{app_router, run_server, ServerState};
pub use session::{InboundFrame, OutboundFrame, Session, SessionConfig, SessionContext};
