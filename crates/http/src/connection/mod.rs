//! Connection lifecycle: the per-connection session loop and the keep-alive registry shared by
//! all connections.

mod handle;
mod http_connection;
mod keep_alive;
mod session;

pub use handle::ConnectionHandle;
pub use http_connection::HttpConnection;
pub use keep_alive::KeepAliveError;
pub use keep_alive::KeepAliveRegistry;
pub use session::HttpSession;
pub use session::SessionOutcome;
