//! Channel lifecycle management
//!
//! - **State**: connection states and the status snapshot handed to listeners
//! - **Manager**: the connect/reconnect/disconnect state machine. It never
//!   touches the network itself; it returns [`ConnectionCommand`]s that the
//!   session runtime carries out, which keeps every transition testable
//!   without a socket or a clock.

pub mod manager;
pub mod state;

pub use manager::{ConnectionCommand, ConnectionListener, ConnectionManager};
pub use state::{ConnectionState, ConnectionStatus};
