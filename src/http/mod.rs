//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID)
//!     → security (admission control)
//!     → forward.rs (send to upstream, stream response back)
//! ```

pub mod forward;
pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{GatewayServer, ServerError};
