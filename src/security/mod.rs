//! Request admission control.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_ip.rs (X-Forwarded-For / X-Real-IP / peer address)
//!     → classifier.rs (path + method → category, quota)
//!     → window.rs (sliding-window log per client and category)
//!     → admit: pass to the next handler
//!     → reject: rejection.rs (429 + JSON body)
//!
//! Independently:
//!     janitor.rs (periodic eviction of idle keys from window.rs)
//! ```
//!
//! # Design Decisions
//! - Best effort: state is in memory only and resets on restart
//! - Unclassified paths bypass the limiter entirely
//! - Admission never fails; it only admits or rejects

pub mod classifier;
pub mod client_ip;
pub mod janitor;
pub mod rate_limit;
pub mod rejection;
pub mod window;

pub use janitor::{Janitor, JanitorHandle};
pub use rate_limit::{admission_middleware, AdmissionControl};
pub use window::{Decision, RequestKey, WindowStore};
