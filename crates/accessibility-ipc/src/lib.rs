//! Accessibility IPC layer.
//!
//! Responsibilities:
//! - `model` / `codec`: the element record and its companions, their wire
//!   layout, and the raw-buffer batch form used for large result sets
//! - `correlation`: matching callback answers to the calls waiting on them
//! - `dispatch` / `permission`: the generic proxy and stub halves, with the
//!   interface token and access checks every inbound request goes through
//! - `interfaces`: trait, proxy and stub for each interface in the family
//! - `manager`, `session`, `snapshot`: an in-process manager, the
//!   ability-side query session, and an in-memory element operator

pub mod codec;
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod interfaces;
pub mod manager;
pub mod model;
pub mod permission;
pub mod session;
pub mod snapshot;

pub use config::{ConfigError, IpcConfig};
pub use correlation::{CorrelationError, CorrelationTable, PendingCall, RequestIdGenerator};
pub use error::{RetError, RetResult};
pub use manager::AccessibilityManager;
pub use session::{AbilitySession, CallbackResult};
pub use snapshot::SnapshotOperator;
