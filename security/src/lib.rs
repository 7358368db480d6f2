//! Account-security enforcement engine for the Aula platform.
//!
//! The login flow and administrative tooling talk to one entry point,
//! [`enforcement::SecurityEnforcer`], which orchestrates four components:
//! a cached typed settings store, an append-only security event log, the
//! block ledger (authoritative block/unblock state with lazy expiry), and
//! the anomaly detector that escalates failed-login bursts into automatic
//! blocks. Authentication itself — password checks, session issuance —
//! lives elsewhere; this crate only decides whether an account is blocked,
//! why, and for how long.

pub mod blocks;
pub mod detector;
pub mod enforcement;
pub mod error;
pub mod events;
pub mod seed;
pub mod settings;

pub use enforcement::SecurityEnforcer;
pub use error::SecurityError;
