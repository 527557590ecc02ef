//! Broadcast session management
//!
//! This module provides the `BroadcastSession` abstraction that manages:
//! - Validation and exclusive claim of the venue
//! - The segment directory and transcoder lifetime
//! - In-order relay of audio frames into the transcoder
//! - Listener notification when the broadcast goes live
//! - Exactly-once teardown on disconnect, transcoder exit or shutdown

mod manager;
mod registry;
mod session;
mod state;
mod stats;

pub use manager::SessionManager;
pub use registry::{SessionClaim, SessionRegistry, SessionShared};
pub use session::{BroadcastSession, CloseReason};
pub use state::SessionState;
pub use stats::SessionStats;
