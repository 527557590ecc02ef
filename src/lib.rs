pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod notify;
pub mod segments;
pub mod session;
pub mod transcoder;
pub mod venue;

pub use config::Config;
pub use directory::{ListenerDirectory, Role};
pub use error::RelayError;
pub use http::{create_router, AppState};
pub use notify::{
    FanoutReport, FcmClient, LogOnlyPushSender, NotificationFanout, NotificationMessage,
    PushSender,
};
pub use segments::SegmentStore;
pub use session::{BroadcastSession, CloseReason, SessionManager, SessionState, SessionStats};
pub use transcoder::{ExitReport, FfmpegTranscoder, ProcessHandle, Transcoder};
pub use venue::VenueId;
