/// yeti-session - Yettel TV session and device lifecycle
///
/// Keeps an authenticated Kaltura OTT session for a single install:
/// OAuth login, anonymous bootstrap, escalation, refresh and household
/// device registration, with all state persisted between runs.

pub mod config;
pub mod logging;
pub mod session;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
