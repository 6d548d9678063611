// Repo Session - authentication and session lifecycle engine
// for a digital-repository client

pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod models;
pub mod navigation;
pub mod session;
pub mod state;
pub mod store;

pub use config::SessionConfig;
pub use error::{AuthError, Result};
pub use models::{AuthMethod, AuthMethodKind, AuthStatus, Token};
pub use session::SessionManager;
pub use state::{reduce, SessionEvent, SessionState, SessionStatus};
