pub mod api;
pub mod auth;
pub mod daemon;
pub mod error;
pub mod pidfile;

pub use api::AppState;
pub use auth::AuthService;
pub use daemon::Daemon;
pub use error::ApiError;
