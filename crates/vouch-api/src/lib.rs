pub mod auth;
pub mod challenges;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod messages;
pub mod notifications;
pub mod routes;
pub mod service;
pub mod state;
pub mod uploads;

pub use error::ApiError;
pub use service::ChallengeService;
pub use state::{AppState, AppStateInner};
