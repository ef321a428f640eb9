//! Client side of Vouch: a state container that merges optimistic edits with
//! server responses and room broadcasts, plus thin HTTP and socket transports.

pub mod client;
pub mod error;
pub mod session;
pub mod socket;
pub mod state;

pub use client::{ApiClient, ChallengeApi};
pub use error::ClientError;
pub use session::Session;
pub use socket::RoomSocket;
pub use state::{Action, SyncState};
