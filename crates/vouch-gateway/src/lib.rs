pub mod connection;
pub mod rooms;

pub use rooms::{Membership, RoomMessage, Rooms};
