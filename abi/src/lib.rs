mod clock;
mod config;
mod error;
mod types;

pub use clock::*;
pub use config::*;
pub use error::{Error, NotificationError};
pub use types::*;

pub type ProviderId = String;
pub type RequesterId = String;
pub type BookingId = uuid::Uuid;
