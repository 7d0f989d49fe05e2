mod availability;
mod booking;
mod provider;
mod request;

pub use availability::*;
pub use booking::*;
pub use provider::*;
pub use request::*;
