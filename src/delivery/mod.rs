pub mod client;
pub mod error;

pub use client::{Deliver, DeliveryClient};
pub use error::DeliveryError;
