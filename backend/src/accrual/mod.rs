pub mod client;
pub mod errors;
pub mod types;

pub use client::{AccrualClient, Scorer};
pub use errors::AccrualError;
pub use types::*;
