pub mod accounts;
pub mod bot;
pub mod client;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod guard;
pub mod logging;
pub mod models;
pub mod utils;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use bot::*;
pub use client::*;
pub use config::*;
pub use error::*;
pub use guard::*;
pub use workflow::*;
