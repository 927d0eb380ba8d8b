pub mod error;
pub mod types;
pub mod config;
pub mod session;
pub mod dialogue;
pub mod collab;
pub mod provider;
pub mod channel;
pub mod service;
pub mod worker;
pub mod util;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
