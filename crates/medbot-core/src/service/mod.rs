pub mod sweeper;

#[cfg(feature = "http-api")]
pub mod http;
