//! HTTP surface for the rate limit endpoint.

mod server;

pub use server::{router, AppState, HttpServer};
