//! HTTP surface for the photo report generator.
//!
//! `app_router()` returns a composable `Router` that can be mounted on any
//! axum server; `serve()` binds it to the configured address.

pub mod error;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::{app_router, AppState};
pub use server::{serve, serve_on};
