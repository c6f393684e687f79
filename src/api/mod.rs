//! HTTP surface for the MiniApp upload front end.

pub mod handlers;
pub mod response;
mod routes;

pub use routes::create_router;
