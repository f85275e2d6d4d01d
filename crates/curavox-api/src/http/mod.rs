//! HTTP/WebSocket surface.

pub mod handlers;
pub mod router;
