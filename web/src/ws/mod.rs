//! Websocket transport for live viewers.
//!
//! The fan-out itself (registry and broadcast loop) lives in the `fanout` crate;
//! this module only adapts an axum websocket to a `ViewerConnection`.

pub mod handler;
