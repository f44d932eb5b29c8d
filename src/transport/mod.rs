//! Register Transport Module
//!
//! Maps the register's operations onto HTTP, in both directions.
//!
//! ## Endpoints
//! - `GET /get`: current value as decimal text.
//! - `GET /set/{newVal}`: local write; `400` with the parse error for non-integers.
//! - `POST /notify/{curVal}/{curGeneration}?notifier={id}`: remote merge; always `200`
//!   once both segments parse, whether or not the push was newer.
//!
//! `HttpPusher` is the outbound side used by the gossip rounds.

pub mod client;
pub mod handlers;
pub mod protocol;

pub use client::HttpPusher;
pub use handlers::router;
