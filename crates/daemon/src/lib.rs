#![forbid(unsafe_code)]

//! Feed rankings daemon: polls the evaluation service, ranks users and
//! posts, and serves the latest complete snapshot over HTTP.

pub mod config;
pub mod engine;
pub mod http;
pub mod pool;
pub mod scheduler;
pub mod store;
pub mod upstream;
