#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared model and pure ranking logic for the feed rankings daemon.
//!
//! Nothing in this crate performs I/O: upstream payloads come in as
//! `serde_json::Value`, rankings go out as plain structs.

pub mod model;
pub mod normalize;
pub mod ranking;

pub use model::now_ms;
