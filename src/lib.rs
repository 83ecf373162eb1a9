//! Private photo gallery: an authoritative JSON-backed photo collection
//! served over HTTP, and a polling client that keeps a local view of it.

pub mod client;
pub mod config;
pub mod error;
pub mod photo;
pub mod server;
pub mod storage;
pub mod store;
pub mod sync;
pub mod upload;
