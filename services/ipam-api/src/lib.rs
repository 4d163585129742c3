//! IPAM API library.
//!
//! The crate ships an `ipam-api` binary; the library surface exists for
//! integration testing and embedding.

pub mod api;
pub mod config;
pub mod db;
pub mod state;
