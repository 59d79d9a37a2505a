//! Rate Mirror Library
//!
//! Fetches the lending and borrowing datasets from a remote file store
//! through a bounded TTL cache that revalidates with ETags and serves stale
//! data when the origin is unavailable.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod fetcher;
pub mod origin;
