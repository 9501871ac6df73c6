//! fireteam-relay - Harvests team-up posts and relays new ones downstream
//!
//! This crate polls a listing service through a pool of short-lived forward
//! proxies, deduplicates the posts against a time-bounded delivery history
//! and forwards each new post to a sink service.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod relay;
pub mod stats;
