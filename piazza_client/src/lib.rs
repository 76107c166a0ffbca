//! Piazza API client
//!
//! A small wrapper over Piazza's internal JSON-RPC endpoint (`/logic/api`),
//! independent from the rest of the bot.

mod client;
mod error;
mod models;

pub use client::{PiazzaClient, PiazzaClientConfig};
pub use error::{Error, Result};
pub use models::{FeedItem, Network, Post, PostChild, PostRevision};
