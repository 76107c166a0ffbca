//! Canvas LMS REST API client
//!
//! A small wrapper over the Canvas v1 API with only the endpoints the bot
//! polls: course metadata, announcements, assignments and modules.

mod client;
mod error;
mod models;

pub use client::{CanvasClient, CanvasClientConfig};
pub use error::{Error, Result};
pub use models::{Announcement, Assignment, Course, Module, ModuleItem};
