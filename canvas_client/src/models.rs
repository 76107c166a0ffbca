//! Canvas API response models
//!
//! Only the fields the bot reads are modelled; everything else is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub course_code: Option<String>,
}

/// Announcement (a discussion topic flagged as announcement)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    /// HTML body
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub context_code: Option<String>,
}

impl Announcement {
    /// Time the announcement became visible, falling back to creation time
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.posted_at.or(self.created_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    /// HTML description
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default = "default_published")]
    pub published: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    /// Absent when the token cannot see unpublished content
    #[serde(default)]
    pub published: Option<bool>,
    /// Inlined by `include[]=items`; omitted by Canvas for large modules
    #[serde(default)]
    pub items: Option<Vec<ModuleItem>>,
    #[serde(default)]
    pub items_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleItem {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub published: Option<bool>,
}

fn default_published() -> bool {
    true
}
