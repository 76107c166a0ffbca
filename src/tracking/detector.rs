//! Decides which fetched items are new
//!
//! Pure functions: callers fetch, call in here, then persist the returned
//! cursor / identifier set / snapshot.

use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;

use super::FeedOrder;
use crate::platform::{Announcement, Assignment, ModuleEntry};
use crate::utils::window::Window;

#[derive(Debug)]
pub struct AnnouncementScan<'a> {
    pub fresh: Vec<&'a Announcement>,
    /// Creation time of the newest emitted item
    pub newest: Option<NaiveDateTime>,
}

impl AnnouncementScan<'_> {
    /// Cursor after this scan: never moves backwards
    pub fn advanced_cursor(&self, cursor: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
        match (cursor, self.newest) {
            (Some(old), Some(new)) => Some(old.max(new)),
            (old, new) => old.or(new),
        }
    }
}

/// Announcements younger than `window` and newer than `cursor`
///
/// An item whose age reaches the window is not emitted; with
/// [`FeedOrder::Descending`] the scan stops there. Undated items only show
/// up in unbounded, cursor-less listings.
pub fn detect_announcements<'a>(
    items: &'a [Announcement],
    window: Window,
    cursor: Option<NaiveDateTime>,
    now: NaiveDateTime,
    order: FeedOrder,
) -> AnnouncementScan<'a> {
    let mut fresh = Vec::new();
    let mut newest: Option<NaiveDateTime> = None;

    for item in items {
        let Some(created) = item.created_at else {
            if window.is_all() && cursor.is_none() {
                fresh.push(item);
            }
            continue;
        };

        if !window.admits(now - created) {
            if order == FeedOrder::Descending && !window.is_all() {
                break;
            }
            continue;
        }

        if cursor.is_some_and(|c| created <= c) {
            continue;
        }

        newest = Some(newest.map_or(created, |n| n.max(created)));
        fresh.push(item);
    }

    AnnouncementScan { fresh, newest }
}

#[derive(Debug)]
pub struct DueScan<'a> {
    /// Due soon and not reported before
    pub fresh: Vec<&'a Assignment>,
    /// Replacement identifier set: everything currently due soon
    pub retained: Vec<String>,
}

/// Assignments due within `window` from `now`, split by the `seen` set
pub fn detect_due<'a>(
    items: &'a [Assignment],
    window: Window,
    seen: &[String],
    now: NaiveDateTime,
) -> DueScan<'a> {
    let mut fresh = Vec::new();
    let mut retained: Vec<String> = Vec::new();

    for item in items {
        let Some(due) = item.due_at else {
            continue;
        };
        let remaining = due - now;
        if remaining < Duration::zero() {
            continue;
        }
        if let Window::Within(limit) = window {
            if remaining > limit {
                continue;
            }
        }
        if retained.contains(&item.id) {
            continue;
        }

        retained.push(item.id.clone());
        if !seen.contains(&item.id) {
            fresh.push(item);
        }
    }

    DueScan { fresh, retained }
}

#[derive(Debug)]
pub struct ModuleDiff<'a> {
    pub fresh: Vec<&'a ModuleEntry>,
    /// Replacement snapshot: every current id, in course order
    pub snapshot: Vec<String>,
}

/// Entries absent from the previous snapshot; a missing snapshot is a silent baseline
pub fn diff_modules<'a>(current: &'a [ModuleEntry], previous: Option<&[String]>) -> ModuleDiff<'a> {
    let mut snapshot: Vec<String> = Vec::with_capacity(current.len());
    let mut seen_now = HashSet::new();
    for entry in current {
        if seen_now.insert(entry.id.as_str()) {
            snapshot.push(entry.id.clone());
        }
    }

    let fresh = match previous {
        None => Vec::new(),
        Some(previous) => {
            let previous: HashSet<&str> = previous.iter().map(String::as_str).collect();
            let mut emitted = HashSet::new();
            current
                .iter()
                .filter(|e| !previous.contains(e.id.as_str()) && emitted.insert(e.id.as_str()))
                .collect()
        }
    };

    ModuleDiff { fresh, snapshot }
}
