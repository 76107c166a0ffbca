use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ChannelId, CourseId};

/// A tracked course as shown to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseEntity {
    pub id: CourseId,
    pub name: String,
    pub url: String,
}

/// A Piazza class ("network")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumEntity {
    pub name: String,
    pub network_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumTracking {
    pub entity: ForumEntity,
    #[serde(default)]
    pub channels: Vec<ChannelId>,
}

/// Which due-soon identifier set a reminder poll maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderWindow {
    Week,
    Day,
}

impl ReminderWindow {
    pub const ALL: [ReminderWindow; 2] = [ReminderWindow::Week, ReminderWindow::Day];

    /// Window expression understood by the window parser
    pub fn spec(&self) -> &'static str {
        match self {
            ReminderWindow::Week => "1-week",
            ReminderWindow::Day => "1-day",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReminderWindow::Week => "within a week",
            ReminderWindow::Day => "within a day",
        }
    }
}

/// Persisted tracking state of one community, stored under `community/<id>`
///
/// `last_seen`, `due_week` and `due_day` hold exactly one entry per tracked
/// entity; they are only changed through the methods below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityRecord {
    #[serde(default)]
    pub entities: Vec<CourseEntity>,
    #[serde(default)]
    pub channels: Vec<ChannelId>,
    #[serde(default)]
    pub last_seen: BTreeMap<CourseId, String>,
    #[serde(default)]
    pub due_week: BTreeMap<CourseId, Vec<String>>,
    #[serde(default)]
    pub due_day: BTreeMap<CourseId, Vec<String>>,
    #[serde(default)]
    pub forum: Option<ForumTracking>,
}

impl CommunityRecord {
    pub fn tracks(&self, id: CourseId) -> bool {
        self.entities.iter().any(|e| e.id == id)
    }

    pub fn entity(&self, id: CourseId) -> Option<&CourseEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn entity_ids(&self) -> Vec<CourseId> {
        self.entities.iter().map(|e| e.id).collect()
    }

    /// Add an entity together with its cursors; no-op when already tracked
    pub fn insert_entity(&mut self, entity: CourseEntity, last_seen: String) -> bool {
        if self.tracks(entity.id) {
            return false;
        }
        self.last_seen.insert(entity.id, last_seen);
        self.due_week.insert(entity.id, Vec::new());
        self.due_day.insert(entity.id, Vec::new());
        self.entities.push(entity);
        true
    }

    /// Remove an entity together with its cursors
    pub fn remove_entity(&mut self, id: CourseId) -> bool {
        let before = self.entities.len();
        self.entities.retain(|e| e.id != id);
        self.last_seen.remove(&id);
        self.due_week.remove(&id);
        self.due_day.remove(&id);
        self.entities.len() != before
    }

    pub fn add_channel(&mut self, channel: ChannelId) -> bool {
        add_unique(&mut self.channels, channel)
    }

    pub fn remove_channel(&mut self, channel: ChannelId) -> bool {
        remove_item(&mut self.channels, channel)
    }

    pub fn due_set(&self, window: ReminderWindow, id: CourseId) -> &[String] {
        let map = match window {
            ReminderWindow::Week => &self.due_week,
            ReminderWindow::Day => &self.due_day,
        };
        map.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn due_set_mut(&mut self, window: ReminderWindow) -> &mut BTreeMap<CourseId, Vec<String>> {
        match window {
            ReminderWindow::Week => &mut self.due_week,
            ReminderWindow::Day => &mut self.due_day,
        }
    }

    pub fn forum_channels(&self) -> &[ChannelId] {
        self.forum
            .as_ref()
            .map(|f| f.channels.as_slice())
            .unwrap_or_default()
    }
}

/// Push `item` unless present, keeping order
pub fn add_unique<T: PartialEq>(list: &mut Vec<T>, item: T) -> bool {
    if list.contains(&item) {
        return false;
    }
    list.push(item);
    true
}

pub fn remove_item<T: PartialEq>(list: &mut Vec<T>, item: T) -> bool {
    let before = list.len();
    list.retain(|x| *x != item);
    list.len() != before
}
