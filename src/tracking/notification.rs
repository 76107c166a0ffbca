use chrono::NaiveDateTime;

use crate::db::types::{CourseEntity, ForumEntity, ReminderWindow};
use crate::platform::{Announcement, Assignment, ForumPost, ModuleEntry, ModuleEntryKind};
use crate::utils::html;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Announcement,
    Assignment,
    /// Assignment due within the given window
    Reminder(ReminderWindow),
    Module,
    ForumDigest,
}

/// Where a notification comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub url: String,
}

/// One item to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub category: Category,
    pub source: Source,
    pub title: String,
    pub url: Option<String>,
    /// Plain text, a few lines at most (digests carry the whole listing)
    pub excerpt: String,
    pub created_at: Option<NaiveDateTime>,
    pub due_at: Option<NaiveDateTime>,
    /// Stable id of the underlying item
    pub item_id: String,
}

impl From<&CourseEntity> for Source {
    fn from(course: &CourseEntity) -> Self {
        Source {
            name: course.name.clone(),
            url: course.url.clone(),
        }
    }
}

impl From<&ForumEntity> for Source {
    fn from(forum: &ForumEntity) -> Self {
        Source {
            name: forum.name.clone(),
            url: forum.url.clone(),
        }
    }
}

impl Notification {
    pub fn announcement(course: &CourseEntity, item: &Announcement) -> Self {
        Self {
            category: Category::Announcement,
            source: course.into(),
            title: item.title.clone(),
            url: Some(item.url.clone()),
            excerpt: html::first_lines(&item.body),
            created_at: item.created_at,
            due_at: None,
            item_id: item.id.clone(),
        }
    }

    pub fn assignment(course: &CourseEntity, item: &Assignment) -> Self {
        Self {
            category: Category::Assignment,
            source: course.into(),
            title: item.name.clone(),
            url: Some(item.url.clone()),
            excerpt: html::first_lines(&item.description),
            created_at: item.created_at,
            due_at: item.due_at,
            item_id: item.id.clone(),
        }
    }

    pub fn reminder(course: &CourseEntity, item: &Assignment, window: ReminderWindow) -> Self {
        Self {
            category: Category::Reminder(window),
            ..Self::assignment(course, item)
        }
    }

    pub fn module(course: &CourseEntity, entry: &ModuleEntry) -> Self {
        let kind = match entry.kind {
            ModuleEntryKind::Module => "Module",
            ModuleEntryKind::Item => "Module item",
        };
        Self {
            category: Category::Module,
            source: course.into(),
            title: entry.name.clone(),
            url: entry.url.clone(),
            excerpt: format!("New {} in {}", kind.to_lowercase(), course.name),
            created_at: None,
            due_at: None,
            item_id: entry.id.clone(),
        }
    }

    /// Daily digest: instructor notes first, then student posts
    pub fn forum_digest(
        forum: &ForumEntity,
        instructor: &[ForumPost],
        students: &[ForumPost],
        more_students: bool,
        day: NaiveDateTime,
    ) -> Self {
        let mut lines = Vec::new();
        lines.push("Instructor notes:".to_string());
        if instructor.is_empty() {
            lines.push("  none today".to_string());
        }
        lines.extend(instructor.iter().map(digest_line));

        lines.push("Student posts:".to_string());
        if students.is_empty() {
            lines.push("  none today".to_string());
        }
        lines.extend(students.iter().map(digest_line));
        if more_students {
            lines.push(format!("  …and more at {}", forum.url));
        }

        Self {
            category: Category::ForumDigest,
            source: forum.into(),
            title: format!("Daily digest for {}", forum.name),
            url: Some(forum.url.clone()),
            excerpt: lines.join("\n"),
            created_at: Some(day),
            due_at: None,
            item_id: format!("digest-{}", day.format("%Y-%m-%d")),
        }
    }
}

fn digest_line(post: &ForumPost) -> String {
    format!(
        "  @{} {} <{}>",
        post.number,
        html::truncate(&post.subject, 80),
        post.url
    )
}
