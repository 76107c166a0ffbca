use chrono::{DateTime, Local, NaiveDateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub id: String,
    pub title: String,
    /// Plain text
    pub body: String,
    pub url: String,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub id: String,
    pub name: String,
    /// Plain text
    pub description: String,
    pub url: String,
    pub created_at: Option<NaiveDateTime>,
    pub due_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleEntryKind {
    Module,
    Item,
}

/// A module or a module item; both are reported as "modules"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    /// Unique across modules and items of a course
    pub id: String,
    pub kind: ModuleEntryKind,
    pub name: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumAnswer {
    /// "Instructor Answer", "Student Answer", "Follow-up Post" or "Answers"
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumPost {
    pub number: u64,
    /// Plain text
    pub subject: String,
    /// Plain text
    pub body: String,
    pub url: String,
    pub created_at: NaiveDateTime,
    pub is_note: bool,
    pub tags: Vec<String>,
    pub is_private: bool,
    pub is_pinned: bool,
    pub is_instructor_note: bool,
    pub is_student_post: bool,
    pub answer: ForumAnswer,
    pub answer_count: usize,
}

/// Platform timestamps are UTC; the tracker works in local time
pub fn to_local(t: DateTime<Utc>) -> NaiveDateTime {
    t.with_timezone(&Local).naive_local()
}
