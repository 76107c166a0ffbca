//! Piazza RPC payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope every `/logic/api` call answers with
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct RpcResponse<T> {
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedResult {
    #[serde(default)]
    pub feed: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserStatus {
    #[serde(default)]
    pub networks: Vec<Network>,
}

/// A class ("network") the logged-in account belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub course_number: Option<String>,
}

/// Summary row of the class feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    /// Content id, the key for `content.get`
    pub id: String,
    pub nr: u64,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub bucket_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRevision {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
}

/// Answer or follow-up attached to a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostChild {
    #[serde(rename = "type")]
    pub kind: String,
    /// Follow-ups carry their text here instead of in `history`
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub history: Vec<PostRevision>,
}

impl PostChild {
    pub fn is_followup(&self) -> bool {
        self.kind == "followup"
    }

    pub fn is_instructor_answer(&self) -> bool {
        self.kind == "i_answer"
    }

    /// Latest text of the child, HTML included
    pub fn text(&self) -> &str {
        if self.is_followup() {
            self.subject.as_deref().unwrap_or_default()
        } else {
            self.history
                .first()
                .map(|h| h.content.as_str())
                .unwrap_or_default()
        }
    }
}

/// Full post as returned by `content.get`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: String,
    pub nr: u64,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub status: String,
    /// `note` or `question`
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub bucket_name: Option<String>,
    /// Newest revision first
    #[serde(default)]
    pub history: Vec<PostRevision>,
    #[serde(default)]
    pub children: Vec<PostChild>,
}

impl Post {
    pub fn is_private(&self) -> bool {
        self.status == "private"
    }

    pub fn is_pinned(&self) -> bool {
        self.bucket_name.as_deref() == Some("Pinned")
    }

    pub fn is_instructor_note(&self) -> bool {
        self.tags.iter().any(|t| t == "instructor-note")
    }

    pub fn is_student_post(&self) -> bool {
        self.tags.iter().any(|t| t == "student")
    }

    pub fn is_note(&self) -> bool {
        self.kind == "note"
    }

    pub fn subject(&self) -> &str {
        self.history
            .first()
            .map(|h| h.subject.as_str())
            .unwrap_or_default()
    }

    pub fn body(&self) -> &str {
        self.history
            .first()
            .map(|h| h.content.as_str())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_post() {
        let json = r#"{
            "id": "kf9abc",
            "nr": 123,
            "created": "2020-09-19T22:41:52Z",
            "status": "active",
            "type": "question",
            "tags": ["hw1", "student"],
            "bucket_name": "Today",
            "history": [
                {"subject": "Is <b>PA1</b> due Friday?", "content": "<p>Asking for a friend</p>", "uid": "x"}
            ],
            "children": [
                {"type": "i_answer", "history": [{"subject": "", "content": "<p>Yes</p>"}]},
                {"type": "followup", "subject": "thanks!", "children": []}
            ]
        }"#;

        let post: Post = serde_json::from_str(json).unwrap();
        assert_eq!(post.nr, 123);
        assert!(!post.is_private());
        assert!(!post.is_pinned());
        assert!(post.is_student_post());
        assert!(!post.is_note());
        assert_eq!(post.subject(), "Is <b>PA1</b> due Friday?");
        assert!(post.children[0].is_instructor_answer());
        assert_eq!(post.children[0].text(), "<p>Yes</p>");
        assert_eq!(post.children[1].text(), "thanks!");
    }

    #[test]
    fn test_deserialize_rpc_error_envelope() {
        let json = r#"{"result": null, "error": "Foo fast! Slow down", "aid": "abc"}"#;
        let response: RpcResponse<FeedResult> = serde_json::from_str(json).unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.as_deref(), Some("Foo fast! Slow down"));
    }

    #[test]
    fn test_deserialize_feed() {
        let json = r#"{"result": {"feed": [
            {"id": "a1", "nr": 2, "subject": "Welcome", "status": "active", "tags": ["instructor-note"], "bucket_name": "Pinned"},
            {"id": "a2", "nr": 3, "subject": "Lab?"}
        ]}, "error": null}"#;
        let response: RpcResponse<FeedResult> = serde_json::from_str(json).unwrap();
        let feed = response.result.unwrap().feed;
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].bucket_name.as_deref(), Some("Pinned"));
        assert!(feed[1].tags.is_empty());
    }
}
