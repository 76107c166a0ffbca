use async_trait::async_trait;
use piazza_client::{PiazzaClient, Post, PostChild};

use super::models::{to_local, ForumAnswer, ForumPost};
use super::ForumPlatform;
use crate::db::types::ForumEntity;
use crate::error::{Result, TrackerError};
use crate::utils::html;

/// Longest post or answer body kept
const MAX_BODY_CHARS: usize = 1000;
const EMPTY_BODY: &str = "An image or video was posted in response.";

/// `ForumPlatform` over Piazza
pub struct PiazzaPlatform {
    client: PiazzaClient,
}

impl PiazzaPlatform {
    pub fn new(client: PiazzaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ForumPlatform for PiazzaPlatform {
    async fn forum(&self, network_id: &str) -> Result<ForumEntity> {
        let network = self
            .client
            .network(network_id)
            .await
            .map_err(|e| map_error(network_id, e))?;

        Ok(ForumEntity {
            name: network.name,
            url: PiazzaClient::network_url(network_id),
            network_id: network.id,
        })
    }

    async fn recent_posts(&self, network_id: &str, limit: u32) -> Result<Vec<ForumPost>> {
        let posts = self
            .client
            .recent_posts(network_id, limit)
            .await
            .map_err(|e| map_error(network_id, e))?;

        Ok(posts
            .iter()
            .map(|p| convert_post(network_id, p))
            .collect())
    }

    async fn pinned_posts(&self, network_id: &str, limit: u32) -> Result<Vec<ForumPost>> {
        Ok(self
            .recent_posts(network_id, limit)
            .await?
            .into_iter()
            .filter(|p| p.is_pinned && !p.is_private)
            .collect())
    }

    async fn post(&self, network_id: &str, number: u64) -> Result<ForumPost> {
        let post = self
            .client
            .post(network_id, &number.to_string())
            .await
            .map_err(|e| match e {
                piazza_client::Error::NotFound(_) => {
                    TrackerError::EntityNotFound(format!("post @{}", number))
                }
                other => map_error(network_id, other),
            })?;

        if post.is_private() {
            return Err(TrackerError::EntityNotFound(format!(
                "post @{} (private)",
                number
            )));
        }
        Ok(convert_post(network_id, &post))
    }
}

fn map_error(network_id: &str, e: piazza_client::Error) -> TrackerError {
    match e {
        piazza_client::Error::NotFound(_) => {
            TrackerError::EntityNotFound(format!("forum {}", network_id))
        }
        other => TrackerError::TransientFetch(format!("forum {}: {}", network_id, other)),
    }
}

fn clean(text: &str) -> String {
    let text = html::truncate(&html::strip_html(text), MAX_BODY_CHARS);
    if text.is_empty() {
        EMPTY_BODY.to_string()
    } else {
        text
    }
}

fn answer_heading(child: &PostChild) -> &'static str {
    if child.is_instructor_answer() {
        "Instructor Answer"
    } else {
        "Student Answer"
    }
}

/// Pick the answer shown under a post: the first real answer, else the follow-up
fn summarize_answer(children: &[PostChild]) -> ForumAnswer {
    let answer = match children {
        [] => None,
        [first, rest @ ..] if first.is_followup() => match rest.first() {
            Some(second) if !second.is_followup() => Some((answer_heading(second), second)),
            _ => Some(("Follow-up Post", first)),
        },
        [first, ..] => Some((answer_heading(first), first)),
    };

    match answer {
        Some((heading, child)) => ForumAnswer {
            heading: heading.to_string(),
            body: clean(child.text()),
        },
        None => ForumAnswer {
            heading: "Answers".to_string(),
            body: "No answers yet :(".to_string(),
        },
    }
}

fn convert_post(network_id: &str, post: &Post) -> ForumPost {
    ForumPost {
        number: post.nr,
        subject: clean(post.subject()),
        body: clean(post.body()),
        url: PiazzaClient::post_url(network_id, post.nr),
        created_at: to_local(post.created),
        is_note: post.is_note(),
        tags: post.tags.clone(),
        is_private: post.is_private(),
        is_pinned: post.is_pinned(),
        is_instructor_note: post.is_instructor_note(),
        is_student_post: post.is_student_post(),
        answer: summarize_answer(&post.children),
        answer_count: post.children.len(),
    }
}
