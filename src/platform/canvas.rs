use async_trait::async_trait;
use canvas_client::CanvasClient;
use chrono::{Days, Duration, Local, NaiveDate, NaiveDateTime};

use super::models::{to_local, Announcement, Assignment, ModuleEntry, ModuleEntryKind};
use super::CoursePlatform;
use crate::db::types::{CourseEntity, CourseId};
use crate::error::{Result, TrackerError};
use crate::utils::html;

/// `CoursePlatform` over the Canvas REST API
pub struct CanvasPlatform {
    client: CanvasClient,
    include_unpublished: bool,
}

impl CanvasPlatform {
    pub fn new(client: CanvasClient, include_unpublished: bool) -> Self {
        Self {
            client,
            include_unpublished,
        }
    }
}

#[async_trait]
impl CoursePlatform for CanvasPlatform {
    async fn course(&self, id: CourseId) -> Result<CourseEntity> {
        let course = self
            .client
            .course(id.0)
            .await
            .map_err(|e| map_error(id, e))?;

        Ok(CourseEntity {
            id,
            name: course.name,
            url: self.client.course_url(id.0),
        })
    }

    async fn announcements(
        &self,
        id: CourseId,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<Announcement>> {
        // Dates are UTC on the Canvas side, widen by a day each way
        let today = Local::now().date_naive();
        let start = query_start(since);
        let end = today + Duration::days(1);

        let announcements = self
            .client
            .announcements(id.0, start, end)
            .await
            .map_err(|e| map_error(id, e))?;

        Ok(announcements.into_iter().map(convert_announcement).collect())
    }

    async fn assignments(&self, id: CourseId) -> Result<Vec<Assignment>> {
        let assignments = self
            .client
            .assignments(id.0)
            .await
            .map_err(|e| map_error(id, e))?;

        Ok(assignments
            .into_iter()
            .filter(|a| a.published)
            .map(convert_assignment)
            .collect())
    }

    async fn modules(&self, id: CourseId) -> Result<Vec<ModuleEntry>> {
        let modules = self
            .client
            .modules(id.0)
            .await
            .map_err(|e| map_error(id, e))?;

        Ok(flatten_modules(modules, self.include_unpublished))
    }
}

/// "Everything" for the announcements endpoint, which requires a start date
const EARLIEST_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(date) => date,
    None => NaiveDate::MIN,
};

/// Start date of an announcements query, a day before `since`
fn query_start(since: Option<NaiveDateTime>) -> NaiveDate {
    since
        .and_then(|t| t.date().checked_sub_days(Days::new(1)))
        .map_or(EARLIEST_DATE, |d| d.max(EARLIEST_DATE))
}

fn map_error(id: CourseId, e: canvas_client::Error) -> TrackerError {
    match e {
        canvas_client::Error::NotFound(_) => TrackerError::EntityNotFound(format!("course {}", id)),
        other => TrackerError::TransientFetch(format!("course {}: {}", id, other)),
    }
}

fn convert_announcement(a: canvas_client::Announcement) -> Announcement {
    Announcement {
        id: a.id.to_string(),
        created_at: a.published_at().map(to_local),
        body: a.message.as_deref().map(html::strip_html).unwrap_or_default(),
        title: a.title,
        url: a.html_url,
    }
}

fn convert_assignment(a: canvas_client::Assignment) -> Assignment {
    Assignment {
        id: a.id.to_string(),
        description: a
            .description
            .as_deref()
            .map(html::strip_html)
            .unwrap_or_default(),
        created_at: a.created_at.map(to_local),
        due_at: a.due_at.map(to_local),
        name: a.name,
        url: a.html_url,
    }
}

/// Modules followed by their items; unpublished entries only when asked for
fn flatten_modules(modules: Vec<canvas_client::Module>, include_unpublished: bool) -> Vec<ModuleEntry> {
    let visible = |published: Option<bool>| include_unpublished || published != Some(false);
    let mut entries = Vec::new();

    for module in modules {
        if !visible(module.published) {
            continue;
        }
        entries.push(ModuleEntry {
            id: format!("module-{}", module.id),
            kind: ModuleEntryKind::Module,
            name: module.name,
            url: None,
        });

        for item in module.items.unwrap_or_default() {
            if !visible(item.published) {
                continue;
            }
            entries.push(ModuleEntry {
                id: format!("item-{}", item.id),
                kind: ModuleEntryKind::Item,
                name: item.title,
                url: item.html_url,
            });
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(json: &str) -> canvas_client::Module {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_flatten_modules_hides_unpublished() {
        let modules = vec![
            module(
                r#"{"id": 1, "name": "Week 1", "published": true, "items": [
                    {"id": 10, "title": "Slides", "html_url": "https://x/10", "published": true},
                    {"id": 11, "title": "Draft quiz", "published": false}
                ]}"#,
            ),
            module(r#"{"id": 2, "name": "Week 2", "published": false, "items": []}"#),
        ];

        let ids: Vec<String> = flatten_modules(modules.clone(), false)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["module-1", "item-10"]);

        let all = flatten_modules(modules, true);
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].kind, ModuleEntryKind::Module);
    }

    #[test]
    fn test_flatten_modules_without_visibility_info() {
        // Students' tokens get no `published` field at all
        let modules = vec![module(
            r#"{"id": 3, "name": "Intro", "items": [{"id": 30, "title": "Syllabus"}]}"#,
        )];
        assert_eq!(flatten_modules(modules, false).len(), 2);
    }

    #[test]
    fn test_convert_announcement_strips_html() {
        let raw: canvas_client::Announcement = serde_json::from_str(
            r#"{"id": 5, "title": "Room change", "message": "<p>Room <b>DMP 110</b></p>",
                "html_url": "https://x/5", "posted_at": null, "created_at": null}"#,
        )
        .unwrap();
        let a = convert_announcement(raw);
        assert_eq!(a.id, "5");
        assert_eq!(a.body, "Room DMP 110");
        assert!(a.created_at.is_none());
    }

    #[test]
    fn test_query_start_stays_in_range() {
        let since = NaiveDate::from_ymd_opt(2024, 1, 3)
            .and_then(|d| d.and_hms_opt(8, 0, 0));
        assert_eq!(query_start(since), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(query_start(None), EARLIEST_DATE);
        assert_eq!(query_start(Some(NaiveDateTime::MIN)), EARLIEST_DATE);
        assert_eq!(
            query_start(NaiveDate::from_ymd_opt(1970, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))),
            EARLIEST_DATE
        );
    }

    #[test]
    fn test_map_error() {
        assert!(matches!(
            map_error(CourseId(9), canvas_client::Error::NotFound("/api/v1/courses/9".into())),
            TrackerError::EntityNotFound(_)
        ));
        assert!(matches!(
            map_error(CourseId(9), canvas_client::Error::Unauthorized("bad token".into())),
            TrackerError::TransientFetch(_)
        ));
    }
}
