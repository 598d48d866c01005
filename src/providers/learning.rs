//! Course discovery through the YouTube Data API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{normalize_base, read_json};
use crate::cascade::{Provider, ProviderError};
use crate::task::CourseQuery;

const YOUTUBE_URL: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseResource {
    pub title: String,
    pub provider: String,
    pub url: String,
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
    pub free: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

pub struct YouTubeCourses {
    client: reqwest::Client,
    base_url: String,
}

impl YouTubeCourses {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, YOUTUBE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    playlist_id: Option<String>,
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    channel_title: String,
}

#[async_trait]
impl Provider<CourseQuery, Vec<CourseResource>> for YouTubeCourses {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn fetch(&self, query: &CourseQuery, api_key: &str) -> Result<Vec<CourseResource>, ProviderError> {
        let level = query.level.unwrap_or_default();
        let q = format!("{} {} course", query.topic, level.as_str());
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("part", "snippet"),
                ("type", "playlist"),
                ("q", q.as_str()),
                ("key", api_key),
            ])
            .query(&[("maxResults", query.limit)])
            .send()
            .await?;
        let parsed: SearchResponse = read_json(response).await?;

        let courses: Vec<CourseResource> = parsed
            .items
            .into_iter()
            .filter_map(|item| {
                let url = match (item.id.playlist_id, item.id.video_id) {
                    (Some(list), _) => format!("https://www.youtube.com/playlist?list={}", list),
                    (None, Some(video)) => format!("https://www.youtube.com/watch?v={}", video),
                    (None, None) => return None,
                };
                Some(CourseResource {
                    title: item.snippet.title,
                    provider: format!("YouTube - {}", item.snippet.channel_title),
                    url,
                    level: level.as_str().to_string(),
                    duration_hours: None,
                    free: true,
                    rating: None,
                })
            })
            .collect();

        if courses.is_empty() {
            return Err(ProviderError::malformed("no playlists found"));
        }
        Ok(courses)
    }
}
