//! News search providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{normalize_base, read_json};
use crate::cascade::{Provider, ProviderError};
use crate::task::NewsQuery;

const NEWSAPI_URL: &str = "https://newsapi.org";
const GNEWS_URL: &str = "https://gnews.io";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    pub source: String,
    pub published_at: String,
}

pub struct NewsApi {
    client: reqwest::Client,
    base_url: String,
}

impl NewsApi {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, NEWSAPI_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    source: NewsApiSource,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

#[async_trait]
impl Provider<NewsQuery, Vec<Article>> for NewsApi {
    fn name(&self) -> &str {
        "newsapi"
    }

    async fn fetch(&self, query: &NewsQuery, api_key: &str) -> Result<Vec<Article>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v2/everything", self.base_url))
            .header("X-Api-Key", api_key)
            .query(&[
                ("q", query.query.as_str()),
                ("language", query.language.as_str()),
                ("sortBy", "publishedAt"),
            ])
            .query(&[("pageSize", query.limit)])
            .send()
            .await?;
        let parsed: NewsApiResponse = read_json(response).await?;

        if parsed.status != "ok" {
            return Err(ProviderError::malformed(
                parsed.message.unwrap_or(parsed.status),
            ));
        }

        let articles: Vec<Article> = parsed
            .articles
            .into_iter()
            .filter_map(|a| {
                Some(Article {
                    title: a.title?,
                    description: a.description,
                    url: a.url?,
                    source: a.source.name.unwrap_or_else(|| "unknown".to_string()),
                    published_at: a.published_at.unwrap_or_default(),
                })
            })
            .take(query.limit as usize)
            .collect();

        if articles.is_empty() {
            return Err(ProviderError::malformed("no articles"));
        }
        Ok(articles)
    }
}

pub struct GNews {
    client: reqwest::Client,
    base_url: String,
}

impl GNews {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, GNEWS_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GNewsResponse {
    #[serde(default)]
    articles: Vec<GNewsArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GNewsArticle {
    title: String,
    description: Option<String>,
    url: String,
    published_at: String,
    source: GNewsSource,
}

#[derive(Debug, Deserialize)]
struct GNewsSource {
    name: String,
}

#[async_trait]
impl Provider<NewsQuery, Vec<Article>> for GNews {
    fn name(&self) -> &str {
        "gnews"
    }

    async fn fetch(&self, query: &NewsQuery, api_key: &str) -> Result<Vec<Article>, ProviderError> {
        // GNews caps `max` at 10 on the free tier.
        let max = query.limit.min(10);
        let response = self
            .client
            .get(format!("{}/api/v4/search", self.base_url))
            .query(&[
                ("q", query.query.as_str()),
                ("lang", query.language.as_str()),
                ("token", api_key),
            ])
            .query(&[("max", max)])
            .send()
            .await?;
        let parsed: GNewsResponse = read_json(response).await?;

        if parsed.articles.is_empty() {
            return Err(ProviderError::malformed("no articles"));
        }
        Ok(parsed
            .articles
            .into_iter()
            .map(|a| Article {
                title: a.title,
                description: a.description,
                url: a.url,
                source: a.source.name,
                published_at: a.published_at,
            })
            .collect())
    }
}
