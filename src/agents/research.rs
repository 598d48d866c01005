//! Research agent: news, market research, competitor profiles, SWOT, and
//! general research for task types with no fixed mapping.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};

use super::{
    unsupported, AgentError, AgentResult, AgentType, Capability, Credential, CredentialSet,
    DomainAgent, ParamSpec, ParamType, Provenance, SharedKeys,
};
use crate::cascade::{round2, seeded_rng, Cascade, Retrieved};
use crate::providers::research::{Article, GNews, NewsApi};
use crate::task::{
    CompetitorRequest, GeneralResearchRequest, MarketResearchRequest, NewsQuery, SwotRequest,
    Task, TaskParams,
};

const OUTLETS: [&str; 5] = [
    "Industry Wire",
    "Market Pulse",
    "Business Daily",
    "Tech Ledger",
    "Global Trends Report",
];

const HEADLINE_TEMPLATES: [&str; 6] = [
    "{} sees renewed investor interest",
    "Analysts weigh outlook for {}",
    "What the latest data says about {}",
    "New entrants reshape {}",
    "Regulators take a closer look at {}",
    "Consumers shift spending toward {}",
];

const PRICE_POSITIONS: [&str; 3] = ["budget", "mid-market", "premium"];

const STRENGTHS: [&str; 4] = [
    "brand recognition",
    "distribution reach",
    "product breadth",
    "cost efficiency",
];

const WEAKNESSES: [&str; 4] = [
    "slow release cadence",
    "narrow geography",
    "high churn",
    "thin margins",
];

const TRENDS: [&str; 6] = [
    "digital adoption",
    "sustainability requirements",
    "consolidation among incumbents",
    "subscription pricing",
    "AI-assisted operations",
    "direct-to-consumer channels",
];

/// Headlines requested when news only backs another analysis.
const CONTEXT_ARTICLES: u32 = 5;

pub struct ResearchAgent {
    credentials: CredentialSet,
    news: Cascade<NewsQuery, Vec<Article>>,
}

impl ResearchAgent {
    pub fn new(http: reqwest::Client, shared: SharedKeys) -> Self {
        Self {
            credentials: CredentialSet::new(shared),
            news: Cascade::new("news")
                .tier(Arc::new(NewsApi::new(http.clone())))
                .tier(Arc::new(GNews::new(http))),
        }
    }

    async fn headlines(&self, query: NewsQuery, trail: &mut Provenance) -> Retrieved<Vec<Article>> {
        let retrieved = self.news.run(&query, &self.credentials, mock_headlines).await;
        trail.note(&retrieved);
        retrieved
    }

    async fn news_search(&self, query: &NewsQuery, trail: &mut Provenance) -> Value {
        let retrieved = self.headlines(query.clone(), trail).await;
        json!({
            "query": query.query,
            "totalResults": retrieved.value.len(),
            "articles": retrieved.value,
            "provider": retrieved.source.label(),
            "dataSource": trail.data_source(),
        })
    }

    async fn market_research(&self, request: &MarketResearchRequest, trail: &mut Provenance) -> Value {
        let mut topic = format!("{} market", request.industry);
        if let Some(region) = &request.region {
            topic.push(' ');
            topic.push_str(region);
        }
        let news = self.headlines(context_query(&topic), trail).await;

        let mut rng = seeded_rng(&topic.to_lowercase());
        let size_billion = round2(rng.gen_range(5.0..900.0));
        let growth = round2(rng.gen_range(1.5..14.0));
        let mut trends: Vec<String> = request.keywords.iter().map(|k| format!("{} demand", k)).collect();
        let start = rng.gen_range(0..TRENDS.len());
        for offset in 0..TRENDS.len() {
            if trends.len() >= 3 {
                break;
            }
            trends.push(TRENDS[(start + offset) % TRENDS.len()].to_string());
        }

        json!({
            "industry": request.industry,
            "region": request.region,
            "marketSizeBillionUsd": size_billion,
            "annualGrowthPercent": growth,
            "fiveYearProjectionBillionUsd": round2(size_billion * (1.0 + growth / 100.0).powi(5)),
            "keyTrends": trends,
            "recentNews": news.value,
            "dataSource": trail.data_source(),
        })
    }

    async fn competitor_analysis(&self, request: &CompetitorRequest, trail: &mut Provenance) -> Value {
        let news = self.headlines(context_query(&request.company), trail).await;

        let mut names = vec![request.company.clone()];
        names.extend(request.competitors.iter().cloned());
        let profiles: Vec<Value> = names
            .iter()
            .map(|name| {
                let mut rng = seeded_rng(&name.to_lowercase());
                json!({
                    "name": name,
                    "estimatedMarketSharePercent": round2(rng.gen_range(2.0..35.0)),
                    "pricePosition": PRICE_POSITIONS.choose(&mut rng),
                    "strength": STRENGTHS.choose(&mut rng),
                    "weakness": WEAKNESSES.choose(&mut rng),
                })
            })
            .collect();

        json!({
            "company": request.company,
            "industry": request.industry,
            "profiles": profiles,
            "recentNews": news.value,
            "dataSource": trail.data_source(),
        })
    }

    async fn general_research(&self, request: &GeneralResearchRequest, trail: &mut Provenance) -> Value {
        let news = self.headlines(context_query(&request.query), trail).await;
        let sources: BTreeSet<&str> = news.value.iter().map(|a| a.source.as_str()).collect();
        json!({
            "taskType": request.task_type,
            "query": request.query,
            "summary": format!(
                "Collected {} recent items on \"{}\" from {} source(s).",
                news.value.len(),
                request.query,
                sources.len()
            ),
            "findings": news.value,
            "dataSource": trail.data_source(),
        })
    }
}

#[async_trait]
impl DomainAgent for ResearchAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Research
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::new("marketResearch", "Market size, growth and trends for an industry")
                .param("industry", ParamSpec::required(ParamType::String))
                .param("region", ParamSpec::optional(ParamType::String))
                .param("keywords", ParamSpec::optional(ParamType::Array)),
            Capability::new("competitorAnalysis", "Profiles of a company and its competitors")
                .param("company", ParamSpec::required(ParamType::String))
                .param("competitors", ParamSpec::optional(ParamType::Array))
                .param("industry", ParamSpec::optional(ParamType::String)),
            Capability::new("newsSearch", "Recent news articles for a query")
                .param("query", ParamSpec::required(ParamType::String))
                .param("language", ParamSpec::with_default(ParamType::String, json!("en")))
                .param("limit", ParamSpec::with_default(ParamType::Integer, json!(10))),
            Capability::new("swotAnalysis", "Strengths, weaknesses, opportunities and threats")
                .param("subject", ParamSpec::required(ParamType::String))
                .param("industry", ParamSpec::optional(ParamType::String)),
        ]
    }

    async fn execute_task(&self, task: &Task) -> Result<AgentResult, AgentError> {
        let params = TaskParams::parse(&task.task_type, &task.parameters)?;
        let mut trail = Provenance::default();

        let (data, confidence) = match params {
            TaskParams::NewsSearch(q) => (self.news_search(&q, &mut trail).await, 0.8),
            TaskParams::MarketResearch(r) => (self.market_research(&r, &mut trail).await, 0.7),
            TaskParams::CompetitorAnalysis(r) => (self.competitor_analysis(&r, &mut trail).await, 0.65),
            TaskParams::SwotAnalysis(r) => (swot_analysis(&r), 0.6),
            TaskParams::GeneralResearch(r) => (self.general_research(&r, &mut trail).await, 0.5),
            _ => return Err(unsupported(AgentType::Research, task)),
        };

        Ok(trail.finish(AgentType::Research, &task.task_type, data, confidence))
    }

    fn set_api_credentials(&mut self, provider: &str, credential: Credential) {
        self.credentials.insert(provider, credential);
    }

    fn api_credentials(&self, provider: &str) -> Option<&Credential> {
        self.credentials.get(provider)
    }
}

fn context_query(query: &str) -> NewsQuery {
    NewsQuery {
        query: query.to_string(),
        language: "en".to_string(),
        limit: CONTEXT_ARTICLES,
    }
}

fn mock_headlines(query: &NewsQuery) -> Vec<Article> {
    let mut rng = seeded_rng(&query.query.to_lowercase());
    let now = Utc::now();
    let count = query.limit.clamp(1, 5);

    (0..count)
        .map(|i| {
            let template = HEADLINE_TEMPLATES.choose(&mut rng).copied().unwrap_or(HEADLINE_TEMPLATES[0]);
            let published = now - Duration::hours(6 * i as i64 + rng.gen_range(0..6));
            Article {
                title: template.replace("{}", &query.query),
                description: Some(format!("Summary of recent coverage on {}.", query.query)),
                url: format!("https://example.com/news/{}-{}", slug(&query.query), i + 1),
                source: OUTLETS.choose(&mut rng).copied().unwrap_or(OUTLETS[0]).to_string(),
                published_at: published.to_rfc3339(),
            }
        })
        .collect()
}

fn slug(text: &str) -> String {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn swot_analysis(request: &SwotRequest) -> Value {
    let subject = &request.subject;
    let industry = request.industry.as_deref().unwrap_or("its market");
    json!({
        "subject": subject,
        "industry": request.industry,
        "strengths": [
            format!("Clear focus that sets {} apart", subject),
            "Ability to move quickly on customer feedback".to_string(),
        ],
        "weaknesses": [
            "Limited brand awareness compared with incumbents".to_string(),
            "Resource constraints on simultaneous initiatives".to_string(),
        ],
        "opportunities": [
            format!("Underserved segments within {}", industry),
            "Partnerships that extend distribution".to_string(),
        ],
        "threats": [
            format!("Established competitors in {} responding on price", industry),
            "Shifts in regulation or consumer preference".to_string(),
        ],
        "dataSource": "computed",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::testing::FakeProvider;
    use serde_json::json;

    fn agent() -> ResearchAgent {
        ResearchAgent::new(reqwest::Client::new(), SharedKeys::default())
    }

    #[tokio::test]
    async fn test_news_without_credentials_is_synthetic() {
        let result = agent()
            .execute_task(&Task::new("g", "u", "newsSearch", json!({"query": "solar panels", "limit": 3})))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.is_fallback());
        let articles = result.data["articles"].as_array().unwrap();
        assert_eq!(articles.len(), 3);
        assert!(articles[0]["title"].as_str().unwrap().contains("solar panels"));
        assert!(articles[0]["url"].as_str().unwrap().contains("solar-panels"));
    }

    #[tokio::test]
    async fn test_live_news_skips_secondary() {
        let article = Article {
            title: "Live".to_string(),
            description: None,
            url: "https://news.example/1".to_string(),
            source: "Wire".to_string(),
            published_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let primary = FakeProvider::ok("newsapi", vec![article]);
        let secondary = FakeProvider::ok("gnews", Vec::<Article>::new());

        let mut agent = agent();
        agent.news = Cascade::new("news").tier(primary.clone()).tier(secondary.clone());
        agent.set_api_credentials("newsapi", Credential::new("newsapi", "X-Api-Key", "k"));
        agent.set_api_credentials("gnews", Credential::new("gnews", "token", "k"));

        let result = agent
            .execute_task(&Task::new("g", "u", "newsSearch", json!({"query": "rust"})))
            .await
            .unwrap();

        assert!(!result.is_fallback());
        assert_eq!(result.data["provider"], "newsapi");
        assert_eq!(secondary.calls(), 0);
        assert_eq!(
            result.metadata.as_ref().unwrap().data_sources,
            vec!["newsapi".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unmapped_task_runs_general_research() {
        let result = agent()
            .execute_task(&Task::new(
                "g",
                "u",
                "planMarathonTraining",
                json!({"query": "marathon training plans"}),
            ))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.data["taskType"], "planMarathonTraining");
        assert!(!result.data["findings"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_market_research_is_deterministic() {
        let task = Task::new(
            "g",
            "u",
            "marketResearch",
            json!({"industry": "meal kits", "region": "EU", "keywords": ["vegan"]}),
        );
        let agent = agent();
        let a = agent.execute_task(&task).await.unwrap();
        let b = agent.execute_task(&task).await.unwrap();

        assert_eq!(a.data["marketSizeBillionUsd"], b.data["marketSizeBillionUsd"]);
        let trends = a.data["keyTrends"].as_array().unwrap();
        assert_eq!(trends[0], "vegan demand");
        assert!(trends.len() >= 3);
    }

    #[tokio::test]
    async fn test_swot_has_four_quadrants() {
        let result = agent()
            .execute_task(&Task::new("g", "u", "swotAnalysis", json!({"company": "Acme Bikes"})))
            .await
            .unwrap();

        for key in ["strengths", "weaknesses", "opportunities", "threats"] {
            assert_eq!(result.data[key].as_array().unwrap().len(), 2, "{}", key);
        }
        assert!(!result.is_fallback());
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Electric Vehicles & EU"), "electric-vehicles-eu");
    }
}
