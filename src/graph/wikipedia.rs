//! Link graph backed by the MediaWiki action API.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{Article, ArticleGraph, GraphError, GraphResult};

/// Default endpoint of the English Wikipedia API.
pub const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";
const USER_AGENT: &str = concat!("link-race-back/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on continuation requests when paging through a topic's links.
const MAX_LINK_PAGES: usize = 10;
const CACHE_CAPACITY: usize = 4096;

/// Failures talking to the MediaWiki API.
#[derive(Debug, Error)]
pub enum WikiError {
    #[error("failed to build HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to query `{what}`")]
    RequestSend {
        what: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response status {status} for `{what}`")]
    RequestStatus { what: String, status: StatusCode },
    #[error("failed to decode response for `{what}`")]
    DecodeResponse {
        what: String,
        #[source]
        source: reqwest::Error,
    },
}

impl From<WikiError> for GraphError {
    fn from(err: WikiError) -> Self {
        GraphError::unavailable(err.to_string(), err)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    query: Option<QueryBody>,
    #[serde(rename = "continue", default)]
    continuation: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryBody {
    #[serde(default)]
    pages: Vec<Page>,
    #[serde(default)]
    random: Vec<RandomPage>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    title: String,
}

#[derive(Debug, Deserialize)]
struct RandomPage {
    title: String,
}

#[derive(Clone)]
pub struct WikipediaGraph {
    client: Client,
    api_url: Arc<str>,
    cache: Arc<DashMap<String, Article>>,
}

impl WikipediaGraph {
    pub fn new(api_url: impl Into<String>) -> Result<Self, WikiError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| WikiError::ClientBuilder { source })?;

        Ok(Self {
            client,
            api_url: Arc::from(api_url.into()),
            cache: Arc::new(DashMap::new()),
        })
    }

    async fn query(&self, what: &str, params: &[(String, String)]) -> Result<QueryResponse, WikiError> {
        let response = self
            .client
            .get(self.api_url.as_ref())
            .query(&[("action", "query"), ("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await
            .map_err(|source| WikiError::RequestSend {
                what: what.to_owned(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(WikiError::RequestStatus {
                what: what.to_owned(),
                status: response.status(),
            });
        }

        response
            .json::<QueryResponse>()
            .await
            .map_err(|source| WikiError::DecodeResponse {
                what: what.to_owned(),
                source,
            })
    }

    async fn fetch_article(&self, topic: &str) -> GraphResult<Article> {
        let title = normalize_title(topic);
        if let Some(cached) = self.cache.get(&title) {
            return Ok(cached.clone());
        }

        let base = vec![
            ("titles".to_owned(), title.clone()),
            ("prop".to_owned(), "extracts|links".to_owned()),
            ("explaintext".to_owned(), "1".to_owned()),
            ("exintro".to_owned(), "1".to_owned()),
            ("plnamespace".to_owned(), "0".to_owned()),
            ("pllimit".to_owned(), "max".to_owned()),
            ("redirects".to_owned(), "1".to_owned()),
        ];

        let mut article: Option<Article> = None;
        let mut continuation: Option<HashMap<String, String>> = None;

        for _ in 0..MAX_LINK_PAGES {
            let mut params = base.clone();
            if let Some(extra) = continuation.take() {
                params.extend(extra);
            }

            let response = self.query(&title, &params).await?;
            let page = response
                .query
                .unwrap_or_default()
                .pages
                .into_iter()
                .next()
                .ok_or_else(|| GraphError::UnknownTopic(topic.to_owned()))?;
            if page.missing || page.invalid {
                return Err(GraphError::UnknownTopic(topic.to_owned()));
            }

            let entry = article.get_or_insert_with(|| Article {
                title: page.title.clone(),
                content: String::new(),
                links: BTreeSet::new(),
            });
            if let Some(extract) = page.extract.filter(|text| !text.is_empty()) {
                entry.content = extract;
            }
            entry.links.extend(page.links.into_iter().map(|link| link.title));

            match response.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        let article = article.ok_or_else(|| GraphError::UnknownTopic(topic.to_owned()))?;
        debug!(topic = %title, links = article.links.len(), "fetched article");

        if self.cache.len() >= CACHE_CAPACITY {
            self.cache.clear();
        }
        self.cache.insert(title, article.clone());
        Ok(article)
    }

    async fn fetch_random(&self) -> GraphResult<String> {
        let params = vec![
            ("list".to_owned(), "random".to_owned()),
            ("rnnamespace".to_owned(), "0".to_owned()),
            ("rnlimit".to_owned(), "1".to_owned()),
        ];
        let response = self.query("random", &params).await?;
        response
            .query
            .unwrap_or_default()
            .random
            .into_iter()
            .next()
            .map(|page| page.title)
            .ok_or(GraphError::Empty)
    }
}

impl ArticleGraph for WikipediaGraph {
    fn resolve(&self, topic: &str) -> BoxFuture<'static, GraphResult<Article>> {
        let graph = self.clone();
        let topic = topic.to_owned();
        Box::pin(async move { graph.fetch_article(&topic).await })
    }

    fn random_topic(&self) -> BoxFuture<'static, GraphResult<String>> {
        let graph = self.clone();
        Box::pin(async move { graph.fetch_random().await })
    }
}

/// MediaWiki treats underscores as spaces in titles.
fn normalize_title(topic: &str) -> String {
    topic.trim().replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_use_spaces() {
        assert_eq!(normalize_title(" New_York_City "), "New York City");
    }

    #[test]
    fn decodes_missing_page() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"query": {"pages": [{"ns": 0, "title": "Atlantisss", "missing": true}]}}"#,
        )
        .unwrap();
        let page = &response.query.unwrap().pages[0];
        assert!(page.missing);
        assert!(page.links.is_empty());
    }

    #[test]
    fn decodes_links_with_continuation() {
        let response: QueryResponse = serde_json::from_str(
            r#"{
                "continue": {"plcontinue": "123|0|Osaka", "continue": "||extracts"},
                "query": {"pages": [{
                    "pageid": 123, "ns": 0, "title": "Tokyo",
                    "extract": "Tokyo is the capital of Japan.",
                    "links": [{"ns": 0, "title": "Japan"}, {"ns": 0, "title": "Kanto"}]
                }]}
            }"#,
        )
        .unwrap();
        let continuation = response.continuation.unwrap();
        assert_eq!(continuation["plcontinue"], "123|0|Osaka");

        let page = &response.query.unwrap().pages[0];
        let titles: Vec<_> = page.links.iter().map(|link| link.title.as_str()).collect();
        assert_eq!(titles, vec!["Japan", "Kanto"]);
    }
}
