//! Fixed in-memory link graph, loadable from a JSON file.

use std::{fs, path::Path, sync::Arc};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use rand::{Rng, rng};
use serde::Deserialize;
use tracing::info;

use super::{Article, ArticleGraph, GraphError, GraphResult};

#[derive(Clone, Debug)]
pub struct StaticArticleGraph {
    articles: Arc<IndexMap<String, Article>>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of a graph file.
struct RawGraph {
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    links: Vec<String>,
}

impl StaticArticleGraph {
    /// Build a graph from `(title, content, links)` triples.
    pub fn from_links<I, T, L>(articles: I) -> Self
    where
        I: IntoIterator<Item = (T, T, L)>,
        T: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        let articles = articles
            .into_iter()
            .map(|(title, content, links)| {
                let title = title.into();
                let article = Article {
                    title: title.clone(),
                    content: content.into(),
                    links: links.into_iter().map(Into::into).collect(),
                };
                (title, article)
            })
            .collect();
        Self {
            articles: Arc::new(articles),
        }
    }

    /// Read a graph file of the form `{"articles": [{"title", "content", "links"}]}`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let raw: RawGraph = serde_json::from_str(&contents)?;
        let graph = Self::from_links(
            raw.articles
                .into_iter()
                .map(|article| (article.title, article.content, article.links)),
        );
        info!(path = %path.display(), topics = graph.len(), "loaded static link graph");
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

impl ArticleGraph for StaticArticleGraph {
    fn resolve(&self, topic: &str) -> BoxFuture<'static, GraphResult<Article>> {
        let result = self
            .articles
            .get(topic)
            .cloned()
            .ok_or_else(|| GraphError::UnknownTopic(topic.to_owned()));
        Box::pin(async move { result })
    }

    fn random_topic(&self) -> BoxFuture<'static, GraphResult<String>> {
        let result = if self.articles.is_empty() {
            Err(GraphError::Empty)
        } else {
            let index = rng().random_range(0..self.articles.len());
            self.articles
                .get_index(index)
                .map(|(title, _)| title.clone())
                .ok_or(GraphError::Empty)
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_known_topics_only() {
        let graph = StaticArticleGraph::from_links([
            ("Tokyo", "Capital of Japan", vec!["Japan", "Osaka"]),
            ("Japan", "Island country", vec!["Tokyo"]),
        ]);

        let tokyo = graph.resolve("Tokyo").await.unwrap();
        assert_eq!(tokyo.content, "Capital of Japan");
        assert!(tokyo.links.contains("Osaka"));

        let err = graph.resolve("Atlantis").await.unwrap_err();
        assert!(matches!(err, GraphError::UnknownTopic(topic) if topic == "Atlantis"));
    }

    #[tokio::test]
    async fn empty_graph_has_no_random_topic() {
        let graph = StaticArticleGraph::from_links(Vec::<(&str, &str, Vec<&str>)>::new());
        assert!(matches!(graph.random_topic().await, Err(GraphError::Empty)));
    }

    #[test]
    fn parses_graph_file_layout() {
        let raw: RawGraph = serde_json::from_str(
            r#"{"articles": [{"title": "Paris", "links": ["France"]}, {"title": "France"}]}"#,
        )
        .unwrap();
        assert_eq!(raw.articles.len(), 2);
        assert_eq!(raw.articles[0].links, vec!["France".to_string()]);
        assert!(raw.articles[1].content.is_empty());
    }
}
