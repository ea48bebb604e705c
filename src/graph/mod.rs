//! Link graph the game is played on.
//!
//! The core only needs two things from the content provider: resolving a topic to its content
//! and outgoing links, and drawing a random topic. Caching is the provider's concern.

pub mod static_graph;
#[cfg(feature = "wiki-graph")]
pub mod wikipedia;

use std::{collections::BTreeSet, error::Error};

use futures::future::BoxFuture;
use thiserror::Error;

pub use static_graph::StaticArticleGraph;
#[cfg(feature = "wiki-graph")]
pub use wikipedia::WikipediaGraph;

/// Result alias for link graph lookups.
pub type GraphResult<T> = Result<T, GraphError>;

/// A resolved topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Canonical title of the topic.
    pub title: String,
    pub content: String,
    /// Topics directly reachable from this one.
    pub links: BTreeSet<String>,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown topic `{0}`")]
    UnknownTopic(String),
    #[error("link graph has no topics")]
    Empty,
    #[error("link graph unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl GraphError {
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        GraphError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Content provider consulted for topic validation and move checks.
pub trait ArticleGraph: Send + Sync {
    fn resolve(&self, topic: &str) -> BoxFuture<'static, GraphResult<Article>>;
    fn random_topic(&self) -> BoxFuture<'static, GraphResult<String>>;
}

/// Draw two distinct random topics, giving up after `attempts` draws of the target.
pub async fn random_pair(
    graph: &dyn ArticleGraph,
    attempts: u32,
) -> GraphResult<(String, String)> {
    let start = graph.random_topic().await?;
    for _ in 0..attempts.max(1) {
        let target = graph.random_topic().await?;
        if target != start {
            return Ok((start, target));
        }
    }
    Err(GraphError::UnknownTopic(format!(
        "no topic distinct from `{start}` after {attempts} draws"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn random_pair_is_distinct() {
        let graph = StaticArticleGraph::from_links([
            ("Tokyo", "", vec!["Japan"]),
            ("Japan", "", vec!["Tokyo"]),
        ]);
        for _ in 0..20 {
            let (start, target) = random_pair(&graph, 64).await.unwrap();
            assert_ne!(start, target);
        }
    }

    #[tokio::test]
    async fn single_topic_graph_cannot_pair() {
        let graph = StaticArticleGraph::from_links([("Tokyo", "", Vec::<&str>::new())]);
        let err = random_pair(&graph, 3).await.unwrap_err();
        assert!(matches!(err, GraphError::UnknownTopic(_)));
    }
}
