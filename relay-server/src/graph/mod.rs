//! Knowledge-graph lookups.
//!
//! The relay asks the graph one fixed question per child: which homework is
//! assigned and what it covers, and which activities the child joined along
//! with the emotions and triggers tied to them. The records are flattened into
//! a plain-text context for the model.

mod neo4j;

pub use neo4j::{query_base_url, Neo4jStore, CHILD_CONTEXT_QUERY};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One row of the child traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRecord {
    pub child_name: String,
    pub homework_title: String,
    pub homework_status: String,
    pub homework_difficulty: String,
    pub emotion_name: String,
    pub emotion_trigger: String,
    pub concept_name: String,
    pub activity_name: String,
}

impl ChildRecord {
    /// Render the record as one sentence pair for the model context.
    pub fn describe(&self) -> String {
        format!(
            "{} is working on {} (Status: {}, Difficulty: {}), covering concept {}. \
             Also felt {} due to participating in {} activity because of '{}'.",
            self.child_name,
            self.homework_title,
            self.homework_status,
            self.homework_difficulty,
            self.concept_name,
            self.emotion_name,
            self.activity_name,
            self.emotion_trigger,
        )
    }
}

/// Errors from the graph store.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Graph store request failed: {0}")]
    Request(String),

    #[error("Graph store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Graph query failed ({code}): {message}")]
    Query { code: String, message: String },

    #[error("Unexpected graph store response: {0}")]
    Decode(String),

    #[error("Invalid graph store URI: {0}")]
    InvalidUri(String),
}

/// Source of child records.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Run the child traversal.
    async fn child_records(&self, child_id: &str) -> Result<Vec<ChildRecord>, GraphError>;
}

/// Context text used when the traversal finds nothing.
pub fn no_data_context(child_id: &str) -> String {
    format!("No data found for child {child_id}.")
}

/// Flatten records into model context, one line per record.
pub fn summarize(child_id: &str, records: &[ChildRecord]) -> String {
    if records.is_empty() {
        return no_data_context(child_id);
    }

    records
        .iter()
        .map(ChildRecord::describe)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fetch and flatten the context for `child_id`.
///
/// An empty traversal is not an error: it yields the "no data" context, which
/// is passed to the model like any other.
pub async fn child_context(store: &dyn GraphStore, child_id: &str) -> Result<String, GraphError> {
    let records = store.child_records(child_id).await?;
    tracing::info!(
        store = store.name(),
        child_id = %child_id,
        records = records.len(),
        "Graph context retrieved"
    );
    Ok(summarize(child_id, &records))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ChildRecord {
        ChildRecord {
            child_name: "Aarav".into(),
            homework_title: "Fractions Worksheet".into(),
            homework_status: "Pending".into(),
            homework_difficulty: "Medium".into(),
            emotion_name: "Anxious".into(),
            emotion_trigger: "upcoming match".into(),
            concept_name: "Fractions".into(),
            activity_name: "Cricket".into(),
        }
    }

    struct FixedStore(Result<Vec<ChildRecord>, ()>);

    #[async_trait]
    impl GraphStore for FixedStore {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn child_records(&self, _child_id: &str) -> Result<Vec<ChildRecord>, GraphError> {
            self.0
                .clone()
                .map_err(|_| GraphError::Request("connection refused".into()))
        }
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            record().describe(),
            "Aarav is working on Fractions Worksheet (Status: Pending, Difficulty: Medium), \
             covering concept Fractions. Also felt Anxious due to participating in Cricket \
             activity because of 'upcoming match'."
        );
    }

    #[test]
    fn test_summarize_joins_lines() {
        let mut second = record();
        second.concept_name = "Decimals".into();
        let summary = summarize("c1", &[record(), second]);
        assert_eq!(summary.lines().count(), 2);
        assert!(summary.lines().nth(1).unwrap().contains("Decimals"));
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize("c9", &[]), "No data found for child c9.");
    }

    #[tokio::test]
    async fn test_child_context_no_data_is_ok() {
        let store = FixedStore(Ok(vec![]));
        let context = child_context(&store, "unknown").await.unwrap();
        assert_eq!(context, no_data_context("unknown"));
    }

    #[tokio::test]
    async fn test_child_context_error() {
        let store = FixedStore(Err(()));
        let err = child_context(&store, "c1").await.unwrap_err();
        assert!(matches!(err, GraphError::Request(_)));
    }
}
