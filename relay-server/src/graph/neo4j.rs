//! Neo4j graph store over the HTTP Query API (`/db/<database>/query/v2`).

use super::{ChildRecord, GraphError, GraphStore};
use async_trait::async_trait;
use relay_common::config::Config;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Child traversal. Parameterised on `$child_id`.
pub const CHILD_CONTEXT_QUERY: &str = "\
MATCH (c:Child {child_id: $child_id})-[:ASSIGNED]->(h:Homework),
      (c)-[:PARTICIPATED]->(a:Activity), (h)-[:COVERS]->(con:Concept),
      (c)-[:EXPERIENCED]->(em:Emotion)-[:RELATED_TO]->(a)
RETURN DISTINCT c.name AS child_name, h.title AS homework_title, h.status AS homework_status,
       h.difficulty AS homework_difficulty, em.name AS emotion_name, em.trigger AS emotion_trigger,
       con.name AS concept_name, a.name AS activity_name
LIMIT 10";

/// Map a driver-style URI onto the HTTP base URL of the same server.
///
/// | URI scheme                         | HTTP base                 |
/// |------------------------------------|---------------------------|
/// | `neo4j+s`, `neo4j+ssc`, `bolt+s`, `bolt+ssc` | `https://<host>` |
/// | `neo4j`, `bolt`                    | `http://<host>:7474`      |
/// | `http`, `https`                    | unchanged                 |
pub fn query_base_url(uri: &str) -> Result<String, GraphError> {
    let parsed = url::Url::parse(uri).map_err(|e| GraphError::InvalidUri(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| GraphError::InvalidUri(format!("no host in '{uri}'")))?;

    match parsed.scheme() {
        "neo4j+s" | "neo4j+ssc" | "bolt+s" | "bolt+ssc" => Ok(format!("https://{host}")),
        "neo4j" | "bolt" => Ok(format!("http://{host}:7474")),
        "http" | "https" => Ok(uri.trim_end_matches('/').to_string()),
        other => Err(GraphError::InvalidUri(format!("unsupported scheme '{other}'"))),
    }
}

/// Neo4j client.
pub struct Neo4jStore {
    client: reqwest::Client,
    endpoint: String,
    username: String,
    password: Option<String>,
}

impl Neo4jStore {
    /// Create a store for an HTTP base URL such as `https://abc.databases.neo4j.io`.
    pub fn new(
        base_url: impl Into<String>,
        database: &str,
        username: impl Into<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let base_url = base_url.into();
        Self {
            client,
            endpoint: format!("{}/db/{}/query/v2", base_url.trim_end_matches('/'), database),
            username: username.into(),
            password,
        }
    }

    /// Build from relay configuration.
    pub fn from_config(config: &Config) -> Result<Self, GraphError> {
        let base_url = query_base_url(&config.neo4j.uri)?;
        if config.neo4j_password().is_none() {
            tracing::warn!("NEO4J_PASSWORD is not set; graph queries will be unauthenticated");
        }

        Ok(Self::new(
            base_url,
            &config.neo4j.database,
            config.neo4j.username.clone(),
            config.neo4j_password().map(String::from),
            Duration::from_secs(config.neo4j.timeout_secs),
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    fn name(&self) -> &str {
        "neo4j"
    }

    async fn child_records(&self, child_id: &str) -> Result<Vec<ChildRecord>, GraphError> {
        let start = Instant::now();
        let body = QueryRequest {
            statement: CHILD_CONTEXT_QUERY,
            parameters: HashMap::from([("child_id", child_id)]),
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body);
        if let Some(ref password) = self.password {
            request = request.basic_auth(&self.username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| GraphError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GraphError::Request(e.to_string()))?;

        tracing::debug!(
            child_id = %child_id,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Graph query completed"
        );

        let parsed: QueryResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => return Err(GraphError::Decode(e.to_string())),
            Err(_) => {
                return Err(GraphError::Status {
                    status: status.as_u16(),
                    message: text,
                })
            }
        };

        if let Some(error) = parsed.errors.into_iter().next() {
            return Err(GraphError::Query {
                code: error.code,
                message: error.message,
            });
        }

        if !status.is_success() {
            return Err(GraphError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        let data = parsed
            .data
            .ok_or_else(|| GraphError::Decode("response has no data".into()))?;
        Ok(data.into_records())
    }
}

// ============================================================================
// Query API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    statement: &'a str,
    parameters: HashMap<&'a str, &'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    errors: Vec<QueryError>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    fields: Vec<String>,
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct QueryError {
    code: String,
    message: String,
}

impl QueryData {
    fn into_records(self) -> Vec<ChildRecord> {
        let index: HashMap<&str, usize> = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.as_str(), i))
            .collect();

        self.values
            .iter()
            .map(|row| {
                let get = |field: &str| {
                    index
                        .get(field)
                        .and_then(|&i| row.get(i))
                        .map(cell_text)
                        .unwrap_or_else(|| "unknown".to_string())
                };
                ChildRecord {
                    child_name: get("child_name"),
                    homework_title: get("homework_title"),
                    homework_status: get("homework_status"),
                    homework_difficulty: get("homework_difficulty"),
                    emotion_name: get("emotion_name"),
                    emotion_trigger: get("emotion_trigger"),
                    concept_name: get("concept_name"),
                    activity_name: get("activity_name"),
                }
            })
            .collect()
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer, password: Option<&str>) -> Neo4jStore {
        Neo4jStore::new(
            server.uri(),
            "neo4j",
            "neo4j",
            password.map(String::from),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_query_base_url() {
        assert_eq!(
            query_base_url("neo4j+s://6a91.databases.neo4j.io").unwrap(),
            "https://6a91.databases.neo4j.io"
        );
        assert_eq!(
            query_base_url("bolt://localhost:7687").unwrap(),
            "http://localhost:7474"
        );
        assert_eq!(
            query_base_url("http://127.0.0.1:7474/").unwrap(),
            "http://127.0.0.1:7474"
        );
        assert!(matches!(
            query_base_url("redis://localhost"),
            Err(GraphError::InvalidUri(_))
        ));
    }

    #[test]
    fn test_endpoint() {
        let store = Neo4jStore::new(
            "https://graph.example.com/",
            "schools",
            "neo4j",
            None,
            Duration::from_secs(1),
        );
        assert_eq!(
            store.endpoint(),
            "https://graph.example.com/db/schools/query/v2"
        );
    }

    #[tokio::test]
    async fn test_child_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/query/v2"))
            .and(basic_auth("neo4j", "secret"))
            .and(body_partial_json(json!({"parameters": {"child_id": "c1"}})))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "data": {
                    "fields": [
                        "child_name", "homework_title", "homework_status", "homework_difficulty",
                        "emotion_name", "emotion_trigger", "concept_name", "activity_name"
                    ],
                    "values": [
                        ["Aarav", "Fractions Worksheet", "Pending", 3,
                         "Anxious", null, "Fractions", "Cricket"]
                    ]
                },
                "bookmarks": ["FB:abc"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = store(&server, Some("secret")).child_records("c1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].child_name, "Aarav");
        assert_eq!(records[0].homework_difficulty, "3");
        assert_eq!(records[0].emotion_trigger, "unknown");
        assert_eq!(records[0].activity_name, "Cricket");
    }

    #[tokio::test]
    async fn test_child_records_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "data": {"fields": ["child_name"], "values": []}
            })))
            .mount(&server)
            .await;

        let records = store(&server, None).child_records("nobody").await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_query_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": [{
                    "code": "Neo.ClientError.Statement.SyntaxError",
                    "message": "Invalid input"
                }]
            })))
            .mount(&server)
            .await;

        let err = store(&server, None).child_records("c1").await.unwrap_err();
        match err {
            GraphError::Query { code, .. } => {
                assert_eq!(code, "Neo.ClientError.Statement.SyntaxError")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_plain_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let err = store(&server, Some("wrong")).child_records("c1").await.unwrap_err();
        assert!(matches!(err, GraphError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let store = Neo4jStore::new(
            "http://127.0.0.1:1",
            "neo4j",
            "neo4j",
            None,
            Duration::from_secs(2),
        );
        let err = store.child_records("c1").await.unwrap_err();
        assert!(matches!(err, GraphError::Request(_)));
    }
}
