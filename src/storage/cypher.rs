//! Neo4j session over the HTTP transactional Cypher API
//!
//! Each call is one auto-committed request to
//! `POST {url}/db/{database}/tx/commit`. Individuals carry the `Individual`
//! label plus a `run` property; relationships use the edge tag as type.
//! Genes and attribute maps are stored as JSON strings.

use super::traits::{gene_key, GraphSession};
use crate::graph::{
    float_repr, EdgeId, EdgeRecord, EdgeTag, LineageError, LineageResult, NodeId, NodeRecord,
    PropertyValue,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Connection settings for a Neo4j server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CypherConfig {
    /// Base HTTP URL, e.g. `http://localhost:7474`
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CypherConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".into(),
            database: "neo4j".into(),
            user: "neo4j".into(),
            password: String::new(),
            timeout_secs: 30,
        }
    }
}

impl CypherConfig {
    pub fn commit_endpoint(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.url.trim_end_matches('/'),
            self.database
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Statement {
    statement: String,
    parameters: Value,
}

impl Statement {
    fn new(statement: impl Into<String>, parameters: Value) -> Self {
        Self {
            statement: statement.into(),
            parameters,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<ResultSet>,
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultSet {
    #[serde(default)]
    data: Vec<DataRow>,
}

#[derive(Debug, Deserialize)]
struct DataRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    code: String,
    message: String,
}

/// Decode a commit response into the rows of each statement
fn parse_response(body: &str) -> LineageResult<Vec<Vec<Vec<Value>>>> {
    let response: CommitResponse = serde_json::from_str(body)?;
    if let Some(err) = response.errors.first() {
        return Err(LineageError::Transport(format!("{}: {}", err.code, err.message)));
    }
    Ok(response
        .results
        .into_iter()
        .map(|set| set.data.into_iter().map(|data| data.row).collect())
        .collect())
}

fn column_u64(row: &[Value], index: usize) -> LineageResult<u64> {
    row.get(index)
        .and_then(Value::as_u64)
        .ok_or_else(|| LineageError::Format(format!("expected integer in column {}", index)))
}

fn column_str(row: &[Value], index: usize) -> LineageResult<&str> {
    row.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| LineageError::Format(format!("expected string in column {}", index)))
}

// === Statement builders ===

pub(crate) fn merge_node_statement(run: &str, node: &NodeRecord) -> LineageResult<Statement> {
    Ok(Statement::new(
        "MERGE (n:Individual {run: $run, id: $id}) \
         ON CREATE SET n.created_at = $created_at, n.fitness = $fitness, n.score = $score \
         SET n.gene = $gene, n.gene_key = $gene_key, n.generation = $generation, n.attrs = $attrs",
        json!({
            "run": run,
            "id": node.id.as_u64(),
            "created_at": Utc::now().to_rfc3339(),
            "fitness": node.fitness.as_deref().map(float_repr::vec_to_json).transpose()?,
            "score": node.score.map(float_repr::to_value),
            "gene": serde_json::to_string(&node.gene)?,
            "gene_key": gene_key(&node.gene),
            "generation": node.generation,
            "attrs": serde_json::to_string(&node.attrs)?,
        }),
    ))
}

pub(crate) fn merge_edge_statement(run: &str, edge: &EdgeRecord) -> LineageResult<Statement> {
    // relationship types cannot be parameters; tags are a closed set
    Ok(Statement::new(
        format!(
            "MATCH (s:Individual {{run: $run, id: $source}}), (t:Individual {{run: $run, id: $target}}) \
             MERGE (s)-[r:{} {{run: $run, id: $id}}]->(t) \
             SET r.generation = $generation, r.attrs = $attrs",
            edge.tag.as_str()
        ),
        json!({
            "run": run,
            "id": edge.id.as_u64(),
            "source": edge.source.as_u64(),
            "target": edge.target.as_u64(),
            "generation": edge.generation,
            "attrs": serde_json::to_string(&edge.attrs)?,
        }),
    ))
}

pub(crate) fn set_property_statement(run: &str, id: NodeId, key: &str, value: Value) -> Statement {
    Statement::new(
        format!(
            "MATCH (n:Individual {{run: $run, id: $id}}) SET n.{} = $value RETURN count(n)",
            key
        ),
        json!({ "run": run, "id": id.as_u64(), "value": value }),
    )
}

pub(crate) fn find_by_gene_statement(
    run: &str,
    gene: &PropertyValue,
    before: Option<NodeId>,
) -> Statement {
    let bound = before.map_or(i64::MAX as u64, |id| id.as_u64());
    Statement::new(
        "MATCH (n:Individual {run: $run, gene_key: $gene_key}) WHERE n.id < $before \
         RETURN n.id ORDER BY n.generation DESC, n.id DESC LIMIT 1",
        json!({ "run": run, "gene_key": gene_key(gene), "before": bound }),
    )
}

/// Connection to a Neo4j database
pub struct CypherSession {
    client: reqwest::blocking::Client,
    config: CypherConfig,
    closed: AtomicBool,
}

impl CypherSession {
    /// Build the client and make sure the lookup indexes exist
    pub fn connect(config: CypherConfig) -> LineageResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let session = Self {
            client,
            config,
            closed: AtomicBool::new(false),
        };
        session.run(vec![
            Statement::new(
                "CREATE INDEX individual_run_id IF NOT EXISTS FOR (n:Individual) ON (n.run, n.id)",
                json!({}),
            ),
            Statement::new(
                "CREATE INDEX individual_run_gene IF NOT EXISTS FOR (n:Individual) ON (n.run, n.gene_key)",
                json!({}),
            ),
        ])?;
        tracing::info!(endpoint = %session.config.commit_endpoint(), "cypher session open");
        Ok(session)
    }

    pub fn config(&self) -> &CypherConfig {
        &self.config
    }

    fn run(&self, statements: Vec<Statement>) -> LineageResult<Vec<Vec<Vec<Value>>>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LineageError::Transport(format!(
                "session {} is closed",
                self.locator()
            )));
        }
        let resp = self
            .client
            .post(self.config.commit_endpoint())
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&json!({ "statements": statements }))
            .send()?;

        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(LineageError::Transport(format!(
                "neo4j responded {}: {}",
                status.as_u16(),
                body
            )));
        }
        parse_response(&body)
    }

    /// Run one statement and return its rows
    fn query(&self, statement: Statement) -> LineageResult<Vec<Vec<Value>>> {
        Ok(self.run(vec![statement])?.into_iter().next().unwrap_or_default())
    }

    fn first_row(&self, statement: Statement) -> LineageResult<Option<Vec<Value>>> {
        Ok(self.query(statement)?.into_iter().next())
    }

    fn scalar_u64(&self, statement: Statement) -> LineageResult<Option<u64>> {
        match self.first_row(statement)? {
            Some(row) if row.first().is_some_and(|v| !v.is_null()) => Ok(Some(column_u64(&row, 0)?)),
            _ => Ok(None),
        }
    }
}

impl GraphSession for CypherSession {
    fn merge_node(&self, run: &str, node: &NodeRecord) -> LineageResult<()> {
        self.query(merge_node_statement(run, node)?)?;
        Ok(())
    }

    fn merge_edge(&self, run: &str, edge: &EdgeRecord) -> LineageResult<()> {
        self.query(merge_edge_statement(run, edge)?)?;
        Ok(())
    }

    fn set_fitness(&self, run: &str, id: NodeId, fitness: &[f64]) -> LineageResult<bool> {
        let count = self.scalar_u64(set_property_statement(
            run,
            id,
            "fitness",
            json!(float_repr::vec_to_json(fitness)?),
        ))?;
        Ok(count.unwrap_or(0) > 0)
    }

    fn set_score(&self, run: &str, id: NodeId, score: f64) -> LineageResult<bool> {
        let count = self.scalar_u64(set_property_statement(
            run,
            id,
            "score",
            float_repr::to_value(score),
        ))?;
        Ok(count.unwrap_or(0) > 0)
    }

    fn fetch_node(&self, run: &str, id: NodeId) -> LineageResult<Option<NodeRecord>> {
        let row = self.first_row(Statement::new(
            "MATCH (n:Individual {run: $run, id: $id}) \
             RETURN n.id, n.gene, n.generation, n.fitness, n.score, n.attrs",
            json!({ "run": run, "id": id.as_u64() }),
        ))?;
        let Some(row) = row else {
            return Ok(None);
        };
        // fitness is a JSON string: Neo4j lists cannot mix numbers and
        // the markers of non-finite values
        let fitness = match row.get(3) {
            Some(Value::Null) | None => None,
            Some(_) => Some(float_repr::vec_from_json(column_str(&row, 3)?)?),
        };
        let score = match row.get(4) {
            Some(Value::Null) | None => None,
            Some(value) => Some(float_repr::from_value(value.clone())?),
        };
        Ok(Some(NodeRecord {
            id: NodeId::new(column_u64(&row, 0)?),
            gene: serde_json::from_str(column_str(&row, 1)?)?,
            generation: column_u64(&row, 2)? as u32,
            fitness,
            score,
            attrs: serde_json::from_str(column_str(&row, 5)?)?,
        }))
    }

    fn fetch_edge(&self, run: &str, id: EdgeId) -> LineageResult<Option<EdgeRecord>> {
        let row = self.first_row(Statement::new(
            "MATCH (s:Individual)-[r {run: $run, id: $id}]->(t:Individual) \
             RETURN r.id, type(r), s.id, t.id, r.generation, r.attrs",
            json!({ "run": run, "id": id.as_u64() }),
        ))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let tag = column_str(&row, 1)?;
        let tag = EdgeTag::parse(tag)
            .ok_or_else(|| LineageError::Format(format!("unknown edge tag `{}`", tag)))?;
        Ok(Some(EdgeRecord {
            id: EdgeId::new(column_u64(&row, 0)?),
            tag,
            source: NodeId::new(column_u64(&row, 2)?),
            target: NodeId::new(column_u64(&row, 3)?),
            generation: column_u64(&row, 4)? as u32,
            attrs: serde_json::from_str(column_str(&row, 5)?)?,
        }))
    }

    fn contains_node(&self, run: &str, id: NodeId) -> LineageResult<bool> {
        let count = self.scalar_u64(Statement::new(
            "MATCH (n:Individual {run: $run, id: $id}) RETURN count(n)",
            json!({ "run": run, "id": id.as_u64() }),
        ))?;
        Ok(count.unwrap_or(0) > 0)
    }

    fn find_by_gene(
        &self,
        run: &str,
        gene: &PropertyValue,
        before: Option<NodeId>,
    ) -> LineageResult<Option<NodeId>> {
        Ok(self
            .scalar_u64(find_by_gene_statement(run, gene, before))?
            .map(NodeId::new))
    }

    fn out_targets(&self, run: &str, tag: EdgeTag, source: NodeId) -> LineageResult<Vec<NodeId>> {
        let rows = self.query(Statement::new(
            format!(
                "MATCH (s:Individual {{run: $run, id: $source}})-[r:{} {{run: $run}}]->(t:Individual) \
                 RETURN t.id ORDER BY r.id DESC",
                tag.as_str()
            ),
            json!({ "run": run, "source": source.as_u64() }),
        ))?;
        rows.iter()
            .map(|row| column_u64(row, 0).map(NodeId::new))
            .collect()
    }

    fn count_nodes(&self, run: &str) -> LineageResult<usize> {
        let count = self.scalar_u64(Statement::new(
            "MATCH (n:Individual {run: $run}) RETURN count(n)",
            json!({ "run": run }),
        ))?;
        Ok(count.unwrap_or(0) as usize)
    }

    fn count_edges(&self, run: &str) -> LineageResult<usize> {
        let count = self.scalar_u64(Statement::new(
            "MATCH (:Individual)-[r {run: $run}]->(:Individual) RETURN count(r)",
            json!({ "run": run }),
        ))?;
        Ok(count.unwrap_or(0) as usize)
    }

    fn max_node_id(&self, run: &str) -> LineageResult<Option<NodeId>> {
        Ok(self
            .scalar_u64(Statement::new(
                "MATCH (n:Individual {run: $run}) RETURN max(n.id)",
                json!({ "run": run }),
            ))?
            .map(NodeId::new))
    }

    fn max_edge_id(&self, run: &str) -> LineageResult<Option<EdgeId>> {
        Ok(self
            .scalar_u64(Statement::new(
                "MATCH (:Individual)-[r {run: $run}]->(:Individual) RETURN max(r.id)",
                json!({ "run": run }),
            ))?
            .map(EdgeId::new))
    }

    fn close(&self) -> LineageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn locator(&self) -> String {
        format!(
            "{}/db/{}",
            self.config.url.trim_end_matches('/'),
            self.config.database
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Attributes;

    #[test]
    fn node_statement_keeps_non_finite_evaluation() {
        let mut node = NodeRecord::new(NodeId::new(1), PropertyValue::from(vec![true]), 0);
        node.fitness = Some(vec![f64::NAN, 2.0]);
        node.score = Some(f64::INFINITY);
        let statement = merge_node_statement("run", &node).unwrap();
        assert_eq!(statement.parameters["fitness"], json!("[\"NaN\",2.0]"));
        assert_eq!(statement.parameters["score"], json!("inf"));
    }

    #[test]
    fn commit_endpoint_joins_url() {
        let config = CypherConfig {
            url: "http://db.local:7474/".into(),
            database: "lineage".into(),
            ..Default::default()
        };
        assert_eq!(
            config.commit_endpoint(),
            "http://db.local:7474/db/lineage/tx/commit"
        );
    }

    #[test]
    fn node_statement_stores_gene_as_json() {
        let node = NodeRecord::new(NodeId::new(4), PropertyValue::from(vec![true, false]), 2);
        let statement = merge_node_statement("seed-7", &node).unwrap();
        assert!(statement.statement.starts_with("MERGE (n:Individual"));
        assert_eq!(statement.parameters["gene"], json!("[true,false]"));
        assert_eq!(statement.parameters["gene_key"], json!("[true, false]"));
        assert_eq!(statement.parameters["id"], json!(4));
        assert_eq!(statement.parameters["fitness"], Value::Null);
    }

    #[test]
    fn edge_statement_uses_tag_as_type() {
        let mut attrs = Attributes::new();
        attrs.insert("generation".into(), PropertyValue::Int(3));
        let edge = EdgeRecord::from_attrs(
            EdgeId::new(1),
            EdgeTag::Mirror,
            NodeId::new(0),
            NodeId::new(2),
            Some(&attrs),
        )
        .unwrap();
        let statement = merge_edge_statement("run", &edge).unwrap();
        assert!(statement.statement.contains("[r:MIRROR {run: $run, id: $id}]"));
        assert_eq!(statement.parameters["generation"], json!(3));
        assert_eq!(statement.parameters["attrs"], json!("{}"));
    }

    #[test]
    fn unbounded_gene_lookup_uses_max_id() {
        let statement = find_by_gene_statement("run", &PropertyValue::from(vec![1, 0]), None);
        assert_eq!(statement.parameters["before"], json!(i64::MAX));
        let statement =
            find_by_gene_statement("run", &PropertyValue::from(vec![1, 0]), Some(NodeId::new(9)));
        assert_eq!(statement.parameters["before"], json!(9));
    }

    #[test]
    fn response_rows_are_extracted() {
        let body = r#"{"results":[{"columns":["count(n)"],"data":[{"row":[2],"meta":[null]}]}],"errors":[]}"#;
        let results = parse_response(body).unwrap();
        assert_eq!(results[0][0], vec![json!(2)]);
    }

    #[test]
    fn server_errors_become_transport_errors() {
        let body = r#"{"results":[],"errors":[{"code":"Neo.ClientError.Security.Unauthorized","message":"bad credentials"}]}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, LineageError::Transport(msg) if msg.contains("Unauthorized")));
    }

    #[test]
    fn unreachable_server_is_transport_error() {
        let config = CypherConfig {
            url: "http://127.0.0.1:1".into(),
            timeout_secs: 2,
            ..Default::default()
        };
        assert!(matches!(
            CypherSession::connect(config),
            Err(LineageError::Transport(_))
        ));
    }
}
