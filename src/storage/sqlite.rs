//! SQLite session for lineage graphs

use super::traits::{gene_key, GraphSession, OpenSession};
use crate::graph::{
    float_repr, EdgeId, EdgeRecord, EdgeTag, LineageError, LineageResult, NodeId, NodeRecord,
    PropertyValue,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed graph session
///
/// Individuals and lineage edges of every run share two tables, keyed by
/// `(run, id)`. Thread-safe via internal mutex on the connection; the
/// connection is dropped on `close()`.
pub struct SqliteSession {
    conn: Mutex<Option<Connection>>,
    locator: String,
}

impl SqliteSession {
    fn init_schema(conn: &Connection) -> LineageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS individuals (
                run TEXT NOT NULL,
                id INTEGER NOT NULL,
                gene_json TEXT NOT NULL,
                gene_key TEXT NOT NULL,
                generation INTEGER NOT NULL,
                fitness_json TEXT,
                score_json TEXT,
                attrs_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (run, id)
            );

            CREATE INDEX IF NOT EXISTS idx_individuals_gene
                ON individuals(run, gene_key);

            CREATE TABLE IF NOT EXISTS lineage (
                run TEXT NOT NULL,
                id INTEGER NOT NULL,
                tag TEXT NOT NULL,
                source_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                generation INTEGER NOT NULL,
                attrs_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (run, id)
            );

            CREATE INDEX IF NOT EXISTS idx_lineage_source
                ON lineage(run, source_id, tag);

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> LineageResult<T>) -> LineageResult<T> {
        let guard: MutexGuard<'_, Option<Connection>> = self.conn.lock().unwrap();
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(LineageError::Transport(format!(
                "session {} is closed",
                self.locator
            ))),
        }
    }

    fn row_to_node(
        id: i64,
        gene_json: String,
        generation: i64,
        fitness_json: Option<String>,
        score_json: Option<String>,
        attrs_json: String,
    ) -> LineageResult<NodeRecord> {
        let fitness = fitness_json
            .map(|json| float_repr::vec_from_json(&json))
            .transpose()?;
        let score = score_json
            .map(|json| float_repr::from_json(&json))
            .transpose()?;
        Ok(NodeRecord {
            id: NodeId::new(id as u64),
            gene: serde_json::from_str(&gene_json)?,
            generation: generation as u32,
            fitness,
            score,
            attrs: serde_json::from_str(&attrs_json)?,
        })
    }

    fn row_to_edge(
        id: i64,
        tag: String,
        source_id: i64,
        target_id: i64,
        generation: i64,
        attrs_json: String,
    ) -> LineageResult<EdgeRecord> {
        let tag = EdgeTag::parse(&tag)
            .ok_or_else(|| LineageError::Format(format!("unknown edge tag `{}`", tag)))?;
        Ok(EdgeRecord {
            id: EdgeId::new(id as u64),
            tag,
            source: NodeId::new(source_id as u64),
            target: NodeId::new(target_id as u64),
            generation: generation as u32,
            attrs: serde_json::from_str(&attrs_json)?,
        })
    }
}

impl OpenSession for SqliteSession {
    fn open(path: impl AsRef<Path>) -> LineageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            locator: path.display().to_string(),
        })
    }

    fn open_in_memory() -> LineageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            locator: ":memory:".to_string(),
        })
    }
}

impl GraphSession for SqliteSession {
    fn merge_node(&self, run: &str, node: &NodeRecord) -> LineageResult<()> {
        let gene_json = serde_json::to_string(&node.gene)?;
        let attrs_json = serde_json::to_string(&node.attrs)?;
        let fitness_json = node
            .fitness
            .as_ref()
            .map(|fitness| float_repr::vec_to_json(fitness))
            .transpose()?;
        let score_json = node.score.map(float_repr::to_json).transpose()?;

        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO individuals
                    (run, id, gene_json, gene_key, generation, fitness_json, score_json, attrs_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(run, id) DO UPDATE SET
                    gene_json = excluded.gene_json,
                    gene_key = excluded.gene_key,
                    generation = excluded.generation,
                    attrs_json = excluded.attrs_json
                "#,
                params![
                    run,
                    node.id.as_u64() as i64,
                    gene_json,
                    gene_key(&node.gene),
                    node.generation as i64,
                    fitness_json,
                    score_json,
                    attrs_json,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    fn merge_edge(&self, run: &str, edge: &EdgeRecord) -> LineageResult<()> {
        let attrs_json = serde_json::to_string(&edge.attrs)?;

        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO lineage
                    (run, id, tag, source_id, target_id, generation, attrs_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(run, id) DO UPDATE SET
                    tag = excluded.tag,
                    source_id = excluded.source_id,
                    target_id = excluded.target_id,
                    generation = excluded.generation,
                    attrs_json = excluded.attrs_json
                "#,
                params![
                    run,
                    edge.id.as_u64() as i64,
                    edge.tag.as_str(),
                    edge.source.as_u64() as i64,
                    edge.target.as_u64() as i64,
                    edge.generation as i64,
                    attrs_json,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    fn set_fitness(&self, run: &str, id: NodeId, fitness: &[f64]) -> LineageResult<bool> {
        let fitness_json = float_repr::vec_to_json(fitness)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE individuals SET fitness_json = ?3 WHERE run = ?1 AND id = ?2",
                params![run, id.as_u64() as i64, fitness_json],
            )?;
            Ok(changed > 0)
        })
    }

    fn set_score(&self, run: &str, id: NodeId, score: f64) -> LineageResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE individuals SET score_json = ?3 WHERE run = ?1 AND id = ?2",
                params![run, id.as_u64() as i64, float_repr::to_json(score)?],
            )?;
            Ok(changed > 0)
        })
    }

    fn fetch_node(&self, run: &str, id: NodeId) -> LineageResult<Option<NodeRecord>> {
        #[allow(clippy::type_complexity)]
        let row: Option<(i64, String, i64, Option<String>, Option<String>, String)> =
            self.with_conn(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, gene_json, generation, fitness_json, score_json, attrs_json
                         FROM individuals WHERE run = ?1 AND id = ?2",
                        params![run, id.as_u64() as i64],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                            ))
                        },
                    )
                    .optional()?)
            })?;

        match row {
            Some((id, gene, generation, fitness, score, attrs)) => {
                Ok(Some(Self::row_to_node(id, gene, generation, fitness, score, attrs)?))
            }
            None => Ok(None),
        }
    }

    fn fetch_edge(&self, run: &str, id: EdgeId) -> LineageResult<Option<EdgeRecord>> {
        let row: Option<(i64, String, i64, i64, i64, String)> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, tag, source_id, target_id, generation, attrs_json
                     FROM lineage WHERE run = ?1 AND id = ?2",
                    params![run, id.as_u64() as i64],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )
                .optional()?)
        })?;

        match row {
            Some((id, tag, source, target, generation, attrs)) => {
                Ok(Some(Self::row_to_edge(id, tag, source, target, generation, attrs)?))
            }
            None => Ok(None),
        }
    }

    fn contains_node(&self, run: &str, id: NodeId) -> LineageResult<bool> {
        self.with_conn(|conn| {
            let found: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM individuals WHERE run = ?1 AND id = ?2",
                params![run, id.as_u64() as i64],
                |row| row.get(0),
            )?;
            Ok(found)
        })
    }

    fn find_by_gene(
        &self,
        run: &str,
        gene: &PropertyValue,
        before: Option<NodeId>,
    ) -> LineageResult<Option<NodeId>> {
        let bound = before.map_or(i64::MAX, |id| id.as_u64() as i64);
        self.with_conn(|conn| {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM individuals
                     WHERE run = ?1 AND gene_key = ?2 AND id < ?3
                     ORDER BY generation DESC, id DESC
                     LIMIT 1",
                    params![run, gene_key(gene), bound],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id.map(|id| NodeId::new(id as u64)))
        })
    }

    fn out_targets(&self, run: &str, tag: EdgeTag, source: NodeId) -> LineageResult<Vec<NodeId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT target_id FROM lineage
                 WHERE run = ?1 AND source_id = ?2 AND tag = ?3
                 ORDER BY id DESC",
            )?;
            let targets = stmt
                .query_map(params![run, source.as_u64() as i64, tag.as_str()], |row| {
                    row.get::<_, i64>(0)
                })?
                .map(|id| id.map(|id| NodeId::new(id as u64)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(targets)
        })
    }

    fn count_nodes(&self, run: &str) -> LineageResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM individuals WHERE run = ?1",
                params![run],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    fn count_edges(&self, run: &str) -> LineageResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM lineage WHERE run = ?1",
                params![run],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    fn max_node_id(&self, run: &str) -> LineageResult<Option<NodeId>> {
        self.with_conn(|conn| {
            let max: Option<i64> = conn.query_row(
                "SELECT MAX(id) FROM individuals WHERE run = ?1",
                params![run],
                |row| row.get(0),
            )?;
            Ok(max.map(|id| NodeId::new(id as u64)))
        })
    }

    fn max_edge_id(&self, run: &str) -> LineageResult<Option<EdgeId>> {
        self.with_conn(|conn| {
            let max: Option<i64> = conn.query_row(
                "SELECT MAX(id) FROM lineage WHERE run = ?1",
                params![run],
                |row| row.get(0),
            )?;
            Ok(max.map(|id| EdgeId::new(id as u64)))
        })
    }

    fn close(&self) -> LineageResult<()> {
        let mut guard = self.conn.lock().unwrap();
        if let Some(conn) = guard.take() {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
            conn.close().map_err(|(_, err)| LineageError::Database(err))?;
        }
        Ok(())
    }

    fn locator(&self) -> String {
        self.locator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Attributes;
    use tempfile::TempDir;

    fn create_test_session() -> SqliteSession {
        SqliteSession::open_in_memory().unwrap()
    }

    fn create_test_node(id: u64, gene: &[bool], generation: u32) -> NodeRecord {
        NodeRecord::new(NodeId::new(id), PropertyValue::from(gene.to_vec()), generation)
    }

    fn create_test_edge(id: u64, tag: EdgeTag, source: u64, target: u64) -> EdgeRecord {
        EdgeRecord::from_attrs(
            EdgeId::new(id),
            tag,
            NodeId::new(source),
            NodeId::new(target),
            None,
        )
        .unwrap()
    }

    #[test]
    fn merge_node_is_idempotent() {
        let session = create_test_session();
        let node = create_test_node(0, &[true, false], 0);
        session.merge_node("run", &node).unwrap();
        session.merge_node("run", &node).unwrap();
        assert_eq!(session.count_nodes("run").unwrap(), 1);
        assert_eq!(session.fetch_node("run", node.id).unwrap(), Some(node));
    }

    #[test]
    fn merge_keeps_evaluation() {
        let session = create_test_session();
        let node = create_test_node(0, &[true], 0);
        session.merge_node("run", &node).unwrap();
        assert!(session.set_fitness("run", node.id, &[4.0, 1.5]).unwrap());
        assert!(session.set_score("run", node.id, 4.0).unwrap());

        let mut attrs = Attributes::new();
        attrs.insert("operator".into(), "mutate".into());
        session
            .merge_node("run", &node.clone().with_attrs(attrs))
            .unwrap();

        let stored = session.fetch_node("run", node.id).unwrap().unwrap();
        assert_eq!(stored.fitness, Some(vec![4.0, 1.5]));
        assert_eq!(stored.score, Some(4.0));
        assert_eq!(stored.attrs.len(), 1);
    }

    #[test]
    fn non_finite_evaluation_is_stored_exactly() {
        let session = create_test_session();
        let node = create_test_node(0, &[true], 0);
        session.merge_node("run", &node).unwrap();
        session
            .set_fitness("run", node.id, &[f64::NAN, f64::INFINITY, 1.0])
            .unwrap();
        session.set_score("run", node.id, f64::NAN).unwrap();

        let stored = session.fetch_node("run", node.id).unwrap().unwrap();
        let fitness = stored.fitness.unwrap();
        assert!(fitness[0].is_nan());
        assert_eq!(&fitness[1..], &[f64::INFINITY, 1.0]);
        assert!(stored.score.unwrap().is_nan());

        let mut evaluated = create_test_node(1, &[false], 0);
        evaluated.score = Some(f64::NEG_INFINITY);
        session.merge_node("run", &evaluated).unwrap();
        let stored = session.fetch_node("run", evaluated.id).unwrap().unwrap();
        assert_eq!(stored.score, Some(f64::NEG_INFINITY));
    }

    #[test]
    fn updates_on_missing_rows_report_false() {
        let session = create_test_session();
        assert!(!session.set_fitness("run", NodeId::new(3), &[1.0]).unwrap());
        assert!(!session.set_score("run", NodeId::new(3), 1.0).unwrap());
    }

    #[test]
    fn runs_are_isolated() {
        let session = create_test_session();
        session.merge_node("a", &create_test_node(0, &[true], 0)).unwrap();
        session.merge_node("a", &create_test_node(1, &[true], 0)).unwrap();
        session.merge_node("b", &create_test_node(0, &[true], 0)).unwrap();

        assert_eq!(session.count_nodes("a").unwrap(), 2);
        assert_eq!(session.count_nodes("b").unwrap(), 1);
        assert_eq!(session.max_node_id("a").unwrap(), Some(NodeId::new(1)));
        assert_eq!(session.max_node_id("c").unwrap(), None);
    }

    #[test]
    fn find_by_gene_orders_by_generation_then_id() {
        let session = create_test_session();
        session.merge_node("run", &create_test_node(0, &[true, true], 2)).unwrap();
        session.merge_node("run", &create_test_node(1, &[true, true], 1)).unwrap();
        session.merge_node("run", &create_test_node(2, &[false, true], 5)).unwrap();

        let gene = PropertyValue::from(vec![true, true]);
        assert_eq!(session.find_by_gene("run", &gene, None).unwrap(), Some(NodeId::new(0)));
        assert_eq!(
            session.find_by_gene("run", &gene, Some(NodeId::new(0))).unwrap(),
            None
        );
    }

    #[test]
    fn out_targets_newest_first() {
        let session = create_test_session();
        for id in 0..3 {
            session.merge_node("run", &create_test_node(id, &[true], 0)).unwrap();
        }
        session.merge_edge("run", &create_test_edge(0, EdgeTag::Mirror, 0, 1)).unwrap();
        session.merge_edge("run", &create_test_edge(1, EdgeTag::ParentOf, 0, 2)).unwrap();
        session.merge_edge("run", &create_test_edge(2, EdgeTag::Mirror, 0, 2)).unwrap();

        let targets = session.out_targets("run", EdgeTag::Mirror, NodeId::new(0)).unwrap();
        assert_eq!(targets, vec![NodeId::new(2), NodeId::new(1)]);
        assert_eq!(
            session.fetch_edge("run", EdgeId::new(1)).unwrap().unwrap().tag,
            EdgeTag::ParentOf
        );
    }

    #[test]
    fn closed_session_rejects_work() {
        let session = create_test_session();
        session.close().unwrap();
        session.close().unwrap();
        assert!(matches!(
            session.count_nodes("run"),
            Err(LineageError::Transport(_))
        ));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("lineage.db");
        {
            let session = SqliteSession::open(&path).unwrap();
            session.merge_node("run", &create_test_node(7, &[true], 3)).unwrap();
            session.close().unwrap();
        }
        let session = SqliteSession::open(&path).unwrap();
        assert_eq!(session.max_node_id("run").unwrap(), Some(NodeId::new(7)));
        assert_eq!(session.locator(), path.display().to_string());
    }
}
