//! Graph-database sessions
//!
//! `GraphDbAdapter` talks to a database through the `GraphSession` trait.
//! `SqliteSession` is the embedded implementation; `CypherSession` speaks
//! to a Neo4j server over HTTP.

mod cypher;
mod sqlite;
mod traits;

pub use cypher::{CypherConfig, CypherSession};
pub use sqlite::SqliteSession;
pub use traits::{gene_key, GraphSession, OpenSession};
