//! Run configuration
//!
//! A run is described in YAML:
//!
//! ```yaml
//! run:
//!   name: onemax
//!   seed: 42
//! output_dir: graphs
//! backend:
//!   kind: memory
//!   format: gml
//! ```
//!
//! `backend.kind` is one of `null`, `memory`, `sqlite`, `cypher` or
//! `stream`; the remaining backend keys depend on the kind. YAML reads a
//! bare `null` as the null value, so write `kind: "null"`.

use crate::adapter::{
    GraphConfig, GraphDbAdapter, GraphFormat, NullAdapter, PropertyGraphAdapter,
    DEFAULT_OUTPUT_DIR,
};
use crate::graph::{LineageError, LineageResult, Schema};
use crate::storage::{CypherConfig, CypherSession, OpenSession, SqliteSession};
use crate::tracker::{GephiConfig, GephiTransport, HubConfig, LineageTracker, Tracker, TrackerHub};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default SQLite database: `<data dir>/evotrace/lineage.db`
pub fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("evotrace").join("lineage.db")
}

/// Identity of a tracked run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// Run name; file stem of saved graphs
    pub name: String,
    /// Seed of the EA's random generator
    pub seed: Option<u64>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            name: "evotrace".into(),
            seed: None,
        }
    }
}

/// Backend selection, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Ids only, nothing stored
    Null,
    /// In-memory property graph saved to `output_dir`
    Memory {
        #[serde(default)]
        format: GraphFormat,
        #[serde(default)]
        node_schema: Option<Schema>,
        #[serde(default)]
        edge_schema: Option<Schema>,
    },
    /// Embedded SQLite database
    Sqlite {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Neo4j over HTTP
    Cypher {
        #[serde(flatten)]
        connection: CypherConfig,
    },
    /// Gephi graph streaming
    Stream {
        #[serde(flatten)]
        gephi: GephiConfig,
        #[serde(default)]
        extent: Option<f64>,
        #[serde(default)]
        node_size: Option<f64>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Memory {
            format: GraphFormat::default(),
            node_schema: None,
            edge_schema: None,
        }
    }
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Memory { .. } => "memory",
            Self::Sqlite { .. } => "sqlite",
            Self::Cypher { .. } => "cypher",
            Self::Stream { .. } => "stream",
        }
    }
}

/// Top-level run configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub run: RunSection,
    pub output_dir: Option<PathBuf>,
    pub backend: BackendConfig,
}

impl RunConfig {
    pub fn from_yaml_str(text: &str) -> LineageResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> LineageResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> LineageResult<()> {
        let name = &self.run.name;
        if name.is_empty() {
            return Err(LineageError::Config("run.name must not be empty".into()));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(LineageError::Config(format!(
                "run.name `{}` cannot be used as a file name",
                name
            )));
        }
        if let Some(hub) = self.hub_config() {
            hub.validate()?;
        }
        Ok(())
    }

    /// Layout of the stream backend, defaults filled in
    pub fn hub_config(&self) -> Option<HubConfig> {
        let BackendConfig::Stream {
            extent, node_size, ..
        } = &self.backend
        else {
            return None;
        };
        let defaults = HubConfig::default();
        Some(HubConfig {
            extent: extent.unwrap_or(defaults.extent),
            node_size: node_size.unwrap_or(defaults.node_size),
            seed: self.run.seed,
        })
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    /// Label that keys the run in shared databases: `name` or `name-seed`
    pub fn run_label(&self) -> String {
        match self.run.seed {
            Some(seed) => format!("{}-{}", self.run.name, seed),
            None => self.run.name.clone(),
        }
    }

    /// Open the configured backend behind a tracker
    pub fn open_tracker(&self) -> LineageResult<Box<dyn LineageTracker>> {
        tracing::info!(
            run = %self.run.name,
            backend = self.backend.kind(),
            "opening tracker"
        );
        let tracker: Box<dyn LineageTracker> = match &self.backend {
            BackendConfig::Null => Box::new(Tracker::new(NullAdapter::new())),
            BackendConfig::Memory {
                format,
                node_schema,
                edge_schema,
            } => {
                let mut graph = GraphConfig::new(self.run.name.clone())
                    .with_format(*format)
                    .with_output_dir(self.output_dir());
                if let Some(seed) = self.run.seed {
                    graph = graph.with_seed(seed);
                }
                if let Some(schema) = node_schema {
                    graph = graph.with_node_schema(schema.clone());
                }
                if let Some(schema) = edge_schema {
                    graph = graph.with_edge_schema(schema.clone());
                }
                Box::new(Tracker::new(PropertyGraphAdapter::new(graph)?))
            }
            BackendConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(default_db_path);
                let session = SqliteSession::open(&path)?;
                Box::new(Tracker::new(GraphDbAdapter::new(session, self.run_label())?))
            }
            BackendConfig::Cypher { connection } => {
                let session = CypherSession::connect(connection.clone())?;
                Box::new(Tracker::new(GraphDbAdapter::new(session, self.run_label())?))
            }
            BackendConfig::Stream { gephi, .. } => {
                let hub = self.hub_config().unwrap_or_default();
                let transport = GephiTransport::new(gephi)?;
                Box::new(TrackerHub::with_config(Box::new(transport), hub)?)
            }
        };
        Ok(tracker)
    }
}
