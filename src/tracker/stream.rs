//! Streaming transports for the tracker hub
//!
//! Events follow the Gephi graph-streaming JSON vocabulary: `an` adds a
//! node, `cn` changes node attributes, `ae` adds an edge.

use crate::graph::{Attributes, LineageError, LineageResult, PropertyValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Mutex;
use std::time::Duration;

/// One graph mutation pushed to a visualization service
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    AddNode {
        id: String,
        attrs: Attributes,
    },
    ChangeNode {
        id: String,
        attrs: Attributes,
    },
    AddEdge {
        id: String,
        source: String,
        target: String,
        directed: bool,
        attrs: Attributes,
    },
}

fn scalar_json(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Str(s) => json!(s),
        PropertyValue::Int(i) => json!(i),
        PropertyValue::Float(f) => json!(f),
        PropertyValue::Bool(b) => json!(b),
        nested => json!(nested.compact()),
    }
}

fn attrs_json(attrs: &Attributes) -> Map<String, Value> {
    attrs
        .iter()
        .map(|(key, value)| (key.clone(), scalar_json(value)))
        .collect()
}

impl StreamEvent {
    /// Gephi event name (`an`, `cn`, `ae`)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddNode { .. } => "an",
            Self::ChangeNode { .. } => "cn",
            Self::AddEdge { .. } => "ae",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::AddNode { id, .. } | Self::ChangeNode { id, .. } | Self::AddEdge { id, .. } => id,
        }
    }

    /// Encode as a Gephi streaming event. Lists and maps become compact
    /// strings since Gephi attributes are scalar.
    pub fn to_json(&self) -> Value {
        let body = match self {
            Self::AddNode { attrs, .. } | Self::ChangeNode { attrs, .. } => attrs_json(attrs),
            Self::AddEdge {
                source,
                target,
                directed,
                attrs,
                ..
            } => {
                let mut body = attrs_json(attrs);
                body.insert("source".into(), json!(source));
                body.insert("target".into(), json!(target));
                body.insert("directed".into(), json!(directed));
                body
            }
        };
        let mut inner = Map::new();
        inner.insert(self.id().to_string(), Value::Object(body));
        let mut outer = Map::new();
        outer.insert(self.kind().to_string(), Value::Object(inner));
        Value::Object(outer)
    }
}

/// Push channel to a visualization service
pub trait StreamTransport: Send + Sync {
    fn send(&self, event: &StreamEvent) -> LineageResult<()>;

    /// Where events go, for logs and `save()`
    fn locator(&self) -> String;
}

/// Settings for [`GephiTransport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GephiConfig {
    /// Base URL of the Gephi streaming plugin
    pub url: String,
    pub workspace: String,
    pub timeout_secs: u64,
}

impl Default for GephiConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".into(),
            workspace: "workspace1".into(),
            timeout_secs: 5,
        }
    }
}

impl GephiConfig {
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}?operation=updateGraph",
            self.url.trim_end_matches('/'),
            self.workspace
        )
    }
}

/// Gephi graph-streaming REST client
pub struct GephiTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl GephiTransport {
    pub fn new(config: &GephiConfig) -> LineageResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint(),
        })
    }
}

impl StreamTransport for GephiTransport {
    fn send(&self, event: &StreamEvent) -> LineageResult<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .body(event.to_json().to_string())
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LineageError::Transport(format!(
                "gephi responded {} to {} {}",
                status.as_u16(),
                event.kind(),
                event.id()
            )));
        }
        Ok(())
    }

    fn locator(&self) -> String {
        self.endpoint.clone()
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingTransport {
    events: Mutex<Vec<StreamEvent>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StreamTransport for RecordingTransport {
    fn send(&self, event: &StreamEvent) -> LineageResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn locator(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_node_encoding() {
        let mut attrs = Attributes::new();
        attrs.insert("label".into(), "3".into());
        attrs.insert("gene".into(), PropertyValue::from(vec![1, 0]));
        attrs.insert("size".into(), PropertyValue::Float(20.0));
        let event = StreamEvent::AddNode {
            id: "3".into(),
            attrs,
        };
        assert_eq!(
            event.to_json(),
            json!({"an": {"3": {"label": "3", "gene": "[1, 0]", "size": 20.0}}})
        );
    }

    #[test]
    fn add_edge_encoding() {
        let mut attrs = Attributes::new();
        attrs.insert("generation".into(), PropertyValue::Int(2));
        let event = StreamEvent::AddEdge {
            id: "5>1".into(),
            source: "1".into(),
            target: "5".into(),
            directed: true,
            attrs,
        };
        assert_eq!(
            event.to_json(),
            json!({"ae": {"5>1": {"source": "1", "target": "5", "directed": true, "generation": 2}}})
        );
    }

    #[test]
    fn endpoint_includes_workspace() {
        let config = GephiConfig {
            url: "http://gephi:8080/".into(),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint(),
            "http://gephi:8080/workspace1?operation=updateGraph"
        );
    }

    #[test]
    fn unreachable_gephi_is_transport_error() {
        let transport = GephiTransport::new(&GephiConfig {
            url: "http://127.0.0.1:1".into(),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();
        let event = StreamEvent::ChangeNode {
            id: "0".into(),
            attrs: Attributes::new(),
        };
        assert!(matches!(
            transport.send(&event),
            Err(LineageError::Transport(_))
        ));
    }
}
