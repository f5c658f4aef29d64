//! GML reader and writer for saved lineage graphs
//!
//! Scalars are written natively; vector properties are written as quoted,
//! comma-separated strings (`gene "1, 0, 1"`), the way graph-tool does.
//! The node and edge schemas are embedded in the graph header so a file can
//! be decoded without outside information.

use super::memory::{GraphMetadata, GraphSnapshot};
use crate::graph::schema::{FITNESS_KEY, GENE_KEY, LABEL_KEY, SCORE_KEY};
use crate::graph::{
    Attributes, EdgeId, EdgeRecord, EdgeTag, LineageError, LineageResult, NodeId, NodeRecord,
    PropertyType, PropertyValue, Schema, GENERATION_KEY,
};
use std::fmt::Write as _;

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Render a snapshot as GML text
pub fn write_gml(snapshot: &GraphSnapshot) -> LineageResult<String> {
    let mut out = String::new();
    let meta = &snapshot.metadata;
    out.push_str("graph [\n");
    out.push_str("  directed 1\n");
    line(&mut out, 1, "name", &quote(&meta.name));
    if let Some(seed) = &meta.seed {
        line(&mut out, 1, "seed", &quote(seed));
    }
    line(&mut out, 1, "run_id", &quote(&meta.run_id.to_string()));
    if let Some(saved_at) = &meta.saved_at {
        line(&mut out, 1, "saved_at", &quote(&saved_at.to_rfc3339()));
    }
    write_schema(&mut out, "node_schema", &snapshot.node_schema)?;
    write_schema(&mut out, "edge_schema", &snapshot.edge_schema)?;

    for node in &snapshot.nodes {
        write_node(&mut out, node, &snapshot.node_schema)?;
    }
    for edge in &snapshot.edges {
        write_edge(&mut out, edge, &snapshot.edge_schema)?;
    }
    out.push_str("]\n");
    Ok(out)
}

fn write_schema(out: &mut String, key: &str, schema: &Schema) -> LineageResult<()> {
    let _ = writeln!(out, "  {} [", key);
    for (name, ty) in schema.iter() {
        check_key(name)?;
        line(out, 2, name, &quote(ty.name()));
    }
    out.push_str("  ]\n");
    Ok(())
}

fn write_node(out: &mut String, node: &NodeRecord, schema: &Schema) -> LineageResult<()> {
    out.push_str("  node [\n");
    line(out, 2, "id", &node.id.to_string());
    typed_line(out, schema, GENE_KEY, &node.gene)?;
    typed_line(out, schema, GENERATION_KEY, &PropertyValue::from(node.generation))?;
    if let Some(fitness) = &node.fitness {
        typed_line(out, schema, FITNESS_KEY, &PropertyValue::from(fitness.clone()))?;
    }
    if let Some(score) = node.score {
        typed_line(out, schema, SCORE_KEY, &PropertyValue::Float(score))?;
    }
    for (key, value) in &node.attrs {
        typed_line(out, schema, key, value)?;
    }
    out.push_str("  ]\n");
    Ok(())
}

fn write_edge(out: &mut String, edge: &EdgeRecord, schema: &Schema) -> LineageResult<()> {
    out.push_str("  edge [\n");
    line(out, 2, "id", &edge.id.to_string());
    line(out, 2, "source", &edge.source.to_string());
    line(out, 2, "target", &edge.target.to_string());
    line(out, 2, LABEL_KEY, &quote(edge.tag.as_str()));
    typed_line(out, schema, GENERATION_KEY, &PropertyValue::from(edge.generation))?;
    for (key, value) in &edge.attrs {
        typed_line(out, schema, key, value)?;
    }
    out.push_str("  ]\n");
    Ok(())
}

fn line(out: &mut String, depth: usize, key: &str, value: &str) {
    let _ = writeln!(out, "{}{} {}", "  ".repeat(depth), key, value);
}

fn typed_line(out: &mut String, schema: &Schema, key: &str, value: &PropertyValue) -> LineageResult<()> {
    check_key(key)?;
    let ty = schema
        .get(key)
        .ok_or_else(|| LineageError::Format(format!("`{}` is missing from the schema", key)))?;
    let value = ty.coerce(key, value)?;
    line(out, 2, key, &encode(ty, &value));
    Ok(())
}

fn check_key(key: &str) -> LineageResult<()> {
    let mut chars = key.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LineageError::Format(format!("`{}` is not a valid GML key", key)))
    }
}

fn encode(ty: PropertyType, value: &PropertyValue) -> String {
    match (ty, value) {
        (PropertyType::StringVec, PropertyValue::List(items)) => {
            let strings: Vec<String> = items.iter().map(PropertyValue::compact).collect();
            quote(&serde_json::Value::from(strings).to_string())
        }
        (_, PropertyValue::List(items)) => {
            let parts: Vec<String> = items.iter().map(encode_scalar).collect();
            quote(&parts.join(", "))
        }
        (_, PropertyValue::Float(f)) if !f.is_finite() => quote(&f.to_string()),
        (_, PropertyValue::Str(s)) => quote(s),
        (_, scalar) => encode_scalar(scalar),
    }
}

fn encode_scalar(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        PropertyValue::Int(i) => i.to_string(),
        PropertyValue::Float(f) => format!("{:?}", f),
        other => other.compact(),
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('&', "&amp;").replace('"', "&quot;"))
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum GmlValue {
    Int(i64),
    Real(f64),
    Str(String),
    List(Vec<(String, GmlValue)>),
}

#[derive(Debug, PartialEq)]
enum Token {
    Key(String),
    Int(i64),
    Real(f64),
    Str(String),
    Open,
    Close,
}

fn tokenize(text: &str) -> LineageResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
        } else if ch == '#' {
            while let Some(c) = chars.next() {
                if c == '\n' {
                    break;
                }
            }
        } else if ch == '[' {
            chars.next();
            tokens.push(Token::Open);
        } else if ch == ']' {
            chars.next();
            tokens.push(Token::Close);
        } else if ch == '"' {
            chars.next();
            let mut raw = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(c) => raw.push(c),
                    None => return Err(LineageError::Format("unterminated string".into())),
                }
            }
            tokens.push(Token::Str(raw.replace("&quot;", "\"").replace("&amp;", "&")));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '[' || c == ']' || c == '"' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(classify(word)?);
        }
    }
    Ok(tokens)
}

fn classify(word: String) -> LineageResult<Token> {
    let first = word.chars().next().unwrap_or(' ');
    if first.is_ascii_alphabetic() || first == '_' {
        return Ok(Token::Key(word));
    }
    if let Ok(i) = word.parse::<i64>() {
        return Ok(Token::Int(i));
    }
    word.parse::<f64>()
        .map(Token::Real)
        .map_err(|_| LineageError::Format(format!("unexpected token `{}`", word)))
}

fn parse_list(
    tokens: &mut std::vec::IntoIter<Token>,
    nested: bool,
) -> LineageResult<Vec<(String, GmlValue)>> {
    let mut items = Vec::new();
    loop {
        let key = match tokens.next() {
            Some(Token::Key(key)) => key,
            Some(Token::Close) if nested => return Ok(items),
            None if !nested => return Ok(items),
            None => return Err(LineageError::Format("unbalanced brackets".into())),
            Some(other) => {
                return Err(LineageError::Format(format!("expected a key, found {:?}", other)))
            }
        };
        let value = match tokens.next() {
            Some(Token::Int(i)) => GmlValue::Int(i),
            Some(Token::Real(f)) => GmlValue::Real(f),
            Some(Token::Str(s)) => GmlValue::Str(s),
            Some(Token::Open) => GmlValue::List(parse_list(tokens, true)?),
            _ => return Err(LineageError::Format(format!("`{}` has no value", key))),
        };
        items.push((key, value));
    }
}

/// Parse GML text written by [`write_gml`]
pub fn read_gml(text: &str) -> LineageResult<GraphSnapshot> {
    let mut tokens = tokenize(text)?.into_iter();
    let top = parse_list(&mut tokens, false)?;
    let graph = top
        .into_iter()
        .find_map(|(key, value)| match (key.as_str(), value) {
            ("graph", GmlValue::List(items)) => Some(items),
            _ => None,
        })
        .ok_or_else(|| LineageError::Format("no `graph` block".into()))?;

    let node_schema = read_schema(&graph, "node_schema")?;
    let edge_schema = read_schema(&graph, "edge_schema")?;

    let mut metadata = GraphMetadata::new(string_field(&graph, "name").unwrap_or_default());
    metadata.seed = string_field(&graph, "seed");
    if let Some(run_id) = string_field(&graph, "run_id") {
        metadata.run_id = run_id
            .parse()
            .map_err(|_| LineageError::Format(format!("invalid run_id `{}`", run_id)))?;
    }
    if let Some(saved_at) = string_field(&graph, "saved_at") {
        let parsed = chrono::DateTime::parse_from_rfc3339(&saved_at)
            .map_err(|e| LineageError::Format(format!("invalid saved_at: {}", e)))?;
        metadata.saved_at = Some(parsed.with_timezone(&chrono::Utc));
    }

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for (key, value) in &graph {
        match (key.as_str(), value) {
            ("node", GmlValue::List(fields)) => nodes.push(read_node(fields, &node_schema)?),
            ("edge", GmlValue::List(fields)) => edges.push(read_edge(fields, &edge_schema)?),
            _ => {}
        }
    }

    Ok(GraphSnapshot {
        metadata,
        node_schema,
        edge_schema,
        nodes,
        edges,
    })
}

fn string_field(items: &[(String, GmlValue)], key: &str) -> Option<String> {
    items.iter().find_map(|(k, v)| match v {
        GmlValue::Str(s) if k == key => Some(s.clone()),
        _ => None,
    })
}

fn id_field(items: &[(String, GmlValue)], key: &str) -> LineageResult<u64> {
    items
        .iter()
        .find_map(|(k, v)| match v {
            GmlValue::Int(i) if k == key && *i >= 0 => Some(*i as u64),
            _ => None,
        })
        .ok_or_else(|| LineageError::Format(format!("missing or invalid `{}`", key)))
}

fn read_schema(graph: &[(String, GmlValue)], key: &str) -> LineageResult<Schema> {
    let Some(GmlValue::List(entries)) = graph.iter().find(|(k, _)| k == key).map(|(_, v)| v) else {
        return Err(LineageError::Format(format!("missing `{}`", key)));
    };
    entries
        .iter()
        .map(|(name, value)| match value {
            GmlValue::Str(ty) => PropertyType::parse(ty)
                .map(|ty| (name.clone(), ty))
                .ok_or_else(|| LineageError::Format(format!("unknown property type `{}`", ty))),
            _ => Err(LineageError::Format(format!("`{}` type must be a string", name))),
        })
        .collect()
}

fn read_node(fields: &[(String, GmlValue)], schema: &Schema) -> LineageResult<NodeRecord> {
    let id = NodeId::new(id_field(fields, "id")?);
    let mut gene = None;
    let mut generation = 0;
    let mut fitness = None;
    let mut score = None;
    let mut attrs = Attributes::new();

    for (key, value) in fields {
        if key == "id" {
            continue;
        }
        let decoded = decode(schema, key, value)?;
        match key.as_str() {
            GENE_KEY => gene = Some(decoded),
            GENERATION_KEY => generation = as_generation(key, &decoded)?,
            FITNESS_KEY => fitness = Some(as_floats(key, &decoded)?),
            SCORE_KEY => score = decoded.as_f64(),
            _ => {
                attrs.insert(key.clone(), decoded);
            }
        }
    }

    let gene = gene.ok_or_else(|| LineageError::Format(format!("node {} has no gene", id)))?;
    Ok(NodeRecord {
        id,
        gene,
        generation,
        fitness,
        score,
        attrs,
    })
}

fn read_edge(fields: &[(String, GmlValue)], schema: &Schema) -> LineageResult<EdgeRecord> {
    let id = EdgeId::new(id_field(fields, "id")?);
    let source = NodeId::new(id_field(fields, "source")?);
    let target = NodeId::new(id_field(fields, "target")?);
    let label = string_field(fields, LABEL_KEY)
        .ok_or_else(|| LineageError::Format(format!("edge {} has no label", id)))?;
    let tag = EdgeTag::parse(&label)
        .ok_or_else(|| LineageError::Format(format!("unknown edge label `{}`", label)))?;

    let mut generation = 0;
    let mut attrs = Attributes::new();
    for (key, value) in fields {
        match key.as_str() {
            "id" | "source" | "target" | LABEL_KEY => {}
            GENERATION_KEY => generation = as_generation(key, &decode(schema, key, value)?)?,
            _ => {
                attrs.insert(key.clone(), decode(schema, key, value)?);
            }
        }
    }

    Ok(EdgeRecord {
        id,
        tag,
        source,
        target,
        generation,
        attrs,
    })
}

fn decode(schema: &Schema, key: &str, value: &GmlValue) -> LineageResult<PropertyValue> {
    let ty = schema
        .get(key)
        .ok_or_else(|| LineageError::Format(format!("`{}` is missing from the schema", key)))?;
    let raw = match (ty, value) {
        (PropertyType::StringVec, GmlValue::Str(s)) => {
            let strings: Vec<String> = serde_json::from_str(s)?;
            PropertyValue::from(strings)
        }
        (ty, GmlValue::Str(s)) if ty.is_vector() => {
            let items = s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(decode_scalar)
                .collect::<LineageResult<Vec<_>>>()?;
            PropertyValue::List(items)
        }
        (PropertyType::String, GmlValue::Str(s)) => PropertyValue::Str(s.clone()),
        (_, GmlValue::Str(s)) => decode_scalar(s)?,
        (_, GmlValue::Int(i)) => PropertyValue::Int(*i),
        (_, GmlValue::Real(f)) => PropertyValue::Float(*f),
        (_, GmlValue::List(_)) => {
            return Err(LineageError::Format(format!("`{}` cannot be a list", key)))
        }
    };
    ty.coerce(key, &raw)
        .map_err(|e| LineageError::Format(e.to_string()))
}

fn decode_scalar(word: &str) -> LineageResult<PropertyValue> {
    if let Ok(i) = word.parse::<i64>() {
        return Ok(PropertyValue::Int(i));
    }
    word.parse::<f64>()
        .map(PropertyValue::Float)
        .map_err(|_| LineageError::Format(format!("`{}` is not a number", word)))
}

fn as_generation(key: &str, value: &PropertyValue) -> LineageResult<u32> {
    value
        .as_i64()
        .and_then(|g| u32::try_from(g).ok())
        .ok_or_else(|| LineageError::Format(format!("`{}` is not a generation", key)))
}

fn as_floats(key: &str, value: &PropertyValue) -> LineageResult<Vec<f64>> {
    match value {
        PropertyValue::List(items) => items
            .iter()
            .map(|item| {
                item.as_f64()
                    .ok_or_else(|| LineageError::Format(format!("`{}` is not numeric", key)))
            })
            .collect(),
        _ => Err(LineageError::Format(format!("`{}` is not a vector", key))),
    }
}
