//! Structured-document chunker.
//!
//! Pure transform: parsed OpenAPI-style JSON tree -> ordered chunk sequence.
//!
//! Emits one info chunk, one chunk per (path, method) operation, one chunk
//! per non-schema component entry, and one chunk per named schema. Schema
//! references are resolved to a bounded depth; a missing or cyclic `$ref`
//! degrades to the bare schema name instead of failing the chunk.

use std::collections::HashSet;

use serde_json::Value;

use crate::chunk::{Chunk, ChunkKind, ChunkMetadata};

/// HTTP methods recognized as operations inside a path item.
const HTTP_METHODS: [&str; 8] = [
    "get", "post", "put", "delete", "patch", "options", "head", "trace",
];

/// How many `$ref` hops a single schema description may follow:
/// the top-level reference plus one more level for nested property
/// and array-item references.
const MAX_REF_DEPTH: usize = 2;

/// Chunk a parsed structured document.
///
/// Deterministic: the same tree always yields the same chunk sequence,
/// text, and ids (object keys iterate in sorted order).
pub fn chunk_document(doc: &Value, spec_id: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    if let Some(chunk) = info_chunk(doc, spec_id, chunks.len()) {
        chunks.push(chunk);
    }

    path_chunks(doc, &mut chunks);
    component_chunks(doc, spec_id, &mut chunks);
    schema_chunks(doc, spec_id, &mut chunks);

    chunks
}

/// Emit the document info block as a single chunk.
fn info_chunk(doc: &Value, spec_id: &str, position: usize) -> Option<Chunk> {
    let info = doc.get("info")?;

    let mut text = String::new();
    if let Some(title) = str_field(info, "title") {
        text.push_str("API: ");
        text.push_str(title);
        text.push('\n');
    }
    if let Some(version) = str_field(info, "version") {
        text.push_str("Version: ");
        text.push_str(version);
        text.push('\n');
    }
    if let Some(description) = str_field(info, "description") {
        text.push_str(description);
        text.push('\n');
    }

    if text.is_empty() {
        return None;
    }

    Some(Chunk::new(
        Chunk::positional_id(spec_id, position),
        ChunkKind::Info,
        text.trim_end().to_string(),
        ChunkMetadata::default(),
    ))
}

/// Emit one chunk per (path, method) operation.
fn path_chunks(doc: &Value, chunks: &mut Vec<Chunk>) {
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return;
    };

    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };

        for (method, operation) in item {
            if !HTTP_METHODS.contains(&method.as_str()) {
                continue;
            }

            let method_upper = method.to_uppercase();
            let mut refs = Vec::new();
            let text = operation_text(doc, path, &method_upper, operation, &mut refs);

            let tags = operation
                .get("tags")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();

            chunks.push(Chunk::new(
                Chunk::endpoint_id(path, &method_upper),
                ChunkKind::Path,
                text,
                ChunkMetadata {
                    endpoint: Some(path.clone()),
                    method: Some(method_upper),
                    tags,
                    schema_refs: refs,
                },
            ));
        }
    }
}

/// Build the text body for one operation.
fn operation_text(
    doc: &Value,
    path: &str,
    method: &str,
    operation: &Value,
    refs: &mut Vec<String>,
) -> String {
    let mut text = format!("{method} {path}\n");

    if let Some(summary) = str_field(operation, "summary") {
        text.push_str("Summary: ");
        text.push_str(summary);
        text.push('\n');
    }
    if let Some(description) = str_field(operation, "description") {
        text.push_str("Description: ");
        text.push_str(description);
        text.push('\n');
    }

    if let Some(params) = operation.get("parameters").and_then(Value::as_array) {
        if !params.is_empty() {
            text.push_str("Parameters:\n");
            for param in params {
                text.push_str(&parameter_line(param));
            }
        }
    }

    if let Some(body) = operation.get("requestBody") {
        if let Some(line) = body_line(doc, body, refs) {
            text.push_str("Request body: ");
            text.push_str(&line);
            text.push('\n');
        }
    }

    if let Some(responses) = operation.get("responses").and_then(Value::as_object) {
        if !responses.is_empty() {
            text.push_str("Responses:\n");
            for (status, response) in responses {
                text.push_str(&response_line(doc, status, response, refs));
            }
        }
    }

    text.trim_end().to_string()
}

/// Render one parameter as a bullet line.
fn parameter_line(param: &Value) -> String {
    let name = str_field(param, "name").unwrap_or("?");
    let location = str_field(param, "in").unwrap_or("?");
    let required = param
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut line = format!("- {name} ({location}");
    if required {
        line.push_str(", required");
    }
    line.push(')');

    if let Some(description) = str_field(param, "description") {
        line.push_str(": ");
        line.push_str(description);
    }
    line.push('\n');
    line
}

/// Render a request body with one resolved schema per content type.
fn body_line(doc: &Value, body: &Value, refs: &mut Vec<String>) -> Option<String> {
    let content = body.get("content").and_then(Value::as_object)?;
    let mut parts = Vec::new();

    for (media_type, media) in content {
        match media.get("schema") {
            Some(schema) => {
                let detail = describe_schema(doc, schema, MAX_REF_DEPTH, &mut HashSet::new(), refs);
                parts.push(format!("{media_type}: {detail}"));
            }
            None => parts.push(media_type.clone()),
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

/// Render one response status as a bullet line, with schema detail when present.
fn response_line(doc: &Value, status: &str, response: &Value, refs: &mut Vec<String>) -> String {
    let mut line = format!("- {status}");

    if let Some(description) = str_field(response, "description") {
        line.push_str(": ");
        line.push_str(description);
    }

    if let Some(content) = response.get("content").and_then(Value::as_object) {
        for media in content.values() {
            if let Some(schema) = media.get("schema") {
                let detail = describe_schema(doc, schema, MAX_REF_DEPTH, &mut HashSet::new(), refs);
                line.push_str(" Schema: ");
                line.push_str(&detail);
                break;
            }
        }
    }

    line.push('\n');
    line
}

/// Emit one chunk per named entry in every component group except schemas.
fn component_chunks(doc: &Value, spec_id: &str, chunks: &mut Vec<Chunk>) {
    let Some(components) = doc.get("components").and_then(Value::as_object) else {
        return;
    };

    for (group, entries) in components {
        if group == "schemas" {
            continue;
        }
        let Some(entries) = entries.as_object() else {
            continue;
        };

        for (name, entry) in entries {
            let text = match group.as_str() {
                "securitySchemes" => security_scheme_text(name, entry),
                _ => generic_component_text(group, name, entry),
            };

            chunks.push(Chunk::new(
                Chunk::positional_id(spec_id, chunks.len()),
                ChunkKind::Component,
                text,
                ChunkMetadata::default(),
            ));
        }
    }
}

/// Category-specific rendering for a security scheme entry.
fn security_scheme_text(name: &str, entry: &Value) -> String {
    let scheme_type = str_field(entry, "type").unwrap_or("unknown");
    let mut text = format!("Security scheme {name}: type {scheme_type}\n");

    match scheme_type {
        "oauth2" => {
            if let Some(flows) = entry.get("flows").and_then(Value::as_object) {
                for (flow_name, flow) in flows {
                    text.push_str(&format!("Flow {flow_name}:"));
                    if let Some(url) = str_field(flow, "authorizationUrl") {
                        text.push_str(&format!(" authorization {url}"));
                    }
                    if let Some(url) = str_field(flow, "tokenUrl") {
                        text.push_str(&format!(" token {url}"));
                    }
                    text.push('\n');
                    if let Some(scopes) = flow.get("scopes").and_then(Value::as_object) {
                        for (scope, desc) in scopes {
                            let desc = desc.as_str().unwrap_or("");
                            text.push_str(&format!("- scope {scope}: {desc}\n"));
                        }
                    }
                }
            }
        }
        "apiKey" => {
            let location = str_field(entry, "in").unwrap_or("?");
            let key_name = str_field(entry, "name").unwrap_or("?");
            text.push_str(&format!("API key named {key_name} in {location}\n"));
        }
        "http" => {
            if let Some(scheme) = str_field(entry, "scheme") {
                text.push_str(&format!("HTTP scheme {scheme}"));
                if let Some(format) = str_field(entry, "bearerFormat") {
                    text.push_str(&format!(" ({format})"));
                }
                text.push('\n');
            }
        }
        _ => {
            if let Some(description) = str_field(entry, "description") {
                text.push_str(description);
                text.push('\n');
            }
        }
    }

    text.trim_end().to_string()
}

/// Fallback rendering for component groups without dedicated formatting.
fn generic_component_text(group: &str, name: &str, entry: &Value) -> String {
    let mut text = format!("Component ({group}) {name}");

    if let Some(description) = str_field(entry, "description") {
        text.push_str(": ");
        text.push_str(description);
    } else if let Ok(json) = serde_json::to_string(entry) {
        text.push_str(": ");
        text.push_str(&json);
    }

    text
}

/// Emit one chunk per schema in the schema map.
fn schema_chunks(doc: &Value, spec_id: &str, chunks: &mut Vec<Chunk>) {
    let Some(schemas) = doc
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object)
    else {
        return;
    };

    for (name, schema) in schemas {
        let mut text = format!("Schema {name}");

        if let Some(schema_type) = str_field(schema, "type") {
            text.push_str(&format!(": type {schema_type}"));
        }
        if let Some(format) = str_field(schema, "format") {
            text.push_str(&format!(", format {format}"));
        }
        text.push('\n');

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            let names: Vec<&str> = required.iter().filter_map(Value::as_str).collect();
            if !names.is_empty() {
                text.push_str("Required: ");
                text.push_str(&names.join(", "));
                text.push('\n');
            }
        }

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            if !properties.is_empty() {
                text.push_str("Properties:\n");
                for (prop, prop_schema) in properties {
                    let detail = describe_schema(
                        doc,
                        prop_schema,
                        1,
                        &mut HashSet::new(),
                        &mut Vec::new(),
                    );
                    text.push_str(&format!("- {prop}: {detail}\n"));
                }
            }
        }

        chunks.push(Chunk::new(
            Chunk::positional_id(spec_id, chunks.len()),
            ChunkKind::Schema,
            text.trim_end().to_string(),
            ChunkMetadata {
                schema_refs: vec![name.clone()],
                ..ChunkMetadata::default()
            },
        ));
    }
}

/// Describe a schema node as a short inline string.
///
/// `depth` bounds how many `$ref` hops may still be followed and `visited`
/// holds the references already seen on this path, so cyclic documents
/// terminate with the bare schema name.
fn describe_schema(
    root: &Value,
    schema: &Value,
    depth: usize,
    visited: &mut HashSet<String>,
    refs: &mut Vec<String>,
) -> String {
    if let Some(reference) = str_field(schema, "$ref") {
        let name = ref_name(reference);
        if !refs.iter().any(|r| r == name) {
            refs.push(name.to_string());
        }

        if depth == 0 || !visited.insert(reference.to_string()) {
            return name.to_string();
        }

        // Missing target: keep the name, drop the detail.
        let Some(target) = resolve_pointer(root, reference) else {
            return name.to_string();
        };

        let detail = describe_schema(root, target, depth - 1, visited, refs);
        return format!("{name} ({detail})");
    }

    let schema_type = str_field(schema, "type").unwrap_or("object");

    match schema_type {
        "array" => {
            let items = schema
                .get("items")
                .map(|i| describe_schema(root, i, depth, visited, refs))
                .unwrap_or_else(|| "any".to_string());
            format!("array of {items}")
        }
        "object" => {
            let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
                return "object".to_string();
            };
            let fields: Vec<String> = properties
                .iter()
                .map(|(prop, prop_schema)| {
                    let detail = describe_schema(root, prop_schema, depth, visited, refs);
                    format!("{prop}: {detail}")
                })
                .collect();
            format!("object {{ {} }}", fields.join(", "))
        }
        other => match str_field(schema, "format") {
            Some(format) => format!("{other} ({format})"),
            None => other.to_string(),
        },
    }
}

/// Walk a `#/a/b/c` JSON pointer through the document tree.
fn resolve_pointer<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    let path = reference.strip_prefix("#/")?;
    let mut node = root;
    for part in path.split('/') {
        node = node.get(part)?;
    }
    Some(node)
}

/// Last segment of a reference path (`#/components/schemas/Widget` -> `Widget`).
fn ref_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}
