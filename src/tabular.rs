//! Tabular specification processor.
//!
//! Alternate ingestion path: a delimited export with a header row, parsed by
//! a custom quoted-field scanner rather than a general CSV grammar. Several
//! columns hold JSON-encoded values that may themselves contain commas and
//! newlines, so fields split on commas only outside quotes and quoted fields
//! may span lines. A doubled `""` inside quotes unescapes to a literal quote.
//!
//! Row validation is per-row: rows missing ENDPOINT or METHOD are collected
//! into an error list and skipped, never aborting the whole file. Malformed
//! JSON columns are surfaced as warnings with the field omitted.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::chunk::{Chunk, ChunkKind, ChunkMetadata};

/// Columns every export must carry (the rest are optional).
const REQUIRED_COLUMNS: [&str; 2] = ["ENDPOINT", "METHOD"];

/// Errors that abort the whole file.
#[derive(Error, Debug)]
pub enum TabularError {
    #[error("empty tabular document")]
    Empty,

    #[error("header is missing required column {0}")]
    MissingColumn(&'static str),
}

/// Result type for tabular parsing.
pub type TabularResult<T> = Result<T, TabularError>;

/// A row rejected during validation.
///
/// Collected and reported alongside the successful chunks.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RowError {
    /// 1-based line number where the record starts.
    pub line_number: usize,
    pub endpoint: String,
    pub method: String,
    pub error: String,
}

/// Output of tabular processing.
///
/// `errors` holds rows that were rejected outright; `warnings` holds rows
/// that produced a chunk but had a malformed JSON column omitted.
#[derive(Debug, Default)]
pub struct TabularOutput {
    pub chunks: Vec<Chunk>,
    pub errors: Vec<RowError>,
    pub warnings: Vec<RowError>,
}

/// One validated row with its typed column values.
#[derive(Debug, Clone)]
struct Row {
    endpoint: String,
    method: String,
    summary: String,
    description: String,
    parameters: Option<Value>,
    responses: Option<Value>,
    schemas: Option<Value>,
    tags: Option<Value>,
}

/// Parse a tabular export into chunks.
pub fn process_tabular(content: &str) -> TabularResult<TabularOutput> {
    let records = scan_records(content);
    let mut records = records.into_iter();

    let Some((_, header)) = records.next() else {
        return Err(TabularError::Empty);
    };

    let header: Vec<String> = header.iter().map(|h| h.to_uppercase()).collect();
    for required in REQUIRED_COLUMNS {
        if !header.iter().any(|h| h == required) {
            return Err(TabularError::MissingColumn(required));
        }
    }

    let column = |name: &str| header.iter().position(|h| h == name);
    let endpoint_col = column("ENDPOINT").expect("checked above");
    let method_col = column("METHOD").expect("checked above");
    let summary_col = column("SUMMARY");
    let description_col = column("DESCRIPTION");
    let parameters_col = column("PARAMETERS");
    let responses_col = column("RESPONSES");
    let schemas_col = column("SCHEMAS");
    let tags_col = column("TAGS");

    let mut output = TabularOutput::default();

    for (line_number, fields) in records {
        if fields.iter().all(String::is_empty) {
            continue;
        }

        let field = |idx: Option<usize>| -> &str {
            idx.and_then(|i| fields.get(i))
                .map(String::as_str)
                .unwrap_or("")
        };

        let endpoint = fields.get(endpoint_col).cloned().unwrap_or_default();
        let method = fields
            .get(method_col)
            .map(|m| m.to_uppercase())
            .unwrap_or_default();

        // Validation failure is per-row, never fatal for the file.
        if endpoint.is_empty() || method.is_empty() {
            let missing = if endpoint.is_empty() {
                "missing ENDPOINT"
            } else {
                "missing METHOD"
            };
            warn!(target: "tabular", line = line_number, "row rejected: {missing}");
            output.errors.push(RowError {
                line_number,
                endpoint,
                method,
                error: missing.to_string(),
            });
            continue;
        }

        let mut warn_column = |column: &str, message: String| {
            warn!(target: "tabular", line = line_number, %column, "{message}");
            output.warnings.push(RowError {
                line_number,
                endpoint: endpoint.clone(),
                method: method.clone(),
                error: format!("{column}: {message}"),
            });
        };

        let mut json_column = |idx: Option<usize>, column: &str| -> Option<Value> {
            match parse_json_field(field(idx)) {
                Ok(value) => value,
                Err(message) => {
                    warn_column(column, message);
                    None
                }
            }
        };

        let parameters = json_column(parameters_col, "PARAMETERS");
        let responses = json_column(responses_col, "RESPONSES");
        let tags = json_column(tags_col, "TAGS");
        let schemas = match parse_schemas_field(field(schemas_col)) {
            Ok(value) => value,
            Err(message) => {
                warn_column("SCHEMAS", message);
                None
            }
        };

        let row = Row {
            endpoint,
            method,
            summary: field(summary_col).to_string(),
            description: field(description_col).to_string(),
            parameters,
            responses,
            schemas,
            tags,
        };

        output.chunks.push(row_chunk(&row));
    }

    Ok(output)
}

/// Split content into records of trimmed fields.
///
/// Character scan with an in-quotes flag: `"` toggles quoting, `""` inside
/// quotes emits a literal quote, `,` separates fields and `\n` separates
/// records only outside quotes. Returns each record with the 1-based line
/// number it starts on.
fn scan_records(content: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut record_line = 1usize;

    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Doubled quote unescapes to a literal quote.
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                fields.push(field.trim().to_string());
                field = String::new();
            }
            '\n' if !in_quotes => {
                line += 1;
                fields.push(field.trim().to_string());
                field = String::new();
                if !(fields.len() == 1 && fields[0].is_empty()) {
                    records.push((record_line, std::mem::take(&mut fields)));
                } else {
                    fields.clear();
                }
                record_line = line;
            }
            '\r' if !in_quotes => {}
            '\n' => {
                // Embedded newline inside a quoted field is preserved.
                line += 1;
                field.push(c);
            }
            _ => field.push(c),
        }
    }

    // Trailing record without a final newline.
    if !field.trim().is_empty() || !fields.is_empty() {
        fields.push(field.trim().to_string());
        if !(fields.len() == 1 && fields[0].is_empty()) {
            records.push((record_line, fields));
        }
    }

    records
}

/// Typed parse of a JSON column value.
///
/// Empty or non-JSON-shaped values are absent (`Ok(None)`); a value that
/// looks like JSON but fails to parse is an explicit error for the caller
/// to surface. The field is omitted either way, never fatal for the row.
fn parse_json_field(value: &str) -> Result<Option<Value>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return Ok(None);
    }

    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| format!("unparseable JSON value: {e}"))
}

/// Parse the SCHEMAS column.
///
/// JSON-shaped values go through the normal JSON path; otherwise the
/// secondary grammar `schema,name,prop:type;prop:type` is attempted.
fn parse_schemas_field(value: &str) -> Result<Option<Value>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return parse_json_field(trimmed);
    }

    let mut parts = trimmed.splitn(3, ',');
    if parts.next().map(str::trim) != Some("schema") {
        return Ok(None);
    }
    let name = match parts.next().map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return Ok(None),
    };

    let mut properties = Map::new();
    if let Some(props) = parts.next() {
        for pair in props.split(';') {
            let Some((prop, prop_type)) = pair.split_once(':') else {
                continue;
            };
            properties.insert(
                prop.trim().to_string(),
                Value::String(prop_type.trim().to_string()),
            );
        }
    }

    let mut schema = Map::new();
    schema.insert("name".to_string(), Value::String(name.to_string()));
    schema.insert("properties".to_string(), Value::Object(properties));
    Ok(Some(Value::Object(schema)))
}

/// Build the chunk for one valid row.
fn row_chunk(row: &Row) -> Chunk {
    let mut text = format!("{} {}\n", row.method, row.endpoint);

    if !row.summary.is_empty() {
        text.push_str(&row.summary);
        text.push('\n');
    }
    if !row.description.is_empty() {
        text.push_str(&row.description);
        text.push('\n');
    }

    if let Some(params) = row.parameters.as_ref().and_then(Value::as_array) {
        if !params.is_empty() {
            text.push_str("Parameters:\n");
            for param in params {
                let name = param.get("name").and_then(Value::as_str).unwrap_or("?");
                let location = param.get("in").and_then(Value::as_str).unwrap_or("?");
                text.push_str(&format!("- {name} ({location})\n"));
            }
        }
    }

    if let Some(responses) = row.responses.as_ref().and_then(Value::as_object) {
        if !responses.is_empty() {
            text.push_str("Responses:\n");
            for (status, response) in responses {
                let description = response
                    .get("description")
                    .and_then(Value::as_str)
                    .or_else(|| response.as_str())
                    .unwrap_or("");
                text.push_str(&format!("- {status}: {description}\n"));
            }
        }
    }

    let mut schema_refs = Vec::new();
    if let Some(schema) = row.schemas.as_ref() {
        if let Some(name) = schema.get("name").and_then(Value::as_str) {
            schema_refs.push(name.to_string());
            text.push_str(&format!("Schema {name}"));
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                let fields: Vec<String> = props
                    .iter()
                    .map(|(prop, prop_type)| {
                        format!("{prop}: {}", prop_type.as_str().unwrap_or("?"))
                    })
                    .collect();
                if !fields.is_empty() {
                    text.push_str(&format!(" ({})", fields.join(", ")));
                }
            }
            text.push('\n');
        }
    }

    let tags = row
        .tags
        .as_ref()
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Chunk::new(
        Chunk::endpoint_id(&row.endpoint, &row.method),
        ChunkKind::Endpoint,
        text.trim_end().to_string(),
        ChunkMetadata {
            endpoint: Some(row.endpoint.clone()),
            method: Some(row.method.clone()),
            tags,
            schema_refs,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "ENDPOINT,METHOD,SUMMARY,DESCRIPTION,PARAMETERS,REQUEST_BODY,RESPONSES,SECURITY,SERVERS,SCHEMAS,TAGS";

    #[test]
    fn test_quoted_field_keeps_embedded_comma() {
        let records = scan_records("a,\"b,c\",d\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1, vec!["a", "b,c", "d"]);
    }

    #[test]
    fn test_doubled_quote_unescapes() {
        let records = scan_records("\"say \"\"hi\"\"\",x\n");
        assert_eq!(records[0].1, vec!["say \"hi\"", "x"]);
    }

    #[test]
    fn test_quoted_field_spans_lines() {
        let records = scan_records("a,\"line one\nline two\",b\nnext,row\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].1[1], "line one\nline two");
        // The second record's line number accounts for the embedded newline.
        assert_eq!(records[1].0, 3);
    }

    #[test]
    fn test_json_parameters_round_trip() {
        let content = format!(
            "{HEADER}\n/widgets/{{id}},GET,Get widget,Fetch one,\"[{{\"\"name\"\":\"\"id\"\",\"\"in\"\":\"\"path\"\"}}]\",,,,,,\n"
        );
        let output = process_tabular(&content).unwrap();

        assert_eq!(output.chunks.len(), 1);
        assert!(output.errors.is_empty());

        let chunk = &output.chunks[0];
        assert!(chunk.text.contains("- id (path)"));
        assert_eq!(chunk.id, "widgets-id-get");
    }

    #[test]
    fn test_invalid_row_collected_not_fatal() {
        let content = format!(
            "{HEADER}\n/ok,GET,Fine,,,,,,,,\n,POST,No endpoint,,,,,,,,\n/also-ok,PUT,Fine,,,,,,,,\n"
        );
        let output = process_tabular(&content).unwrap();

        assert_eq!(output.chunks.len(), 2);
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].line_number, 3);
        assert_eq!(output.errors[0].method, "POST");
        assert!(output.errors[0].error.contains("ENDPOINT"));
    }

    #[test]
    fn test_malformed_json_column_is_surfaced_not_fatal() {
        let content = format!("{HEADER}\n/w,GET,S,,{{not json,,,,,,\n");
        // The brace-shaped PARAMETERS value fails to parse: the row still
        // produces a chunk, and the failure is reported as a warning.
        let output = process_tabular(&content).unwrap();
        assert_eq!(output.chunks.len(), 1);
        assert!(!output.chunks[0].text.contains("Parameters"));
        assert!(output.errors.is_empty());
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(output.warnings[0].line_number, 2);
        assert!(output.warnings[0].error.starts_with("PARAMETERS:"));
    }

    #[test]
    fn test_schemas_secondary_grammar() {
        let parsed = parse_schemas_field("schema,Widget,id:integer;name:string")
            .unwrap()
            .unwrap();
        assert_eq!(parsed["name"], "Widget");
        assert_eq!(parsed["properties"]["id"], "integer");
        assert_eq!(parsed["properties"]["name"], "string");

        let content =
            format!("{HEADER}\n/w,GET,S,,,,,,,\"schema,Widget,id:integer\",\n");
        let output = process_tabular(&content).unwrap();
        assert!(output.chunks[0].text.contains("Schema Widget (id: integer)"));
        assert_eq!(output.chunks[0].metadata.schema_refs, vec!["Widget"]);
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let result = process_tabular("ENDPOINT,SUMMARY\n/x,hello\n");
        assert!(matches!(result, Err(TabularError::MissingColumn("METHOD"))));
    }

    #[test]
    fn test_empty_document() {
        assert!(matches!(process_tabular(""), Err(TabularError::Empty)));
    }

    #[test]
    fn test_responses_render_as_bullets() {
        let content = format!(
            "{HEADER}\n/widgets,POST,Create,,,,\"{{\"\"201\"\":{{\"\"description\"\":\"\"Created\"\"}}}}\",,,,\n"
        );
        let output = process_tabular(&content).unwrap();
        assert!(output.chunks[0].text.contains("- 201: Created"));
    }
}
