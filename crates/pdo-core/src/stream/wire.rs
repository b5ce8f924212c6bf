//! Line-level wire format: `data:` lines carry a JSON body or raw text.

use serde::Serialize;

/// Prefix of a data-bearing line.
pub const DATA_MARKER: &str = "data:";

/// One decoded message from a stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum StreamChunk {
    /// Body parsed as JSON.
    Json(serde_json::Value),
    /// Body that did not parse; delivered verbatim.
    Text(String),
}

impl StreamChunk {
    /// Text content: the raw text, or the `content` string field of a JSON body.
    pub fn content(&self) -> Option<&str> {
        match self {
            StreamChunk::Text(t) => Some(t),
            StreamChunk::Json(v) => v.get("content").and_then(|c| c.as_str()),
        }
    }
}

/// Parse one line. `None` for lines that carry nothing: blank lines,
/// non-data fields and comments, and `data:` lines with an empty body.
pub fn parse_line(line: &str) -> Option<StreamChunk> {
    let body = line.strip_prefix(DATA_MARKER)?;
    let body = body.strip_prefix(' ').unwrap_or(body);
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str(body) {
        Ok(value) => Some(StreamChunk::Json(value)),
        Err(_) => Some(StreamChunk::Text(body.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_body() {
        assert_eq!(
            parse_line(r#"data: {"content":"Hello"}"#),
            Some(StreamChunk::Json(json!({ "content": "Hello" })))
        );
        assert_eq!(parse_line(r#"data:{"n":1}"#), Some(StreamChunk::Json(json!({ "n": 1 }))));
    }

    #[test]
    fn unparsable_body_falls_back_to_text() {
        let chunk = parse_line("data: partial {json").unwrap();
        assert_eq!(chunk, StreamChunk::Text("partial {json".into()));
        assert_eq!(chunk.content(), Some("partial {json"));
    }

    #[test]
    fn non_data_lines_are_ignored() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line(": keep-alive"), None);
        assert_eq!(parse_line("event: message"), None);
        assert_eq!(parse_line("data: "), None);
    }

    #[test]
    fn content_of_json_chunk() {
        let chunk = parse_line(r#"data: {"content":"tok","index":3}"#).unwrap();
        assert_eq!(chunk.content(), Some("tok"));
        assert_eq!(parse_line("data: [1,2]").unwrap().content(), None);
    }
}
