//! Text frames of the Engine.IO / Socket.IO wire format.
//!
//! Only the pieces a push listener needs: keepalive, open/connect
//! acknowledgements and `42[...]` events.

use gleaner_common::{SourceLink, StructuredAnswer};
use serde_json::{json, Value};

pub const PING: &str = "2";
pub const PONG: &str = "3";

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Transport open handshake (`0{...}`).
    Open(Value),
    Ping,
    Pong,
    /// Namespace connect acknowledgement (`40...`).
    Connected,
    /// `42["name", data]`.
    Event { name: String, data: Value },
    /// Anything else, passed through untouched.
    Other(String),
}

impl Frame {
    pub fn parse(text: &str) -> Frame {
        match text {
            PING => return Frame::Ping,
            PONG => return Frame::Pong,
            _ => {}
        }
        if let Some(rest) = text.strip_prefix("42") {
            if let Some(event) = parse_event(rest) {
                return event;
            }
            return Frame::Other(text.to_string());
        }
        if text.starts_with("40") {
            return Frame::Connected;
        }
        if let Some(rest) = text.strip_prefix('0') {
            if let Ok(value) = serde_json::from_str(rest) {
                return Frame::Open(value);
            }
        }
        Frame::Other(text.to_string())
    }

    pub fn event_name(&self) -> Option<&str> {
        match self {
            Frame::Event { name, .. } => Some(name),
            _ => None,
        }
    }
}

// `[/namespace,][ack-id]["name", data]`
fn parse_event(rest: &str) -> Option<Frame> {
    let start = rest.find('[')?;
    let prefix = &rest[..start];
    let id_part = match prefix.strip_prefix('/') {
        Some(ns) => ns.split_once(',').map(|(_, id)| id).unwrap_or(""),
        None => prefix,
    };
    if !id_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let array: Vec<Value> = serde_json::from_str(&rest[start..]).ok()?;
    let mut items = array.into_iter();
    let name = match items.next()? {
        Value::String(name) => name,
        _ => return None,
    };
    Some(Frame::Event {
        name,
        data: items.next().unwrap_or(Value::Null),
    })
}

/// Encode an event frame.
///
/// ```
/// use gleaner_stream::frame::event_frame;
///
/// let frame = event_frame("session_init", &serde_json::json!({}));
/// assert_eq!(frame, r#"42["session_init",{}]"#);
/// ```
pub fn event_frame(name: &str, data: &Value) -> String {
    format!("42{}", json!([name, data]))
}

/// Query payload sent as `42["<event>", {...}]`.
pub fn query_frame(event: &str, query: &str, session_id: &str) -> String {
    event_frame(
        event,
        &json!({
            "query": query,
            "source": "web",
            "language": "en",
            "version": "2.0",
            "session_id": session_id,
        }),
    )
}

/// Answer carried by an answer event, with the query it answers.
///
/// Returns `None` when the payload has no non-empty `answer` string.
pub fn answer_from_event(data: &Value) -> Option<(Option<String>, StructuredAnswer)> {
    let answer = data.get("answer")?.as_str()?.trim();
    if answer.is_empty() {
        return None;
    }
    let query = data
        .get("query")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|q| !q.trim().is_empty());
    let sources = data
        .get("sources")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(source_link).collect())
        .unwrap_or_default();
    let related = data
        .get("related_questions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let title = data
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| query.clone());
    Some((
        query,
        StructuredAnswer {
            title,
            answer: answer.to_string(),
            sources,
            related,
        },
    ))
}

fn source_link(item: &Value) -> Option<SourceLink> {
    match item {
        Value::String(url) => Some(SourceLink::new(url.clone(), url.clone())),
        Value::Object(map) => {
            let url = map.get("url").or_else(|| map.get("link"))?.as_str()?;
            let text = map
                .get("title")
                .or_else(|| map.get("name"))
                .and_then(Value::as_str)
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(url);
            Some(SourceLink::new(text, url))
        }
        _ => None,
    }
}
