//! Wire event types for the agent stream

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};

/// A tabular tool result: column names plus row-major cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePayload {
    pub columns: Vec<String>,
    pub data: Vec<Vec<serde_json::Value>>,
}

/// One decoded frame from the agent stream.
///
/// The wire shape is `{"type": "...", "data": {...}}`; variant names map to
/// the `type` tag. Unknown fields inside `data` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental reasoning text
    Thinking { content: String },

    /// Incremental answer text
    Text { content: String },

    /// The agent started a tool invocation
    ToolCallStart {
        name: String,
        #[serde(default)]
        args: serde_json::Value,
    },

    /// A tool invocation finished
    ToolCallResult { result: String },

    /// A chart spec produced by a visualization tool
    Plotly {
        #[serde(deserialize_with = "string_or_inline")]
        json: serde_json::Value,
    },

    /// A tabular result produced by a query tool
    DataTable {
        #[serde(deserialize_with = "string_or_inline")]
        json: TablePayload,
    },

    /// A non-fatal notice surfaced to the user
    Warning { message: String },

    /// The producer is retrying a step; narrated like reasoning text
    Retrying { content: String },

    /// The turn completed
    Done {},

    /// The turn failed
    Error { message: String },
}

impl StreamEvent {
    /// Check if this is a terminal event (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done {} | StreamEvent::Error { .. })
    }
}

/// Accept either an inline JSON value or a JSON document encoded as a string.
/// The current backend sends the parsed object; the documented contract (and
/// older producers) send the serialized form.
fn string_or_inline<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let value = match value {
        serde_json::Value::String(s) => {
            serde_json::from_str(&s).map_err(serde::de::Error::custom)?
        }
        other => other,
    };
    serde_json::from_value(value).map_err(serde::de::Error::custom)
}
