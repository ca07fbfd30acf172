//! Normalizes raw agent replies into a single text.
//!
//! The agent answers either with one JSON object or with a stream of
//! `data: {json}` lines. Each JSON object is decoded into a [`Frame`] that
//! records which reply shapes it carries, and [`interpret_frames`] applies a
//! fixed precedence over them.

use serde_json::Value;
use tracing::debug;

use crate::error::InterpretError;

const EVENT_PREFIX: &str = "data: ";

/// Keys under which the agent may put a tool/function result, in lookup order
const TOOL_KEYS: [&str; 4] = ["tool_response", "function_response", "response", "result"];

/// One decoded reply payload, with each known shape checked for presence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// `content.parts[0].text` (or top-level `parts[0].text`)
    pub model_text: Option<String>,
    /// Structured tool/function result
    pub tool: Option<ToolResult>,
    /// Explicit `error` field
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResult {
    pub final_text: Option<String>,
    pub render_suggestions: Option<RenderSuggestions>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSuggestions {
    pub title: Option<String>,
    pub lines: Vec<String>,
    pub groups: Vec<SuggestionGroup>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionGroup {
    pub term: String,
    pub lines: Vec<String>,
}

/// String entries of a JSON array; anything else is dropped
fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl ToolResult {
    /// Collect the tool shapes from every carrier key. `final_text` comes from
    /// the first carrier with a non-empty one, `render_suggestions` from the
    /// first carrier that has them.
    fn from_carriers(carriers: &[&Value]) -> Option<Self> {
        let final_text = carriers
            .iter()
            .filter_map(|v| v.get("final_text").and_then(Value::as_str))
            .find(|text| !text.is_empty())
            .map(str::to_string);

        let render_suggestions = carriers
            .iter()
            .filter_map(|v| v.get("render_suggestions"))
            .find_map(RenderSuggestions::from_value);

        if final_text.is_none() && render_suggestions.is_none() {
            return None;
        }
        Some(Self {
            final_text,
            render_suggestions,
        })
    }
}

impl RenderSuggestions {
    fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        let groups = value
            .get("groups")
            .and_then(Value::as_array)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(|group| {
                        let term = group.get("term").and_then(Value::as_str)?;
                        Some(SuggestionGroup {
                            term: term.to_string(),
                            lines: string_list(group.get("lines")),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            title: value.get("title").and_then(Value::as_str).map(str::to_string),
            lines: string_list(value.get("lines")),
            groups,
        })
    }
}

impl Frame {
    /// Decode a JSON payload. Returns `None` for anything that isn't an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        let model_text = value
            .pointer("/content/parts/0/text")
            .or_else(|| value.pointer("/parts/0/text"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let carriers: Vec<&Value> = TOOL_KEYS
            .iter()
            .filter_map(|key| value.get(*key))
            .filter(|v| v.is_object())
            .collect();
        let tool = ToolResult::from_carriers(&carriers);

        let error = match value.get("error") {
            None | Some(Value::Null) => None,
            Some(Value::String(message)) => Some(message.clone()),
            Some(other) => Some(other.to_string()),
        };

        Some(Self {
            model_text,
            tool,
            error,
        })
    }

    /// Non-empty `final_text` from the tool result, if any
    pub fn tool_text(&self) -> Option<&str> {
        self.tool
            .as_ref()
            .and_then(|t| t.final_text.as_deref())
            .filter(|text| !text.is_empty())
    }

    /// Suggestion payload rendered as text, if it has a title
    pub fn suggestions_text(&self) -> Option<String> {
        let suggestions = self.tool.as_ref()?.render_suggestions.as_ref()?;
        let title = suggestions.title.as_deref().filter(|t| !t.is_empty())?;
        Some(suggestions.compose(title))
    }
}

impl RenderSuggestions {
    /// Numbered lines, or one section per group
    fn compose(&self, title: &str) -> String {
        let mut out = String::from(title);

        if self.groups.is_empty() {
            for (i, line) in self.lines.iter().enumerate() {
                out.push_str(&format!("\n{}. {}", i + 1, line));
            }
            return out;
        }

        for group in &self.groups {
            out.push_str("\n\n");
            out.push_str(&group.term);
            if let Some((best, rest)) = group.lines.split_first() {
                out.push_str(&format!("\nBest match: {}", best));
                if !rest.is_empty() {
                    out.push_str("\nOther suggestions:");
                    for (i, line) in rest.iter().enumerate() {
                        out.push_str(&format!("\n{}. {}", i + 1, line));
                    }
                }
            }
        }
        out
    }
}

/// Split a raw body into frames. Event-stream bodies yield one frame per
/// `data: ` line; anything else is parsed as a single JSON object.
pub fn parse_frames(raw: &str) -> Vec<Frame> {
    let is_stream = raw.lines().any(|line| line.starts_with(EVENT_PREFIX));

    if !is_stream {
        return serde_json::from_str::<Value>(raw.trim())
            .ok()
            .and_then(|value| Frame::from_value(&value))
            .into_iter()
            .collect();
    }

    raw.lines()
        .filter_map(|line| line.trim_end_matches('\r').strip_prefix(EVENT_PREFIX))
        .filter_map(|body| match serde_json::from_str::<Value>(body) {
            Ok(value) => Frame::from_value(&value),
            Err(err) => {
                debug!(%err, "skipping unparseable event frame");
                None
            }
        })
        .collect()
}

/// Pick the reply text out of a sequence of frames.
///
/// Per frame, in arrival order: a non-empty tool `final_text` is returned;
/// model text is returned unless a later frame still carries a tool result;
/// an `error` fails. If nothing matched, the last frame's suggestions are used.
pub fn interpret_frames(frames: &[Frame]) -> Result<String, InterpretError> {
    for (i, frame) in frames.iter().enumerate() {
        if let Some(text) = frame.tool_text() {
            return Ok(text.to_string());
        }

        if let Some(text) = &frame.model_text {
            let tool_pending = frames[i + 1..].iter().any(|f| f.tool_text().is_some());
            if !tool_pending {
                return Ok(text.clone());
            }
            debug!(frame = i, "deferring model text, tool result pending");
        }

        if let Some(message) = &frame.error {
            return Err(InterpretError::AgentError(message.clone()));
        }
    }

    frames
        .last()
        .and_then(Frame::suggestions_text)
        .ok_or(InterpretError::NoContentFound)
}

/// Interpret a raw agent reply body
pub fn interpret(raw: &str) -> Result<String, InterpretError> {
    interpret_frames(&parse_frames(raw))
}
