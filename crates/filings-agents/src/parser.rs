//! Tool-call signal extraction from assistant text.
//!
//! Two marker styles are recognised:
//! - A line marker: `TOOL_CALL: rag_query {"query": "total assets"}` or
//!   `TOOL_CALL: rag_query(query="total assets", k=3)`. The keyword is
//!   case-insensitive, `TOOL CALL:` is accepted, and markdown decoration
//!   (`*`, backticks) around the marker and tool name is ignored. A JSON
//!   parameter block may also start on the line after the marker.
//! - A JSON object, bare or fenced, with a `tool_call` key:
//!   `{"tool_call": {"name": "rag_query", "args": {"query": "..."}}}`.
//!
//! Parsing is a pure function of the text: no marker yields
//! [`Signal::FinalAnswer`], a single well-formed call (possibly repeated
//! verbatim) yields [`Signal::ToolCall`], and anything else that carries a
//! marker yields [`Signal::Unparseable`].

use filings_models::{ParamMap, Signal, ToolCallSignal};
use serde_json::Value;

const MARKER_KEYWORDS: [&str; 2] = ["tool_call", "tool call"];

/// Interpret one assistant message.
pub fn parse_signal(text: &str) -> Signal {
    let mut calls: Vec<ToolCallSignal> = Vec::new();

    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        match parse_marker_line(text, line_start, line) {
            None => {}
            Some(Ok(call)) => calls.push(call),
            Some(Err(reason)) => return Signal::Unparseable { reason },
        }
    }

    for object in find_objects(text) {
        let Ok(value) = serde_json::from_str::<Value>(object) else {
            continue;
        };
        let Some(spec) = value.get("tool_call") else {
            continue;
        };
        match call_from_json(spec) {
            Ok(call) => calls.push(call),
            Err(reason) => return Signal::Unparseable { reason },
        }
    }

    match calls.as_slice() {
        [] => Signal::FinalAnswer(text.trim().to_string()),
        [first, rest @ ..] => {
            if rest.iter().all(|c| c == first) {
                Signal::ToolCall(first.clone())
            } else {
                Signal::Unparseable {
                    reason: format!(
                        "{} different tool calls in one reply; send exactly one",
                        calls.len()
                    ),
                }
            }
        }
    }
}

/// `None` when the line carries no marker.
fn parse_marker_line(
    text: &str,
    line_start: usize,
    line: &str,
) -> Option<Result<ToolCallSignal, String>> {
    let head = line.trim_start_matches(|c: char| {
        c.is_whitespace() || is_decoration(c) || c == '>' || c == '-'
    });
    let lower = head.to_ascii_lowercase();
    let keyword = MARKER_KEYWORDS.iter().find(|k| lower.starts_with(*k))?;

    let after_keyword =
        head[keyword.len()..].trim_start_matches(|c: char| is_decoration(c) || c == ' ');
    let after_colon = after_keyword.strip_prefix(':')?;
    let rest = after_colon.trim_start_matches(is_padding);

    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    let name = &rest[..name_len];
    if name.is_empty() {
        return Some(Err("tool-call marker without a tool name".to_string()));
    }

    let after_name = rest[name_len..].trim_start_matches(is_padding);
    let abs = line_start + (line.len() - after_name.len());

    let parameters = match after_name.chars().next() {
        Some('(') => parse_call_args(&text[abs..]),
        Some('{') => parse_json_block(&text[abs..]),
        None | Some('\n') | Some('\r') => {
            let following = text[abs..].trim_start();
            let following = following
                .strip_prefix("```json")
                .or_else(|| following.strip_prefix("```"))
                .unwrap_or(following)
                .trim_start();
            if following.starts_with('{') {
                parse_json_block(following)
            } else {
                Ok(ParamMap::new())
            }
        }
        Some(other) => Err(format!(
            "unexpected '{other}' after tool name '{name}'; expected a JSON object or (key=value) list"
        )),
    };

    Some(parameters.map(|parameters| ToolCallSignal {
        tool_name: name.to_string(),
        parameters,
    }))
}

fn is_decoration(c: char) -> bool {
    c == '*' || c == '`'
}

fn is_padding(c: char) -> bool {
    is_decoration(c) || c == ' ' || c == '\t'
}

fn parse_json_block(text: &str) -> Result<ParamMap, String> {
    let object = find_objects(text)
        .into_iter()
        .next()
        .ok_or_else(|| "unterminated JSON parameter block".to_string())?;
    let value: Value = serde_json::from_str(object)
        .map_err(|e| format!("parameter block is not valid JSON: {e}"))?;
    params_from_value(&value)
}

/// `(key="value", key2=3)`; values may be single- or double-quoted or bare.
fn parse_call_args(text: &str) -> Result<ParamMap, String> {
    let mut params = ParamMap::new();
    let mut chars = text.char_indices().peekable();
    // Opening parenthesis.
    chars.next();

    loop {
        while chars.peek().is_some_and(|(_, c)| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        match chars.peek() {
            None => return Err("unterminated parameter list".to_string()),
            Some((_, ')')) => return Ok(params),
            _ => {}
        }

        let mut key = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                key.push(c);
                chars.next();
            } else {
                break;
            }
        }
        if key.is_empty() {
            return Err("parameter list has an entry without a name".to_string());
        }

        while chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some((_, '=')) | Some((_, ':')) => {}
            _ => return Err(format!("parameter '{key}' has no value")),
        }
        while chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            chars.next();
        }

        let value = match chars.peek() {
            Some(&(_, quote @ ('"' | '\''))) => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == '\\' {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    } else if c == quote {
                        closed = true;
                        break;
                    } else {
                        value.push(c);
                    }
                }
                if !closed {
                    return Err(format!("unterminated string for parameter '{key}'"));
                }
                value
            }
            _ => {
                let mut value = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c == ',' || c == ')' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value.trim().to_string()
            }
        };

        if value != "null" {
            params.insert(key, value);
        }
    }
}

fn call_from_json(spec: &Value) -> Result<ToolCallSignal, String> {
    let name = spec
        .get("name")
        .or_else(|| spec.get("tool"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "`tool_call` object has no tool name".to_string())?;

    let parameters = match ["args", "arguments", "parameters"]
        .iter()
        .find_map(|key| spec.get(*key))
    {
        None | Some(Value::Null) => ParamMap::new(),
        Some(value) => params_from_value(value)?,
    };

    Ok(ToolCallSignal {
        tool_name: name.to_string(),
        parameters,
    })
}

/// Flatten a JSON object into string parameters. Nulls are dropped, scalars
/// use their display form and nested values keep their JSON text.
fn params_from_value(value: &Value) -> Result<ParamMap, String> {
    let Value::Object(map) = value else {
        return Err("tool parameters must be a JSON object".to_string());
    };

    let mut params = ParamMap::new();
    for (key, value) in map {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            nested => nested.to_string(),
        };
        params.insert(key.clone(), text);
    }
    Ok(params)
}

/// Every top-level balanced `{ ... }` in the text, skipping braces inside
/// JSON strings.
fn find_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' if depth > 0 => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        objects.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    objects
}
