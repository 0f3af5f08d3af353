//! Best-effort parsing of truncated JSON.
//!
//! Streaming tool arguments arrive as prefixes of a JSON document. This
//! module parses any such prefix into the closest complete value: strings
//! are terminated, unambiguous literal prefixes are completed, dangling
//! keys and separators are dropped, and open containers are closed. The
//! parser never fails; unsalvageable input degrades to `Value::Null`.

use serde_json::Value;

/// Parse a possibly-truncated JSON fragment into a best-effort value.
///
/// ```rust
/// use chatflow_core::partial_json::parse_partial;
/// use serde_json::json;
///
/// assert_eq!(parse_partial(r#"{"a":1}"#), json!({"a": 1}));
/// assert_eq!(parse_partial(r#"{"a":1,"b"#), json!({"a": 1}));
/// assert_eq!(parse_partial(r#"{"url": "https://x.te"#), json!({"url": "https://x.te"}));
/// assert_eq!(parse_partial("not json"), serde_json::Value::Null);
/// ```
#[must_use]
pub fn parse_partial(input: &str) -> Value {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return value;
    }
    if let Some(value) = try_complete(trimmed) {
        return value;
    }

    // Retreat to successively earlier separators and re-close from there.
    let mut cut = trimmed.len();
    while let Some(pos) = last_separator_before(trimmed, cut) {
        if let Some(value) = try_complete(trimmed[..pos].trim_end()) {
            return value;
        }
        cut = pos;
    }
    Value::Null
}

struct ScanState {
    /// Closing delimiters for every open container, innermost last.
    closers: Vec<char>,
    in_string: bool,
    /// The fragment ends on a dangling string escape.
    escaped: bool,
}

fn scan(fragment: &str) -> ScanState {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in fragment.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => closers.push('}'),
                '[' => closers.push(']'),
                '}' | ']' => {
                    closers.pop();
                }
                _ => {}
            }
        }
    }
    ScanState {
        closers,
        in_string,
        escaped,
    }
}

fn try_complete(fragment: &str) -> Option<Value> {
    if fragment.is_empty() {
        return None;
    }
    let state = scan(fragment);
    let mut out = fragment.to_string();

    if state.in_string {
        if state.escaped {
            out.pop();
        }
        out.push('"');
    } else {
        complete_trailing_literal(&mut out);
    }

    cleanup_tail(&mut out, &state.closers);
    for closer in state.closers.iter().rev() {
        out.push(*closer);
    }
    serde_json::from_str(&out).ok()
}

/// Complete an unambiguous trailing `true`/`false`/`null` prefix, or trim a
/// number back to its longest valid prefix.
fn complete_trailing_literal(out: &mut String) {
    let token_start = out
        .rfind(|c: char| "{[,:\"]} \t\r\n".contains(c))
        .map_or(0, |pos| pos + 1);
    let token = out[token_start..].to_string();
    if token.is_empty() {
        return;
    }

    for literal in ["true", "false", "null"] {
        if literal.starts_with(&token) {
            out.truncate(token_start);
            out.push_str(literal);
            return;
        }
    }

    if token.starts_with('-') || token.starts_with(|c: char| c.is_ascii_digit()) {
        let mut number = token;
        while !number.is_empty() && serde_json::from_str::<Value>(&number).is_err() {
            number.pop();
        }
        out.truncate(token_start);
        out.push_str(&number);
    }
}

/// Strip dangling separators and valueless keys from the tail.
fn cleanup_tail(out: &mut String, closers: &[char]) {
    let in_object = closers.last() == Some(&'}');
    loop {
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);

        if out.ends_with(',') {
            out.pop();
            continue;
        }
        if in_object && out.ends_with(':') {
            out.pop();
            drop_trailing_string(out);
            continue;
        }
        if in_object && out.ends_with('"') {
            // A string at the tail of an object is a dangling key when it
            // follows `{` or `,` rather than `:`.
            if let Some(start) = trailing_string_start(out) {
                let before = out[..start].trim_end().chars().last();
                if matches!(before, Some('{') | Some(',')) {
                    drop_trailing_string(out);
                    continue;
                }
            }
        }
        break;
    }
}

/// Byte offset of the opening quote of a complete string ending the fragment.
fn trailing_string_start(out: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    let mut last_complete = None;
    for (i, c) in out.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                last_complete = Some((start, i + 1));
            }
        } else if c == '"' {
            in_string = true;
            start = i;
        }
    }
    match last_complete {
        Some((s, e)) if e == out.len() => Some(s),
        _ => None,
    }
}

fn drop_trailing_string(out: &mut String) {
    if let Some(start) = trailing_string_start(out) {
        out.truncate(start);
    }
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
}

/// Last top-level-or-nested comma (outside strings) before `cut`.
fn last_separator_before(fragment: &str, cut: usize) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    let mut last = None;
    for (i, c) in fragment.char_indices() {
        if i >= cut {
            break;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if c == ',' {
            last = Some(i);
        }
    }
    last
}
