//! Coercion of loosely typed action parameters.

use serde_json::Value;

use super::model::{Event, value_to_plain_string};

const OPTION_PREFIX: &str = "option:";

/// Resolves a numeric action parameter, falling back to `default`.
pub fn resolve_number(config: Option<&Value>, event: &Event, default: f64) -> f64 {
    try_resolve_number(config, event).unwrap_or(default)
}

/// Resolves a numeric action parameter.
///
/// Numbers pass through. Strings of the form `option:<name>` read the
/// command option of that name; any other string is parsed for a leading
/// decimal number. Null, empty and non-numeric inputs yield `None`.
pub fn try_resolve_number(config: Option<&Value>, event: &Event) -> Option<f64> {
    match config? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => match text.strip_prefix(OPTION_PREFIX) {
            Some(name) => event.option_value(name).and_then(|value| match value {
                Value::Number(number) => number.as_f64(),
                other => parse_leading_float(&value_to_plain_string(other)),
            }),
            None => parse_leading_float(text),
        },
        _ => None,
    }
}

/// Picks the user an action applies to.
///
/// Without an explicit source the actor is preferred, then the target.
/// Unknown sources and unresolved options fall back to the actor.
pub fn resolve_target_user(source: Option<&Value>, event: &Event) -> Option<String> {
    let actor = non_empty(event.actor_id.as_deref());

    let source = match source.map(value_to_plain_string) {
        Some(source) if !source.is_empty() && source != "null" => source,
        _ => return actor.or_else(|| non_empty(event.target_id.as_deref())),
    };

    match source.as_str() {
        "actor" | "invoker" => actor,
        "target" => non_empty(event.target_id.as_deref()),
        other => other
            .strip_prefix(OPTION_PREFIX)
            .and_then(|name| event.option_value(name))
            .map(value_to_plain_string)
            .or(actor),
    }
}

fn non_empty(id: Option<&str>) -> Option<String> {
    id.filter(|id| !id.is_empty()).map(str::to_string)
}

/// Parses the longest decimal prefix of `text`, ignoring leading whitespace.
fn parse_leading_float(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digit_count = end - digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        let fraction_start = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        digit_count += end - fraction_start;
    }
    if digit_count == 0 {
        let rest = &text[digits_start..];
        return rest.starts_with("Infinity").then(|| {
            if text.starts_with('-') {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            }
        });
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    text[..end].parse().ok()
}
