use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use super::model::value_to_plain_string;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^}]+)\}").expect("placeholder pattern compiles"));

/// Substitutes `{path.to.value}` placeholders from `context`.
///
/// Placeholders whose path does not resolve to a non-null value are left
/// in the output verbatim, braces included.
pub fn render(template: &str, context: &Value) -> String {
    if template.is_empty() {
        return String::new();
    }

    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            match lookup(context, &caps[1]) {
                Some(value) => value_to_plain_string(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

pub fn render_opt(template: Option<&str>, context: &Value) -> Option<String> {
    template.map(|template| render(template, context))
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn context() -> Value {
        json!({
            "user": {"id": "1", "name": "alice", "mention": "<@1>"},
            "target": {"id": null},
            "details": {"count": 3, "flag": true, "tags": ["a", "b"], "nested": {"x": 1}}
        })
    }

    #[test]
    fn substitutes_known_paths() {
        assert_eq!(
            render("Welcome {user.mention} ({user.name})", &context()),
            "Welcome <@1> (alice)"
        );
    }

    #[test]
    fn unresolvable_placeholder_is_preserved() {
        let ctx = json!({"user": {"id": "1"}});
        assert_eq!(render("Hello {user.nickname}", &ctx), "Hello {user.nickname}");
    }

    #[test]
    fn null_intermediate_keeps_placeholder() {
        assert_eq!(render("{target.id.value}", &context()), "{target.id.value}");
        assert_eq!(render("{target.id}", &context()), "{target.id}");
        assert_eq!(render("{missing.deep.path}", &context()), "{missing.deep.path}");
    }

    #[test]
    fn non_string_values_are_plainly_stringified() {
        let ctx = context();
        assert_eq!(render("{details.count}", &ctx), "3");
        assert_eq!(render("{details.flag}", &ctx), "true");
        assert_eq!(render("{details.tags}", &ctx), "a,b");
        assert_eq!(render("{details.nested}", &ctx), "[object Object]");
    }

    #[test]
    fn empty_braces_are_not_placeholders() {
        assert_eq!(render("{} and {user.id}", &context()), "{} and 1");
    }

    #[test]
    fn rendering_is_idempotent_when_values_hold_no_placeholders() {
        let ctx = context();
        let template = "{user.name} hit {details.count} / {unknown.key}";
        let once = render(template, &ctx);
        assert_eq!(render(&once, &ctx), once);
    }

    #[test]
    fn empty_and_absent_templates_pass_through() {
        assert_eq!(render("", &context()), "");
        assert_eq!(render_opt(None, &context()), None);
    }
}
