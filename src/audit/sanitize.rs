//! Redaction of secrets before they reach the audit log.
//!
//! Service environments commonly carry API keys, and command lines
//! sometimes carry `--token=...` or `--token xyz` style flags.

use serde_json::{Map, Value};

/// Key fragments whose values are redacted.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "key",
    "token",
    "credential",
    "auth",
];

const REDACTED: &str = "[REDACTED]";

fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|s| key.contains(s))
}

/// Sanitize a serialized service spec (or any JSON value).
///
/// Object values under sensitive keys are replaced, and strings shaped
/// like `name=value` or `--name=value` have the value replaced when the
/// name is sensitive. In arrays, the item after a sensitive flag such as
/// `--token` is replaced too.
pub fn sanitize_params(params: &Value) -> Value {
    match params {
        Value::Object(map) => {
            let mut sanitized = Map::new();
            for (key, val) in map {
                let val = if is_sensitive(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    sanitize_params(val)
                };
                sanitized.insert(key.clone(), val);
            }
            Value::Object(sanitized)
        }
        Value::Array(items) => Value::Array(sanitize_args(items)),
        Value::String(s) => Value::String(sanitize_assignment(s)),
        _ => params.clone(),
    }
}

fn sanitize_args(items: &[Value]) -> Vec<Value> {
    let mut sanitized = Vec::with_capacity(items.len());
    let mut redact_next = false;
    for item in items {
        if redact_next && item.is_string() {
            sanitized.push(Value::String(REDACTED.to_string()));
            redact_next = false;
            continue;
        }
        redact_next = item.as_str().is_some_and(is_sensitive_flag);
        sanitized.push(sanitize_params(item));
    }
    sanitized
}

/// A bare flag (`--token`, `-p`) whose value is the next argument.
fn is_sensitive_flag(arg: &str) -> bool {
    let name = arg.trim_start_matches('-');
    arg.starts_with('-') && !name.is_empty() && !arg.contains('=') && is_sensitive(name)
}

fn sanitize_assignment(s: &str) -> String {
    match s.split_once('=') {
        Some((name, _)) if is_sensitive(name.trim_start_matches('-')) => {
            format!("{}={}", name, REDACTED)
        }
        _ => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_environment_secrets_redacted() {
        let params = json!({
            "name": "gemini-api",
            "environment": {
                "GEMINI_API_KEY": "abc123",
                "PORT": "8000",
                "DB_PASSWORD": "hunter2"
            }
        });
        let sanitized = sanitize_params(&params);
        assert_eq!(sanitized["name"], "gemini-api");
        assert_eq!(sanitized["environment"]["GEMINI_API_KEY"], REDACTED);
        assert_eq!(sanitized["environment"]["DB_PASSWORD"], REDACTED);
        assert_eq!(sanitized["environment"]["PORT"], "8000");
    }

    #[test]
    fn test_flag_values_redacted() {
        let params = json!({
            "args": ["server.py", "--token=xyz", "--port=8000", "API_SECRET=s"]
        });
        let sanitized = sanitize_params(&params);
        assert_eq!(
            sanitized["args"],
            json!(["server.py", "--token=[REDACTED]", "--port=8000", "API_SECRET=[REDACTED]"])
        );
    }

    #[test]
    fn test_value_after_sensitive_flag_redacted() {
        let params = json!({
            "args": ["server.py", "--token", "xyz", "--port", "8000", "--api-key", "k", "--password"]
        });
        let sanitized = sanitize_params(&params);
        assert_eq!(
            sanitized["args"],
            json!([
                "server.py", "--token", REDACTED, "--port", "8000", "--api-key", REDACTED,
                "--password"
            ])
        );
    }

    #[test]
    fn test_secret_flag_followed_by_flag_is_still_hidden() {
        let sanitized = sanitize_params(&json!(["--secret", "--verbose"]));
        assert_eq!(sanitized, json!(["--secret", REDACTED]));
    }

    #[test]
    fn test_case_insensitive() {
        let params = json!({"Auth_Header": "Bearer x", "SECRET": {"nested": 1}});
        let sanitized = sanitize_params(&params);
        assert_eq!(sanitized["Auth_Header"], REDACTED);
        assert_eq!(sanitized["SECRET"], REDACTED);
    }

    #[test]
    fn test_other_values_preserved() {
        let params = json!({"port": 8000, "restart_after_resume": true, "path": "/srv/app"});
        assert_eq!(sanitize_params(&params), params);
    }
}
