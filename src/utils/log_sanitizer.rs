// ============================================================================
// Log Sanitization
// ============================================================================
//
// Remote payloads, operator input and API error bodies all end up in logs.
// Everything that is not produced by this process goes through these helpers
// first:
//
// - control characters and ANSI escapes are stripped so a crafted customer
//   name cannot forge log lines
// - long values are truncated
// - credential-looking keys inside JSON payloads are replaced before the
//   payload is printed
//
// ============================================================================

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Maximum number of characters kept from a single logged value
const MAX_LOG_LENGTH: usize = 200;

static ANSI_ESCAPE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("ANSI escape pattern is valid")
});

/// JSON keys whose values never reach a log line.
static SENSITIVE_KEY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(token|secret|password|api_?key|authorization)")
        .expect("sensitive key pattern is valid")
});

/// Sanitize untrusted text for logging.
///
/// ```
/// use fieldsync::utils::log_sanitizer::sanitize_for_log;
///
/// assert_eq!(
///     sanitize_for_log("ACME\nINFO: fake entry"),
///     "ACME INFO: fake entry"
/// );
/// assert_eq!(sanitize_for_log("test\x1b[31mred\x1b[0m"), "testred");
/// ```
pub fn sanitize_for_log(input: &str) -> String {
    let no_ansi = ANSI_ESCAPE_REGEX.replace_all(input, "");

    let cleaned: String = no_ansi
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            other => other,
        })
        .filter(|c| !c.is_control())
        .collect();

    truncate_chars(cleaned, MAX_LOG_LENGTH)
}

pub fn sanitize_option_for_log(input: &Option<String>) -> String {
    match input {
        Some(value) => sanitize_for_log(value),
        None => "None".to_string(),
    }
}

/// Show only the last four characters of a secret.
///
/// ```
/// use fieldsync::utils::log_sanitizer::mask_secret;
///
/// assert_eq!(mask_secret("abcdef123456"), "********3456");
/// assert_eq!(mask_secret("abc"), "***");
/// assert_eq!(mask_secret(""), "");
/// ```
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

/// Render a JSON payload for logging with credential fields replaced.
pub fn redact_payload(payload: &Value) -> String {
    let mut redacted = payload.clone();
    redact_in_place(&mut redacted);
    sanitize_for_log(&redacted.to_string())
}

fn redact_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if SENSITIVE_KEY_REGEX.is_match(key) {
                    *inner = Value::String("[REDACTED]".to_string());
                } else {
                    redact_in_place(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_in_place),
        _ => {}
    }
}

fn truncate_chars(input: String, max: usize) -> String {
    match input.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &input[..cut]),
        None => input,
    }
}
