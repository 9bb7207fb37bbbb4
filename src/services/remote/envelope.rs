// Response envelope probing
// The remote API wraps payloads inconsistently across endpoints. Each probe
// below is an ordered list of JSON paths; the first path holding a value of
// the expected shape wins.

use serde_json::Value;

const TOKEN_PATHS: &[&[&str]] = &[
    &["result", "accessToken"],
    &["result", "token"],
    &["accessToken"],
    &["token"],
];

// The empty path is the response itself (a bare JSON array).
const RECORD_PATHS: &[&[&str]] = &[
    &["result", "entityList"],
    &["result", "list"],
    &["result", "customerList"],
    &["result", "customers"],
    &["result", "data"],
    &["result", "items"],
    &["result", "results"],
    &["result"],
    &["data"],
    &[],
];

const COUNT_PATHS: &[&[&str]] = &[
    &["result", "totalCount"],
    &["result", "total"],
    &["totalCount"],
];

const CREATED_ID_PATHS: &[&[&str]] = &[&["result", "id"], &["id"], &["data", "id"]];

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(key))
}

/// Bearer token from a login response.
pub fn extract_token(response: &Value) -> Option<String> {
    TOKEN_PATHS
        .iter()
        .filter_map(|path| lookup(response, path))
        .filter_map(Value::as_str)
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

/// Record list from a list response. `None` when no probed path holds a list.
pub fn extract_records(response: &Value) -> Option<&Vec<Value>> {
    RECORD_PATHS
        .iter()
        .filter_map(|path| lookup(response, path))
        .find_map(Value::as_array)
}

/// Total record count advertised by a list response, 0 when absent.
pub fn extract_count(response: &Value) -> i64 {
    COUNT_PATHS
        .iter()
        .filter_map(|path| lookup(response, path))
        .find_map(as_integer)
        .unwrap_or(0)
}

/// Identifier the remote assigned to a record we just created.
pub fn extract_created_id(response: &Value) -> Option<i64> {
    CREATED_ID_PATHS
        .iter()
        .filter_map(|path| lookup(response, path))
        .find_map(as_integer)
}

/// Integers arrive as numbers or numeric strings depending on the endpoint.
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
