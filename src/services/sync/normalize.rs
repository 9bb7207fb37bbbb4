// Value normalisation shared by the entity transformers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Trimmed, non-empty text form of a scalar.
pub fn text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Contact fields arrive as a string, a list of strings, or a list of
/// `{value|number|phone|email}` objects. Keep the first usable entry.
pub fn first_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Array(items) => match items.first()? {
            Value::Object(entry) => ["value", "number", "phone", "email"]
                .iter()
                .find_map(|key| text(entry.get(*key))),
            first => text(Some(first)),
        },
        other => text(Some(other)),
    }
}

pub fn digits_only(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Lenient boolean: `true`, `1`, `"yes"`, `"on"` and friends.
pub fn parse_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "sim"
        ),
        _ => false,
    }
}

/// Monetary amount with two decimal places. Accepts `150`, `"150.5"`,
/// `"150,50"` and `"1.500,50"`.
pub fn parse_money(value: &Value) -> Result<Option<Decimal>, String> {
    let raw = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.to_string(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => {
            let s = s.trim();
            if s.contains(',') && s.contains('.') {
                s.replace('.', "").replace(',', ".")
            } else {
                s.replace(',', ".")
            }
        }
        other => return Err(format!("invalid monetary value: {}", other)),
    };

    let mut amount = Decimal::from_str(&raw)
        .map_err(|_| format!("invalid monetary value: {}", raw))?;
    amount = amount.round_dp(2);
    amount.rescale(2);
    Ok(Some(amount))
}

/// Money as the string form stored in JSON records (`"150.00"`).
pub fn money_value(value: &Value) -> Result<Option<Value>, String> {
    Ok(parse_money(value)?.map(|amount| Value::String(amount.to_string())))
}

pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let raw = text(Some(value))?;

    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%d/%m/%Y") {
        return Some(date);
    }
    parse_datetime(value).map(|dt| dt.date_naive())
}

pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let raw = text(Some(value))?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn date_value(date: NaiveDate) -> Value {
    Value::String(date.format("%Y-%m-%d").to_string())
}

pub fn datetime_value(dt: DateTime<Utc>) -> Value {
    Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}
