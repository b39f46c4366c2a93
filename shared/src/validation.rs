//! Input normalisation for action parameters
//!
//! Action bodies arrive as loosely typed JSON. These helpers turn raw values
//! into the clamped integers and trimmed strings the handlers work with.

use serde_json::Value;

/// Maximum quantity accepted for a single line
pub const MAX_LINE_QTY: i64 = 100_000;
/// Maximum number of boxes recorded for a shipment
pub const MAX_BOXES: i64 = 1_000;

pub const SEARCH_MIN_CHARS: usize = 2;
pub const SEARCH_DEFAULT_LIMIT: i64 = 20;
pub const SEARCH_MIN_LIMIT: i64 = 5;
pub const SEARCH_MAX_LIMIT: i64 = 100;

// ============================================================================
// Coercion
// ============================================================================

/// Read a JSON value as an integer the way a form field would be read:
/// numbers are truncated, numeric strings parsed, everything else is 0.
pub fn as_int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        Some(Value::Bool(true)) => 1,
        _ => 0,
    }
}

/// Read a JSON value as a truthy flag
pub fn as_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        _ => false,
    }
}

/// Clamp an integer into `[min, max]`
pub fn clamp_int(value: i64, min: i64, max: i64) -> i64 {
    value.clamp(min, max)
}

/// Trimmed string, or `None` when missing or blank
pub fn non_blank(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Trimmed string from a JSON value; numbers are stringified
pub fn value_str(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => non_blank(Some(s)),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

// ============================================================================
// Field rules
// ============================================================================

/// Positive row id, or `None`
pub fn positive_id(value: Option<&Value>) -> Option<i64> {
    let id = as_int(value);
    (id > 0).then_some(id)
}

/// Quantity for a newly added line
pub fn line_add_qty(value: Option<&Value>) -> i64 {
    clamp_int(as_int(value), 1, MAX_LINE_QTY)
}

/// Quantity for an edited line, where zero is meaningful
pub fn line_edit_qty(value: Option<&Value>) -> i64 {
    clamp_int(as_int(value), 0, MAX_LINE_QTY)
}

/// Box count for a shipment, defaulting to one box
pub fn box_count(value: Option<&Value>) -> i64 {
    match value {
        None | Some(Value::Null) => 1,
        v => clamp_int(as_int(v), 0, MAX_BOXES),
    }
}

/// Normalised product search query; `None` means "return no results"
pub fn search_query(value: Option<&Value>) -> Option<String> {
    value_str(value).filter(|q| q.chars().count() >= SEARCH_MIN_CHARS)
}

pub fn search_limit(value: Option<&Value>) -> i64 {
    match value {
        None | Some(Value::Null) => SEARCH_DEFAULT_LIMIT,
        v => clamp_int(as_int(v), SEARCH_MIN_LIMIT, SEARCH_MAX_LIMIT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_int_coercion() {
        assert_eq!(as_int(Some(&json!(5))), 5);
        assert_eq!(as_int(Some(&json!("12"))), 12);
        assert_eq!(as_int(Some(&json!(" 7 "))), 7);
        assert_eq!(as_int(Some(&json!(3.9))), 3);
        assert_eq!(as_int(Some(&json!("abc"))), 0);
        assert_eq!(as_int(None), 0);
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  abc ")), Some("abc".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_line_quantities() {
        assert_eq!(line_add_qty(Some(&json!(0))), 1);
        assert_eq!(line_add_qty(Some(&json!(250_000))), MAX_LINE_QTY);
        assert_eq!(line_edit_qty(Some(&json!(-3))), 0);
    }

    #[test]
    fn test_box_count_defaults_to_one() {
        assert_eq!(box_count(None), 1);
        assert_eq!(box_count(Some(&json!(0))), 0);
        assert_eq!(box_count(Some(&json!(5000))), MAX_BOXES);
    }

    #[test]
    fn test_search_rules() {
        assert_eq!(search_query(Some(&json!("a"))), None);
        assert_eq!(search_query(Some(&json!(" ab "))), Some("ab".to_string()));
        assert_eq!(search_limit(None), 20);
        assert_eq!(search_limit(Some(&json!(1))), 5);
        assert_eq!(search_limit(Some(&json!(500))), 100);
    }

    #[test]
    fn test_positive_id() {
        assert_eq!(positive_id(Some(&json!(0))), None);
        assert_eq!(positive_id(Some(&json!("42"))), Some(42));
    }

    #[test]
    fn test_flags() {
        assert!(as_flag(Some(&json!(true))));
        assert!(as_flag(Some(&json!(1))));
        assert!(!as_flag(Some(&json!("0"))));
        assert!(!as_flag(None));
    }
}
