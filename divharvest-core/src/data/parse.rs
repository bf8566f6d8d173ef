//! Normalization of the display strings Nasdaq-style APIs return for numbers
//! and dates (`"$1.23"`, `"3.45%"`, `"1,234,567"`, `"N/A"`, `"02/07/2025"`).

use chrono::NaiveDate;
use serde_json::Value;

/// Parse a display-formatted number. Returns `None` for placeholders and
/// anything that does not yield a finite value.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || matches!(trimmed, "N/A" | "NA" | "--" | "-") {
        return None;
    }
    let negative = trimmed.starts_with('(') && trimmed.ends_with(')');
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '$' | '%' | ',' | '(' | ')' | ' ' | '+'))
        .collect();
    let v: f64 = cleaned.parse().ok()?;
    if !v.is_finite() {
        return None;
    }
    Some(if negative { -v } else { v })
}

/// Numeric view of a JSON value that may be a number or a display string.
pub fn value_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Text view of a JSON value; blanks and placeholders are `None`.
pub fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() || t == "N/A" {
                None
            } else {
                Some(t.to_string())
            }
        }
        _ => None,
    }
}

/// Parse `MM/DD/YYYY` (Nasdaq) or ISO `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    NaiveDate::parse_from_str(t, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(t, "%Y-%m-%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_currency_percent_and_grouping() {
        assert_eq!(parse_number("$1.23"), Some(1.23));
        assert_eq!(parse_number("3.45%"), Some(3.45));
        assert_eq!(parse_number("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_number(" -0.5 "), Some(-0.5));
        assert_eq!(parse_number("(2.00)"), Some(-2.0));
    }

    #[test]
    fn placeholders_are_none() {
        for raw in ["", "N/A", "--", "abc", "NaN", "inf"] {
            assert_eq!(parse_number(raw), None, "{raw:?}");
        }
    }

    #[test]
    fn value_helpers() {
        assert_eq!(value_number(&json!(2.5)), Some(2.5));
        assert_eq!(value_number(&json!("2.5%")), Some(2.5));
        assert_eq!(value_number(&json!(null)), None);
        assert_eq!(value_text(&json!(" Energy ")), Some("Energy".into()));
        assert_eq!(value_text(&json!("N/A")), None);
    }

    #[test]
    fn dates_in_both_formats() {
        let d = NaiveDate::from_ymd_opt(2025, 2, 7).unwrap();
        assert_eq!(parse_date("02/07/2025"), Some(d));
        assert_eq!(parse_date("2025-02-07"), Some(d));
        assert_eq!(parse_date("N/A"), None);
    }
}
