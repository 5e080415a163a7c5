use serde_json::Value;

pub fn ts_hm() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// First of `keys` present on `v` that parses as a number, accepting both
/// JSON numbers and numeric strings (venues disagree on which they send).
pub fn value_f64(v: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match v.get(key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Ok(parsed) = s.parse::<f64>() {
                    return Some(parsed);
                }
            }
            _ => {}
        }
    }
    None
}

/// First of `keys` present on `v` as a string (numbers are stringified).
pub fn value_str(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match v.get(key) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_f64_fallback_chain() {
        let v = json!({"filled_amount": "12.5", "left": 3});
        assert_eq!(value_f64(&v, &["filledAmount", "filled_amount"]), Some(12.5));
        assert_eq!(value_f64(&v, &["left"]), Some(3.0));
        assert_eq!(value_f64(&v, &["missing"]), None);
    }

    #[test]
    fn test_value_str_stringifies_numbers() {
        let v = json!({"id": 987654321});
        assert_eq!(value_str(&v, &["id"]), Some("987654321".to_string()));
    }
}
