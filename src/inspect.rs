use serde_json::Value;

// Fields checked, in priority order, when digging an error message out of a
// response body.
const ERROR_FIELDS: [&str; 5] = ["message", "error", "errorMessage", "detail", "details"];

/// Result of looking up a path inside a response body.
///
/// `Absent` means the document parsed but the path led nowhere; `Malformed`
/// means the body was not JSON at all. Callers branch on the variant, nothing
/// in this module ever raises.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Present(Value),
    Absent,
    Malformed,
}

impl Extracted {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Extracted::Present(value) => value.as_i64(),
            _ => None,
        }
    }
}

enum Segment {
    Key(String),
    Index(usize),
}

/// Looks up a dot/bracket path (`orders[0].id`, `quantity_available`, `$`)
/// inside a JSON body given as text.
pub fn extract(body: &str, path: &str) -> Extracted {
    let Ok(document) = serde_json::from_str::<Value>(body) else {
        return Extracted::Malformed;
    };

    extract_value(&document, path)
}

/// Same as [`extract`] but on an already-parsed document.
pub fn extract_value(document: &Value, path: &str) -> Extracted {
    let path = path.trim().trim_start_matches('$').trim_start_matches('.');
    if path.is_empty() {
        return Extracted::Present(document.clone());
    }

    let Some(segments) = segments(path) else {
        return Extracted::Absent;
    };

    let mut current = document;
    for segment in &segments {
        let next = match segment {
            Segment::Key(key) => current.get(key.as_str()),
            Segment::Index(index) => current.get(*index),
        };

        match next {
            Some(value) => current = value,
            None => return Extracted::Absent,
        }
    }

    Extracted::Present(current.clone())
}

/// Scans the array at `list_path` for the first element whose `id_field`
/// equals `id_value`. First match wins; a missing list, a non-array value or
/// no match all come back as `Absent`.
pub fn find_by_id(body: &str, list_path: &str, id_field: &str, id_value: &Value) -> Extracted {
    let list = match extract(body, list_path) {
        Extracted::Present(value) => value,
        other => return other,
    };

    let Value::Array(items) = list else {
        return Extracted::Absent;
    };

    for item in items {
        if item.get(id_field) == Some(id_value) {
            return Extracted::Present(item);
        }
    }

    Extracted::Absent
}

/// Digs an error message out of a response body, trying the common field
/// names in priority order and falling back to the raw body text.
pub fn error_message(body: &str) -> String {
    if let Ok(document) = serde_json::from_str::<Value>(body) {
        for field in ERROR_FIELDS {
            if let Some(text) = document.get(field).and_then(Value::as_str)
                && !text.trim().is_empty()
            {
                return text.to_string();
            }
        }
    }

    body.to_string()
}

fn segments(path: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();

    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }

        let Some(bracket) = part.find('[') else {
            segments.push(Segment::Key(part.to_string()));
            continue;
        };

        let (key, mut rest) = part.split_at(bracket);
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }

        while let Some(inner) = rest.strip_prefix('[') {
            let end = inner.find(']')?;
            let index = inner[..end].parse::<usize>().ok()?;
            segments.push(Segment::Index(index));
            rest = &inner[end + 1..];
        }

        if !rest.is_empty() {
            return None;
        }
    }

    Some(segments)
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::Extracted;
    use super::error_message;
    use super::extract;
    use super::find_by_id;

    const ENERGY_BODY: &str = r#"[
        {"id": 1, "energy_type": "gas", "quantity_available": 3000},
        {"id": 2, "energy_type": "nuclear", "quantity_available": 0},
        {"id": 3, "energy_type": "electric", "quantity_available": 4322}
    ]"#;

    #[test]
    fn extract_nested_path() {
        let body = r#"{"orders": [{"id": "abc", "fuel": "gas"}]}"#;

        assert_eq!(
            extract(body, "orders[0].id"),
            Extracted::Present(json!("abc"))
        );
        assert_eq!(extract(body, "orders[0].fuel"), Extracted::Present(json!("gas")));
    }

    #[test]
    fn extract_root_document() {
        assert_eq!(extract("{}", "$"), Extracted::Present(json!({})));
        assert_eq!(
            extract("[1, 2]", ""),
            Extracted::Present(json!([1, 2]))
        );
    }

    #[test]
    fn extract_root_array_index() {
        assert_eq!(extract(ENERGY_BODY, "[1].id"), Extracted::Present(json!(2)));
    }

    #[test]
    fn missing_path_is_absent_never_an_error() {
        let body = r#"{"orders": []}"#;

        assert_eq!(extract(body, "orders[0]"), Extracted::Absent);
        assert_eq!(extract(body, "nope"), Extracted::Absent);
        assert_eq!(extract(body, "orders.id.deep.deeper"), Extracted::Absent);
        assert_eq!(extract(body, "orders[not-a-number]"), Extracted::Absent);
    }

    #[test]
    fn unparsable_body_is_malformed() {
        assert_eq!(extract("<html>oops</html>", "id"), Extracted::Malformed);
        assert_eq!(extract("", "$"), Extracted::Malformed);
    }

    #[test]
    fn find_by_id_locates_the_record() {
        let found = find_by_id(ENERGY_BODY, "$", "id", &json!(3));

        let Extracted::Present(record) = found else {
            panic!("expected a record");
        };
        assert_eq!(record["quantity_available"], json!(4322));
    }

    #[test]
    fn find_by_id_first_match_wins_on_duplicates() {
        let body = r#"[
            {"id": 7, "quantity_available": 100},
            {"id": 7, "quantity_available": 999}
        ]"#;

        let Extracted::Present(record) = find_by_id(body, "$", "id", &json!(7)) else {
            panic!("expected a record");
        };
        assert_eq!(record["quantity_available"], json!(100));
    }

    #[test]
    fn find_by_id_on_empty_list_is_absent() {
        assert_eq!(find_by_id("[]", "$", "id", &json!(1)), Extracted::Absent);
    }

    #[test]
    fn find_by_id_without_a_match_is_absent() {
        assert_eq!(
            find_by_id(ENERGY_BODY, "$", "id", &json!(42)),
            Extracted::Absent
        );
    }

    #[test]
    fn find_by_id_on_non_array_is_absent() {
        assert_eq!(
            find_by_id(r#"{"id": 1}"#, "$", "id", &json!(1)),
            Extracted::Absent
        );
    }

    #[test]
    fn find_by_id_on_malformed_body_is_malformed() {
        assert_eq!(
            find_by_id("not json", "$", "id", &json!(1)),
            Extracted::Malformed
        );
    }

    #[test]
    fn error_message_priority_order() {
        let body = r#"{"detail": "low priority", "message": "top priority"}"#;
        assert_eq!(error_message(body), "top priority");

        let body = r#"{"errorMessage": "mid", "details": "low"}"#;
        assert_eq!(error_message(body), "mid");
    }

    #[test]
    fn error_message_skips_empty_fields() {
        let body = r#"{"message": "  ", "error": "real error"}"#;
        assert_eq!(error_message(body), "real error");
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(error_message("Bad Request"), "Bad Request");
        assert_eq!(error_message(r#"{"status": 500}"#), r#"{"status": 500}"#);
    }
}
