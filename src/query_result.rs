//! MySQL batch output parsing and result-set comparison

use serde_json::{Map, Number, Value};

/// Parse `mysql --batch --raw` output (tab separated, header row first)
/// into an array of row objects.
pub fn parse_batch_output(stdout: &str) -> Value {
    let mut lines = stdout.lines().filter(|l| !l.is_empty());
    let header: Vec<&str> = match lines.next() {
        Some(h) => h.split('\t').collect(),
        None => return Value::Array(Vec::new()),
    };

    let rows = lines
        .map(|line| {
            let mut row = Map::new();
            for (i, cell) in line.split('\t').enumerate() {
                let column = header
                    .get(i)
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| format!("column_{}", i + 1));
                row.insert(column, coerce_cell(cell));
            }
            Value::Object(row)
        })
        .collect();

    Value::Array(rows)
}

/// `NULL` -> null, integers and decimals -> numbers, everything else stays text
fn coerce_cell(cell: &str) -> Value {
    if cell == "NULL" {
        return Value::Null;
    }
    if has_padding(cell) {
        return Value::String(cell.to_string());
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Number(i.into());
    }
    if looks_decimal(cell) {
        if let Some(n) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(cell.to_string())
}

/// `+5`, `007` and `-01.5` are text (zip codes, codes with padding), `0` and `0.5` are not
fn has_padding(cell: &str) -> bool {
    let digits = cell.strip_prefix('-').unwrap_or(cell);
    cell.starts_with('+') || (digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0."))
}

// f64::from_str accepts "inf", "NaN" and "1e5"; only plain decimals count here
fn looks_decimal(cell: &str) -> bool {
    let digits = cell.strip_prefix('-').unwrap_or(cell);
    !digits.is_empty()
        && digits.chars().filter(|c| *c == '.').count() == 1
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && !digits.starts_with('.')
        && !digits.ends_with('.')
}

/// Compare an actual result against the expected one.
///
/// Lists of rows match when lengths agree and every expected row pairs with
/// a distinct equal actual row; positionally when `order_sensitive`.
pub fn compare_results(actual: &Value, expected: &Value, order_sensitive: bool) -> bool {
    match (actual, expected) {
        (Value::Array(a), Value::Array(e)) => {
            if a.len() != e.len() {
                return false;
            }
            if order_sensitive {
                return a.iter().zip(e).all(|(x, y)| values_equal(x, y));
            }
            // values_equal is not transitive ("0.50" ~ 0.5 ~ ".5"), so a first-fit
            // assignment can miss a pairing; match rows with augmenting paths instead
            let candidates: Vec<Vec<usize>> = e
                .iter()
                .map(|expected_row| {
                    a.iter()
                        .enumerate()
                        .filter(|(_, actual_row)| values_equal(actual_row, expected_row))
                        .map(|(i, _)| i)
                        .collect()
                })
                .collect();
            let mut owner = vec![None; a.len()];
            (0..e.len()).all(|row| {
                let mut seen = vec![false; a.len()];
                assign_row(row, &candidates, &mut owner, &mut seen)
            })
        }
        _ => values_equal(actual, expected),
    }
}

/// Give expected `row` an actual row, moving earlier assignments along if needed
fn assign_row(
    row: usize,
    candidates: &[Vec<usize>],
    owner: &mut [Option<usize>],
    seen: &mut [bool],
) -> bool {
    for &slot in &candidates[row] {
        if seen[slot] {
            continue;
        }
        seen[slot] = true;
        let free = match owner[slot] {
            None => true,
            Some(other) => assign_row(other, candidates, owner, seen),
        };
        if free {
            owner[slot] = Some(row);
            return true;
        }
    }
    false
}

/// Structural equality where numbers compare by value and a numeric string
/// equals the number it spells.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .zip(n.as_f64())
            .is_some_and(|(parsed, number)| parsed == number),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => x == y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_empty_output() {
        assert_eq!(parse_batch_output(""), json!([]));
        assert_eq!(parse_batch_output("\n"), json!([]));
    }

    #[test]
    fn test_parse_header_only() {
        assert_eq!(parse_batch_output("id\tname\n"), json!([]));
    }

    #[test]
    fn test_parse_typed_cells() {
        let out = "id\tname\tage\tprice\n1\tAlice Johnson\t28\t999.99\n2\tBob Smith\tNULL\t25.50\n";
        assert_eq!(
            parse_batch_output(out),
            json!([
                {"id": 1, "name": "Alice Johnson", "age": 28, "price": 999.99},
                {"id": 2, "name": "Bob Smith", "age": null, "price": 25.5},
            ])
        );
    }

    #[test]
    fn test_parse_keeps_non_numeric_text() {
        let out = "v\n1e5\ninf\n.5\n2024-01-01 10:00:00\n";
        assert_eq!(
            parse_batch_output(out),
            json!([{"v": "1e5"}, {"v": "inf"}, {"v": ".5"}, {"v": "2024-01-01 10:00:00"}])
        );
    }

    #[test]
    fn test_parse_negative_numbers() {
        assert_eq!(parse_batch_output("n\n-3\n-0.25\n"), json!([{"n": -3}, {"n": -0.25}]));
    }

    #[test]
    fn test_compare_count_query() {
        let actual = parse_batch_output("user_count\n4\n");
        assert!(compare_results(&actual, &json!([{"user_count": 4}]), false));
        assert!(!compare_results(&actual, &json!([{"user_count": 5}]), false));
    }

    #[test]
    fn test_compare_ignores_order_by_default() {
        let actual = json!([{"name": "b"}, {"name": "a"}]);
        let expected = json!([{"name": "a"}, {"name": "b"}]);
        assert!(compare_results(&actual, &expected, false));
        assert!(!compare_results(&actual, &expected, true));
    }

    #[test]
    fn test_compare_length_mismatch() {
        assert!(!compare_results(&json!([{"a": 1}]), &json!([{"a": 1}, {"a": 1}]), false));
    }

    #[test]
    fn test_compare_duplicates_are_counted() {
        let actual = json!([{"a": 1}, {"a": 1}, {"a": 2}]);
        assert!(!compare_results(&actual, &json!([{"a": 1}, {"a": 2}, {"a": 2}]), false));
        assert!(compare_results(&actual, &json!([{"a": 2}, {"a": 1}, {"a": 1}]), false));
    }

    #[test]
    fn test_compare_finds_pairing_across_numeric_spellings() {
        let actual = parse_batch_output("v\n0.5\n.5\n");
        assert_eq!(actual, json!([{"v": 0.5}, {"v": ".5"}]));
        let expected = json!([{"v": 0.5}, {"v": "0.50"}]);
        assert!(compare_results(&actual, &expected, false));
    }

    #[test]
    fn test_parse_keeps_padded_numbers_as_text() {
        let out = "code\n007\n+5\n-01\n0\n0.25\n00.5\n";
        assert_eq!(
            parse_batch_output(out),
            json!([{"code": "007"}, {"code": "+5"}, {"code": "-01"}, {"code": 0}, {"code": 0.25}, {"code": "00.5"}])
        );
    }

    #[test]
    fn test_values_equal_numeric_forms() {
        assert!(values_equal(&json!(4), &json!(4.0)));
        assert!(values_equal(&json!("999.99"), &json!(999.99)));
        assert!(!values_equal(&json!("abc"), &json!(1)));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_compare_non_list_shapes() {
        assert!(compare_results(&json!("4"), &json!(4), false));
        assert!(!compare_results(&json!([]), &json!({}), false));
    }
}
