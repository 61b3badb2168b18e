use serde_json::Value;

use super::{result_of, scalar_text};

/// Key answer fields, in priority order. Nested `returns` objects are
/// searched after the top level.
const PRIORITY_KEYS: [&str; 4] = ["irr", "lp_irr", "best_irr_year", "equity_multiple"];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    let result = result_of(value);

    if let Some(found) = find_key(result).or_else(|| result.get("returns").and_then(find_key)) {
        println!("{}", found);
        return;
    }

    if let Value::Object(map) = result {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, scalar_text(val));
            return;
        }
    }

    println!("{}", scalar_text(result));
}

fn find_key(obj: &Value) -> Option<String> {
    let map = obj.as_object()?;
    PRIORITY_KEYS
        .iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
        .map(scalar_text)
}
