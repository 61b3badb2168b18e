pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Result arrays rendered as their own table or CSV, in lookup order.
pub const ROW_SECTIONS: [&str; 4] = ["cash_flows", "yearly_distributions", "comparisons", "rows"];

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The `result` object of an envelope, or the value itself.
pub fn result_of(value: &Value) -> &Value {
    value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value)
}

/// Render a metric object (`{"status": "defined", "value": ..}`) as its
/// value, or as `n/a (reason)` when undefined.
pub fn metric_text(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    match map.get("status")?.as_str()? {
        "defined" => map.get("value").map(scalar_text),
        "undefined" => Some(format!(
            "n/a ({})",
            map.get("reason").map(scalar_text).unwrap_or_default()
        )),
        _ => None,
    }
}

/// Single-cell text for any JSON value.
pub fn scalar_text(value: &Value) -> String {
    if let Some(text) = metric_text(value) {
        return text;
    }
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => arr.iter().map(scalar_text).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
