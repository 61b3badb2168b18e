use colored::Colorize;
use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{metric_text, scalar_text, ROW_SECTIONS};

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(result) => print_envelope(result, map),
            None => print_flat_object(map),
        },
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{}", value),
    }
}

fn print_envelope(result: &Value, envelope: &Map<String, Value>) {
    match result {
        Value::Object(res_map) => print_result(res_map),
        other => println!("{}", scalar_text(other)),
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\n{}", "Warnings:".yellow().bold());
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// Row sections and grids get their own tables; nested summary objects
/// (`returns`, `exit`) are printed as field/value tables; the rest is
/// collected into one summary table.
fn print_result(res_map: &Map<String, Value>) {
    let mut scalars = Map::new();
    for (key, val) in res_map {
        if ROW_SECTIONS.contains(&key.as_str()) {
            if let Value::Array(rows) = val {
                println!("{}", key.bold());
                print_array_table(rows);
                continue;
            }
        }
        if key == "cells" {
            if let Value::Array(grid) = val {
                print_grid(res_map, grid);
                continue;
            }
        }
        match val {
            Value::Object(inner) if metric_text(val).is_none() => {
                println!("{}", key.bold());
                print_flat_object(inner);
            }
            _ => {
                scalars.insert(key.clone(), val.clone());
            }
        }
    }
    if !scalars.is_empty() {
        print_flat_object(&scalars);
    }
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &scalar_text(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_array_table(arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        if arr.is_empty() {
            println!("(empty)");
        }
        for item in arr {
            println!("{}", scalar_text(item));
        }
        return;
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(&headers);
    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(h.as_str()).map(scalar_text).unwrap_or_default())
                .collect();
            builder.push_record(row);
        }
    }
    println!("{}", Table::from(builder));
}

/// Sensitivity grid as a matrix: y values down the side, x values across,
/// each cell coloured by severity.
fn print_grid(res_map: &Map<String, Value>, grid: &[Value]) {
    let axis = |k: &str| res_map.get(k).map(scalar_text).unwrap_or_default();
    let x_values: Vec<String> = res_map
        .get("x_values")
        .and_then(Value::as_array)
        .map(|xs| xs.iter().map(scalar_text).collect())
        .unwrap_or_default();

    let mut builder = Builder::default();
    let mut header = vec![format!("{} \\ {}", axis("y_field"), axis("x_field"))];
    header.extend(x_values);
    builder.push_record(header);

    for row in grid.iter().filter_map(Value::as_array) {
        let y = row
            .first()
            .and_then(|c| c.get("y_value"))
            .map(scalar_text)
            .unwrap_or_default();
        let mut record = vec![y];
        record.extend(row.iter().map(grid_cell_text));
        builder.push_record(record);
    }
    println!("{}", Table::from(builder));
}

fn grid_cell_text(cell: &Value) -> String {
    let status = cell.get("status").and_then(Value::as_str).unwrap_or("");
    match status {
        "evaluated" => {
            let text = cell.get("value").map(scalar_text).unwrap_or_default();
            match cell.get("severity").and_then(Value::as_str) {
                Some("green") => text.green().to_string(),
                Some("amber") => text.yellow().to_string(),
                Some("red") => text.red().to_string(),
                _ => text,
            }
        }
        "failed" => "failed".red().to_string(),
        _ => "-".to_string(),
    }
}
