use serde_json::Value;
use std::io;

use super::{result_of, scalar_text, ROW_SECTIONS};

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout. Row-shaped results (the cash-flow table,
/// yearly distributions, scenario comparisons, hold-period rows, grid cells)
/// are written one record per row; anything else as field/value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());
    let result = result_of(value);

    if let Err(e) = write_result(&mut wtr, result).and_then(|_| wtr.flush().map_err(Into::into)) {
        eprintln!("CSV write error: {}", e);
    }
}

fn write_result(wtr: &mut StdoutWriter<'_>, result: &Value) -> Result<(), csv::Error> {
    match result {
        Value::Object(map) => {
            if let Some(Value::Array(rows)) = ROW_SECTIONS.iter().find_map(|k| map.get(*k)) {
                return write_array_csv(wtr, rows);
            }
            if let Some(Value::Array(grid)) = map.get("cells") {
                return write_grid_csv(wtr, grid);
            }
            wtr.write_record(["field", "value"])?;
            for (key, val) in map {
                wtr.write_record([key.as_str(), &scalar_text(val)])?;
            }
            Ok(())
        }
        Value::Array(arr) => write_array_csv(wtr, arr),
        _ => wtr.write_record([&scalar_text(result)]),
    }
}

fn write_array_csv(wtr: &mut StdoutWriter<'_>, arr: &[Value]) -> Result<(), csv::Error> {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            wtr.write_record([&scalar_text(item)])?;
        }
        return Ok(());
    };

    let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
    wtr.write_record(&headers)?;
    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(*h).map(scalar_text).unwrap_or_default())
                .collect();
            wtr.write_record(&row)?;
        }
    }
    Ok(())
}

fn write_grid_csv(wtr: &mut StdoutWriter<'_>, grid: &[Value]) -> Result<(), csv::Error> {
    wtr.write_record(["row", "col", "x_value", "y_value", "status", "value", "severity"])?;
    for cell in grid.iter().filter_map(Value::as_array).flatten() {
        let field = |k: &str| cell.get(k).map(scalar_text).unwrap_or_default();
        wtr.write_record([
            field("row"),
            field("col"),
            field("x_value"),
            field("y_value"),
            field("status"),
            field("value"),
            field("severity"),
        ])?;
    }
    Ok(())
}
