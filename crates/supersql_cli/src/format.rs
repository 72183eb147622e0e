use supersql_client::{Row, Value};

/// Output mode for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Table,
    Expanded,
    TuplesOnly,
    Csv,
    Json,
}

/// A fully fetched result, ready for printing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into_iter().map(Row::into_values).collect(),
        }
    }
}

fn cell(v: &Value) -> String {
    v.to_string()
}

fn row_count_footer(n: usize) -> String {
    format!("({} row{})\n", n, if n == 1 { "" } else { "s" })
}

/// Render a result set. `tuples_only` drops headers and footers in the
/// human-readable modes.
pub fn render(result: &ResultSet, mode: OutputMode, tuples_only: bool) -> String {
    match mode {
        OutputMode::Table if tuples_only => format_tuples_only(result),
        OutputMode::Table => {
            let mut s = format_table(result);
            s.push_str(&row_count_footer(result.rows.len()));
            s
        }
        OutputMode::Expanded => {
            let mut s = format_expanded(result);
            if !tuples_only {
                s.push_str(&row_count_footer(result.rows.len()));
            }
            s
        }
        OutputMode::TuplesOnly => format_tuples_only(result),
        OutputMode::Csv => format_csv(result),
        OutputMode::Json => format_json(result),
    }
}

fn padded_line(widths: &[usize], cells: &[String]) -> String {
    let padded: Vec<String> = widths
        .iter()
        .zip(cells)
        .map(|(w, v)| format!("{:<width$}", v, width = *w))
        .collect();
    format!(" {} \n", padded.join(" | "))
}

pub fn format_table(result: &ResultSet) -> String {
    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    let rendered: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(cell).collect())
        .collect();
    for row in &rendered {
        for (w, v) in widths.iter_mut().zip(row) {
            *w = (*w).max(v.chars().count());
        }
    }

    let mut out = padded_line(&widths, &result.columns);
    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
    out.push_str(&sep.join("+"));
    out.push('\n');
    for row in &rendered {
        out.push_str(&padded_line(&widths, row));
    }
    out
}

pub fn format_tuples_only(result: &ResultSet) -> String {
    let mut out = String::new();
    for row in &result.rows {
        let vals: Vec<String> = row.iter().map(cell).collect();
        out.push_str(&vals.join("|"));
        out.push('\n');
    }
    out
}

pub fn format_expanded(result: &ResultSet) -> String {
    let width = result
        .columns
        .iter()
        .map(|c| c.chars().count())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for (i, row) in result.rows.iter().enumerate() {
        out.push_str(&format!("-[ RECORD {} ]\n", i + 1));
        for (col, v) in result.columns.iter().zip(row) {
            out.push_str(&format!("{:<width$} | {}\n", col, cell(v), width = width));
        }
    }
    out
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// CSV with a header line. NULL is an empty field.
pub fn format_csv(result: &ResultSet) -> String {
    let mut out = String::new();
    let header: Vec<String> = result.columns.iter().map(|c| csv_field(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in &result.rows {
        let vals: Vec<String> = row
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                other => csv_field(&cell(other)),
            })
            .collect();
        out.push_str(&vals.join(","));
        out.push('\n');
    }
    out
}

fn json_value(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Integer(n) => serde_json::Value::from(*n),
        Value::Long(n) => serde_json::Value::from(*n),
        Value::Double(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        other => serde_json::Value::String(other.to_string()),
    }
}

/// Array of objects keyed by column name, values keep their JSON types.
pub fn format_json(result: &ResultSet) -> String {
    let rows: Vec<serde_json::Value> = result
        .rows
        .iter()
        .map(|row| {
            let map: serde_json::Map<String, serde_json::Value> = result
                .columns
                .iter()
                .zip(row)
                .map(|(c, v)| (c.clone(), json_value(v)))
                .collect();
            serde_json::Value::Object(map)
        })
        .collect();
    let mut out = serde_json::to_string_pretty(&serde_json::Value::Array(rows)).unwrap_or_default();
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        ResultSet {
            columns: vec!["id".into(), "name".into()],
            rows: vec![
                vec![Value::Long(1), Value::Varchar("alice".into())],
                vec![Value::Long(22), Value::Null],
            ],
        }
    }

    #[test]
    fn test_table_layout() {
        let out = render(&sample(), OutputMode::Table, false);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], " id | name  ");
        assert_eq!(lines[1], "----+-------");
        assert_eq!(lines[2], " 1  | alice ");
        assert_eq!(lines[3], " 22 | NULL  ");
        assert_eq!(lines[4], "(2 rows)");
    }

    #[test]
    fn test_tuples_only() {
        assert_eq!(
            render(&sample(), OutputMode::Table, true),
            "1|alice\n22|NULL\n"
        );
    }

    #[test]
    fn test_expanded() {
        let out = render(&sample(), OutputMode::Expanded, false);
        assert!(out.starts_with("-[ RECORD 1 ]\nid   | 1\nname | alice\n"));
        assert!(out.ends_with("(2 rows)\n"));
    }

    #[test]
    fn test_csv_quoting_and_nulls() {
        let rs = ResultSet {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec![Value::Varchar("x,\"y\"".into()), Value::Null]],
        };
        assert_eq!(format_csv(&rs), "a,b\n\"x,\"\"y\"\"\",\n");
    }

    #[test]
    fn test_json_keeps_types() {
        let out = format_json(&sample());
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["id"], serde_json::json!(1));
        assert_eq!(parsed[0]["name"], serde_json::json!("alice"));
        assert!(parsed[1]["name"].is_null());
    }
}
