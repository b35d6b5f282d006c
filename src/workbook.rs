use std::fs;
use std::io::Write;

use calamine::{Data, DataType, Reader, Xlsx, open_workbook};
use camino::Utf8Path;
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use serde_json::Value;

use crate::error::GrantsError;

/// Longest string a single xlsx cell accepts.
const MAX_CELL_CHARS: usize = 32_767;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Empty,
            Value::Bool(flag) => Cell::Bool(*flag),
            Value::Number(number) => number.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
            Value::String(text) => Cell::Text(text.clone()),
            other => Cell::Text(other.to_string()),
        }
    }

    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(text) if text.is_empty() => Cell::Empty,
            Data::String(text) => Cell::Text(text.clone()),
            Data::Int(value) => Cell::Number(*value as f64),
            Data::Float(value) => Cell::Number(*value),
            Data::Bool(flag) => Cell::Bool(*flag),
            Data::DateTime(_) => data
                .as_datetime()
                .map(|dt| Cell::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(Cell::Empty),
            Data::DateTimeIso(text) | Data::DurationIso(text) => Cell::Text(text.clone()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Best-effort numeric coercion; text cells holding a number are accepted.
    /// Non-finite values (`NaN`, `inf`) read as missing.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Cell::Number(value) => Some(*value),
            Cell::Text(text) => text.trim().replace(',', "").parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|value| value.is_finite())
    }

    /// Text form used for CSV export and for string-typed columns.
    pub fn to_field(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(text) => text.clone(),
            Cell::Number(value) => format_number(*value),
            Cell::Bool(flag) => flag.to_string(),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// A flat sheet: one header row plus data rows of equal width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Flattens JSON objects into rows. Columns are the union of keys in order of
    /// first appearance; keys a record lacks become empty cells.
    pub fn from_records(records: &[Value]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            if let Some(object) = record.as_object() {
                for key in object.keys() {
                    if !columns.iter().any(|column| column == key) {
                        columns.push(key.clone());
                    }
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| {
                        record
                            .get(column)
                            .map(Cell::from_json)
                            .unwrap_or(Cell::Empty)
                    })
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Writes every `(sheet name, table)` pair into one xlsx file, in order.
///
/// The file is assembled in memory and moved into place through a temp file, so
/// a failure never leaves a half-written workbook behind.
pub fn write_workbook(path: &Utf8Path, sheets: &[(&str, &Table)]) -> Result<(), GrantsError> {
    let mut workbook = Workbook::new();
    for (name, table) in sheets {
        let worksheet = workbook.add_worksheet();
        fill_worksheet(worksheet, name, table).map_err(workbook_error)?;
    }
    let buffer = workbook.save_to_buffer().map_err(workbook_error)?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| GrantsError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("doge-grants-workbook")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| GrantsError::Filesystem(err.to_string()))?;
    temp.write_all(&buffer)
        .map_err(|err| GrantsError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| GrantsError::Filesystem(err.to_string()))?;
    Ok(())
}

fn fill_worksheet(worksheet: &mut Worksheet, name: &str, table: &Table) -> Result<(), XlsxError> {
    worksheet.set_name(name)?;
    for (col, column) in table.columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, column)?;
    }
    for (row, cells) in table.rows.iter().enumerate() {
        let row = row as u32 + 1;
        for (col, cell) in cells.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Empty => {}
                Cell::Text(text) => {
                    let text = truncate_chars(text, MAX_CELL_CHARS);
                    worksheet.write_string(row, col, text)?;
                }
                Cell::Number(value) => {
                    worksheet.write_number(row, col, *value)?;
                }
                Cell::Bool(flag) => {
                    worksheet.write_boolean(row, col, *flag)?;
                }
            }
        }
    }
    Ok(())
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Reads one sheet back into a [`Table`]; the first row is the header.
pub fn read_sheet(path: &Utf8Path, sheet: &str) -> Result<Table, GrantsError> {
    if !path.as_std_path().exists() {
        return Err(GrantsError::WorkbookNotFound(path.to_string()));
    }
    let mut workbook: Xlsx<_> = open_workbook(path.as_std_path()).map_err(workbook_error)?;
    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(GrantsError::MissingSheet(sheet.to_string()));
    }
    let range = workbook.worksheet_range(sheet).map_err(workbook_error)?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };
    let columns: Vec<String> = header.iter().map(|data| data.to_string()).collect();
    let rows = rows
        .map(|row| {
            let mut cells: Vec<Cell> = row.iter().map(Cell::from_data).collect();
            cells.resize(columns.len(), Cell::Empty);
            cells
        })
        .collect();

    Ok(Table { columns, rows })
}

fn workbook_error(err: impl std::fmt::Display) -> GrantsError {
    GrantsError::Workbook(err.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flatten_unions_keys_in_first_seen_order() {
        let records = vec![
            json!({ "agency": "EPA", "value": 100 }),
            json!({ "agency": "DOD", "link": "https://example.gov", "value": 5.5 }),
        ];
        let table = Table::from_records(&records);
        assert_eq!(table.columns, vec!["agency", "value", "link"]);
        assert_eq!(table.rows[0][2], Cell::Empty);
        assert_eq!(table.rows[1][1], Cell::Number(5.5));
        assert_eq!(table.rows[1][2], Cell::Text("https://example.gov".to_string()));
    }

    #[test]
    fn nested_values_become_json_text() {
        let table = Table::from_records(&[json!({ "tags": ["a", "b"] })]);
        assert_eq!(table.rows[0][0], Cell::Text(r#"["a","b"]"#.to_string()));
    }

    #[test]
    fn numeric_coercion_from_text() {
        assert_eq!(Cell::Text("1,250".to_string()).as_f64(), Some(1250.0));
        assert_eq!(Cell::Text("n/a".to_string()).as_f64(), None);
        assert_eq!(Cell::Empty.as_f64(), None);
    }

    #[test]
    fn non_finite_numbers_read_as_missing() {
        assert_eq!(Cell::Text("NaN".to_string()).as_f64(), None);
        assert_eq!(Cell::Text(" inf ".to_string()).as_f64(), None);
        assert_eq!(Cell::Text("-infinity".to_string()).as_f64(), None);
        assert_eq!(Cell::Number(f64::NAN).as_f64(), None);
        assert_eq!(Cell::Number(f64::INFINITY).as_f64(), None);
        assert_eq!(Cell::Number(-3.5).as_f64(), Some(-3.5));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }
}
