use std::io::Write;

use crate::error::GrantsError;
use crate::grants::Grant;
use crate::query::format_display;

pub const DEFAULT_EXPORT_FILE: &str = "filtered_grants.csv";

/// Columns appended after the sheet's own columns.
pub const DERIVED_COLUMNS: [&str; 5] = [
    "date_parsed",
    "year",
    "value_display",
    "savings_display",
    "date_display",
];

/// Writes the filtered set as UTF-8 CSV: one header row with every sheet column
/// followed by the derived columns, then one row per grant. Returns the row count.
pub fn write_csv<W: Write>(
    writer: W,
    columns: &[String],
    grants: &[&Grant],
) -> Result<usize, GrantsError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(
        columns
            .iter()
            .map(String::as_str)
            .chain(DERIVED_COLUMNS),
    )
    .map_err(|err| GrantsError::Csv(err.to_string()))?;

    for grant in grants {
        let display = format_display(grant);
        let mut record: Vec<String> = (0..columns.len())
            .map(|idx| {
                grant
                    .cells
                    .get(idx)
                    .map(|cell| cell.to_field())
                    .unwrap_or_default()
            })
            .collect();
        record.push(
            grant
                .date_parsed
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        );
        record.push(grant.year.map(|year| year.to_string()).unwrap_or_default());
        record.push(display.value_display);
        record.push(display.savings_display);
        record.push(display.date_display);
        csv.write_record(&record)
            .map_err(|err| GrantsError::Csv(err.to_string()))?;
    }

    csv.flush()
        .map_err(|err| GrantsError::Csv(err.to_string()))?;
    Ok(grants.len())
}

#[cfg(test)]
mod tests {
    use crate::grants::GrantDataset;
    use crate::workbook::{Cell, Table};

    use super::*;

    #[test]
    fn csv_has_sheet_and_derived_columns() {
        let table = Table {
            columns: ["agency", "recipient", "description", "value", "savings", "date"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            rows: vec![vec![
                Cell::Text("EPA".to_string()),
                Cell::Text("Acme, Inc.".to_string()),
                Cell::Empty,
                Cell::Number(1_234_567.0),
                Cell::Number(10.5),
                Cell::Text("2025-02-14".to_string()),
            ]],
        };
        let dataset = GrantDataset::from_table(table).unwrap();
        let refs: Vec<&Grant> = dataset.grants.iter().collect();

        let mut buffer = Vec::new();
        let rows = write_csv(&mut buffer, &dataset.columns, &refs).unwrap();
        assert_eq!(rows, 1);

        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("agency,recipient,description,value,savings,date,date_parsed,year,value_display,savings_display,date_display")
        );
        assert_eq!(
            lines.next(),
            Some(r#"EPA,"Acme, Inc.",,1234567,10.5,2025-02-14,2025-02-14,2025,"$1,234,567",$11,2025-02-14"#)
        );
        assert_eq!(lines.next(), None);
    }
}
