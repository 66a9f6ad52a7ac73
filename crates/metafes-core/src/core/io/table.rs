//! Comma-separated numeric tables, used for free-energy surfaces and projections.
//!
//! Undefined cells are written as `inf`.

use super::traits::PlainTextFile;
use std::io::{BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Row {row} has {found} columns, the header has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Row {row}: invalid number '{value}'")]
    InvalidNumber { row: usize, value: String },
}

/// A header row followed by rows of numbers of the same width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { headers, rows }
    }

    /// Applies `f` to the last cell of every row.
    pub fn map_last_column(&mut self, f: impl Fn(f64) -> f64) {
        for row in &mut self.rows {
            if let Some(value) = row.last_mut() {
                *value = f(*value);
            }
        }
    }
}

pub struct TableFile;

impl PlainTextFile for TableFile {
    type Content = Table;
    type Error = TableError;

    fn read_from(reader: &mut impl BufRead) -> Result<Table, TableError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for (i, record) in csv_reader.records().enumerate() {
            let record = record?;
            let row = record
                .iter()
                .map(|field| {
                    field.trim().parse::<f64>().map_err(|_| TableError::InvalidNumber {
                        row: i + 1,
                        value: field.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }
        Ok(Table { headers, rows })
    }

    fn write_to(table: &Table, writer: &mut impl Write) -> Result<(), TableError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&table.headers)?;
        for (i, row) in table.rows.iter().enumerate() {
            if row.len() != table.headers.len() {
                return Err(TableError::RowWidth {
                    row: i + 1,
                    expected: table.headers.len(),
                    found: row.len(),
                });
            }
            csv_writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}
