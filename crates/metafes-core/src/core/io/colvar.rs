//! Collective-variable time series (`COLVAR`).
//!
//! ```text
//! #! FIELDS time phi psi
//!  0.0  -1.21  2.33
//!  0.5  -1.19  2.41
//! ```

use super::parsing::{header_directive, is_comment_or_blank, parse_float};
use super::traits::PlainTextFile;
use crate::core::models::frame::CvSample;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColvarLog {
    pub names: Vec<String>,
    pub samples: Vec<CvSample>,
}

impl ColvarLog {
    pub fn new(names: Vec<String>, samples: Vec<CvSample>) -> Self {
        Self { names, samples }
    }

    /// `(time, value)` pairs for one variable.
    pub fn series(&self, index: usize) -> Option<Vec<(f64, f64)>> {
        if index >= self.names.len() {
            return None;
        }
        Some(
            self.samples
                .iter()
                .map(|s| (s.time, s.values[index]))
                .collect(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ColvarError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Data found before the '#! FIELDS' header")]
    MissingFields,
    #[error("FIELDS header must start with 'time' and name at least one variable")]
    InvalidFields,
    #[error("Line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("Line {line}: invalid float '{value}'")]
    InvalidFloat { line: usize, value: String },
    #[error("Inconsistent data: {0}")]
    Inconsistency(String),
}

pub struct ColvarFile;

impl PlainTextFile for ColvarFile {
    type Content = ColvarLog;
    type Error = ColvarError;

    fn read_from(reader: &mut impl BufRead) -> Result<ColvarLog, ColvarError> {
        let mut names: Option<Vec<String>> = None;
        let mut samples = Vec::new();

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;

            if let Some(("FIELDS", mut tokens)) = header_directive(&line) {
                if tokens.next() != Some("time") {
                    return Err(ColvarError::InvalidFields);
                }
                let fields: Vec<String> = tokens.map(str::to_string).collect();
                if fields.is_empty() {
                    return Err(ColvarError::InvalidFields);
                }
                if names.as_ref().is_some_and(|existing| existing != &fields) {
                    return Err(ColvarError::Inconsistency(format!(
                        "FIELDS header on line {} differs from an earlier one",
                        line_num
                    )));
                }
                names = Some(fields);
                continue;
            }
            if is_comment_or_blank(&line) {
                continue;
            }

            let n = names.as_ref().ok_or(ColvarError::MissingFields)?.len();
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() != n + 1 {
                return Err(ColvarError::ColumnCount {
                    line: line_num,
                    expected: n + 1,
                    found: columns.len(),
                });
            }
            let values = columns
                .iter()
                .map(|token| {
                    parse_float(token).ok_or_else(|| ColvarError::InvalidFloat {
                        line: line_num,
                        value: token.to_string(),
                    })
                })
                .collect::<Result<Vec<f64>, _>>()?;
            samples.push(CvSample::new(values[0], values[1..].to_vec()));
        }

        let names = names.ok_or(ColvarError::MissingFields)?;
        Ok(ColvarLog { names, samples })
    }

    fn write_to(log: &ColvarLog, writer: &mut impl Write) -> Result<(), ColvarError> {
        write!(writer, "#! FIELDS time")?;
        for name in &log.names {
            write!(writer, " {}", name)?;
        }
        writeln!(writer)?;

        for sample in &log.samples {
            if sample.values.len() != log.names.len() {
                return Err(ColvarError::Inconsistency(format!(
                    "sample at time {} has {} values for {} variables",
                    sample.time,
                    sample.values.len(),
                    log.names.len()
                )));
            }
            write!(writer, "{:>24}", sample.time)?;
            for value in &sample.values {
                write!(writer, " {:>24}", value)?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_parses_header_and_rows() {
        let content = "#! FIELDS time phi d\n# comment\n0.0 -1.2 0.5\n\n0.5 -1.1 0.6\n";
        let log = ColvarFile::read_from(&mut Cursor::new(content)).unwrap();
        assert_eq!(log.names, vec!["phi", "d"]);
        assert_eq!(log.samples.len(), 2);
        assert_eq!(log.samples[1], CvSample::new(0.5, vec![-1.1, 0.6]));
        assert_eq!(log.series(1).unwrap(), vec![(0.0, 0.5), (0.5, 0.6)]);
        assert!(log.series(2).is_none());
    }

    #[test]
    fn read_rejects_header_without_time() {
        let content = "#! FIELDS phi\n";
        assert!(matches!(
            ColvarFile::read_from(&mut Cursor::new(content)),
            Err(ColvarError::InvalidFields)
        ));
    }

    #[test]
    fn read_rejects_short_rows() {
        let content = "#! FIELDS time phi d\n0.0 1.0\n";
        assert!(matches!(
            ColvarFile::read_from(&mut Cursor::new(content)),
            Err(ColvarError::ColumnCount {
                line: 2,
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn write_then_read_preserves_samples() {
        let log = ColvarLog::new(
            vec!["phi".into()],
            vec![CvSample::new(0.0, vec![0.125]), CvSample::new(1.0, vec![-2.5])],
        );
        let mut buffer = Vec::new();
        ColvarFile::write_to(&log, &mut buffer).unwrap();
        let read_back = ColvarFile::read_from(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(read_back, log);
    }
}
