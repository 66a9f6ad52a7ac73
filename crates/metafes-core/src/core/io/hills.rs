//! Hill-deposit logs in the PLUMED `HILLS` layout.
//!
//! ```text
//! #! FIELDS time phi psi sigma_phi sigma_psi height biasf
//! #! SET min_phi -pi
//! #! SET max_phi pi
//!      1.0   -1.2   0.4   0.35   0.35   1.2   10
//! ```
//!
//! As in PLUMED, the `height` column of a well-tempered hill holds the
//! deposited height multiplied by `γ/(γ-1)`. The reader divides that factor
//! back out, so [`HillRecord::height`] is always the height added to the bias. A `biasf`
//! column is written only when at least one hill was deposited with
//! well-tempering; a bias factor of `1` (or lower) reads back as "not
//! tempered".

use super::parsing::{header_directive, is_comment_or_blank, parse_float};
use super::traits::PlainTextFile;
use crate::core::models::hill::HillRecord;
use crate::core::models::variable::CollectiveVariable;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct HillsVariable {
    pub name: String,
    pub periodic: Option<(f64, f64)>,
}

impl From<&CollectiveVariable> for HillsVariable {
    fn from(cv: &CollectiveVariable) -> Self {
        Self {
            name: cv.name.clone(),
            periodic: cv.periodicity(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HillLog {
    pub variables: Vec<HillsVariable>,
    pub records: Vec<HillRecord>,
}

impl HillLog {
    pub fn new(variables: Vec<HillsVariable>, records: Vec<HillRecord>) -> Self {
        Self { variables, records }
    }

    pub fn for_variables(variables: &[CollectiveVariable], records: Vec<HillRecord>) -> Self {
        Self {
            variables: variables.iter().map(HillsVariable::from).collect(),
            records,
        }
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }
}

#[derive(Debug, Error)]
pub enum HillsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Data found before the '#! FIELDS' header")]
    MissingFields,
    #[error("Unsupported FIELDS header: {0}")]
    InvalidFields(String),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: HillsParseErrorKind,
    },
    #[error("Inconsistent data: {0}")]
    Inconsistency(String),
}

#[derive(Debug, Error)]
pub enum HillsParseErrorKind {
    #[error("Expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },
    #[error("Invalid float in column '{column}' (value: '{value}')")]
    InvalidFloat { column: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
struct FieldLayout {
    names: Vec<String>,
    has_bias_factor: bool,
}

impl FieldLayout {
    fn parse<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Self, HillsError> {
        let tokens: Vec<&str> = tokens.collect();
        let joined = || tokens.join(" ");

        if tokens.first() != Some(&"time") {
            return Err(HillsError::InvalidFields(joined()));
        }
        let names: Vec<String> = tokens[1..]
            .iter()
            .take_while(|t| !t.starts_with("sigma_"))
            .map(|t| t.to_string())
            .collect();
        let n = names.len();
        if n == 0 {
            return Err(HillsError::InvalidFields(joined()));
        }

        let sigma_tokens = tokens.get(1 + n..1 + 2 * n).unwrap_or_default();
        let sigmas_match = sigma_tokens.len() == n
            && sigma_tokens
                .iter()
                .zip(&names)
                .all(|(token, name)| token.strip_prefix("sigma_") == Some(name.as_str()));
        if !sigmas_match {
            return Err(HillsError::InvalidFields(joined()));
        }

        let tail = &tokens[1 + 2 * n..];
        let has_bias_factor = match tail {
            ["height"] => false,
            ["height", "biasf"] => true,
            _ => return Err(HillsError::InvalidFields(joined())),
        };

        Ok(Self {
            names,
            has_bias_factor,
        })
    }

    fn column_count(&self) -> usize {
        2 + 2 * self.names.len() + usize::from(self.has_bias_factor)
    }

    fn column_name(&self, index: usize) -> String {
        let n = self.names.len();
        match index {
            0 => "time".to_string(),
            i if i <= n => self.names[i - 1].clone(),
            i if i <= 2 * n => format!("sigma_{}", self.names[i - 1 - n]),
            i if i == 2 * n + 1 => "height".to_string(),
            _ => "biasf".to_string(),
        }
    }
}

pub struct HillsFile;

impl PlainTextFile for HillsFile {
    type Content = HillLog;
    type Error = HillsError;

    fn read_from(reader: &mut impl BufRead) -> Result<HillLog, HillsError> {
        let mut layout: Option<FieldLayout> = None;
        let mut set_values: HashMap<String, f64> = HashMap::new();
        let mut periodic_flags: HashMap<String, bool> = HashMap::new();
        let mut records = Vec::new();

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;

            if let Some((keyword, mut tokens)) = header_directive(&line) {
                match keyword {
                    "FIELDS" => {
                        let parsed = FieldLayout::parse(tokens)?;
                        match &layout {
                            Some(existing) if existing != &parsed => {
                                return Err(HillsError::Inconsistency(format!(
                                    "FIELDS header on line {} differs from an earlier one",
                                    line_num
                                )));
                            }
                            _ => layout = Some(parsed),
                        }
                    }
                    "SET" => {
                        if let (Some(key), Some(value)) = (tokens.next(), tokens.next()) {
                            if let Some(name) = key.strip_prefix("periodic_") {
                                let flag = match value {
                                    "true" => true,
                                    "false" => false,
                                    other => {
                                        return Err(HillsError::Inconsistency(format!(
                                            "line {}: periodic_{} must be true or false, found '{}'",
                                            line_num, name, other
                                        )));
                                    }
                                };
                                periodic_flags.insert(name.to_string(), flag);
                            } else if let Some(parsed) = parse_float(value) {
                                set_values.insert(key.to_string(), parsed);
                            }
                        }
                    }
                    _ => {}
                }
                continue;
            }
            if is_comment_or_blank(&line) {
                continue;
            }

            let layout = layout.as_ref().ok_or(HillsError::MissingFields)?;
            records.push(parse_row(&line, line_num, layout)?);
        }

        let layout = layout.ok_or(HillsError::MissingFields)?;
        let variables = layout
            .names
            .into_iter()
            .map(|name| {
                let min = set_values.get(&format!("min_{}", name)).copied();
                let max = set_values.get(&format!("max_{}", name)).copied();
                let periodic = match periodic_flags.get(&name) {
                    Some(false) => None,
                    Some(true) => Some(min.zip(max).ok_or_else(|| {
                        HillsError::Inconsistency(format!(
                            "variable '{}' is marked periodic without min_/max_ bounds",
                            name
                        ))
                    })?),
                    None => min.zip(max),
                };
                Ok(HillsVariable { name, periodic })
            })
            .collect::<Result<Vec<_>, HillsError>>()?;

        Ok(HillLog { variables, records })
    }

    fn write_to(log: &HillLog, writer: &mut impl Write) -> Result<(), HillsError> {
        let n = log.variables.len();
        if let Some(bad) = log
            .records
            .iter()
            .find(|r| r.center.len() != n || r.sigma.len() != n)
        {
            return Err(HillsError::Inconsistency(format!(
                "hill at time {} has {} values for {} variables",
                bad.time,
                bad.center.len(),
                n
            )));
        }

        let has_bias_factor = log.records.iter().any(|r| r.bias_factor.is_some());

        write!(writer, "#! FIELDS time")?;
        for v in &log.variables {
            write!(writer, " {}", v.name)?;
        }
        for v in &log.variables {
            write!(writer, " sigma_{}", v.name)?;
        }
        write!(writer, " height")?;
        if has_bias_factor {
            write!(writer, " biasf")?;
        }
        writeln!(writer)?;
        writeln!(writer, "#! SET multivariate false")?;
        writeln!(writer, "#! SET kerneltype gaussian")?;
        for v in &log.variables {
            match v.periodic {
                Some((min, max)) => {
                    writeln!(writer, "#! SET periodic_{} true", v.name)?;
                    writeln!(writer, "#! SET min_{} {}", v.name, format_bound(min))?;
                    writeln!(writer, "#! SET max_{} {}", v.name, format_bound(max))?;
                }
                None => writeln!(writer, "#! SET periodic_{} false", v.name)?,
            }
        }

        for record in &log.records {
            write!(writer, "{:>24}", record.time)?;
            for value in record.center.iter().chain(&record.sigma) {
                write!(writer, " {:>24}", value)?;
            }
            write!(writer, " {:>24}", record.height * height_scale(record.bias_factor))?;
            if has_bias_factor {
                write!(writer, " {:>24}", record.bias_factor.unwrap_or(1.0))?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

/// Factor between the deposited height and the `height` column.
fn height_scale(bias_factor: Option<f64>) -> f64 {
    match bias_factor {
        Some(gamma) if gamma > 1.0 => gamma / (gamma - 1.0),
        _ => 1.0,
    }
}

fn format_bound(value: f64) -> String {
    if value == PI {
        "pi".to_string()
    } else if value == -PI {
        "-pi".to_string()
    } else {
        value.to_string()
    }
}

fn parse_row(line: &str, line_num: usize, layout: &FieldLayout) -> Result<HillRecord, HillsError> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    let expected = layout.column_count();
    if columns.len() != expected {
        return Err(HillsError::Parse {
            line: line_num,
            kind: HillsParseErrorKind::ColumnCount {
                expected,
                found: columns.len(),
            },
        });
    }

    let values = columns
        .iter()
        .enumerate()
        .map(|(i, token)| {
            parse_float(token).ok_or_else(|| HillsError::Parse {
                line: line_num,
                kind: HillsParseErrorKind::InvalidFloat {
                    column: layout.column_name(i),
                    value: token.to_string(),
                },
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    let n = layout.names.len();
    let bias_factor = if layout.has_bias_factor {
        Some(values[2 * n + 2]).filter(|&gamma| gamma > 1.0)
    } else {
        None
    };

    Ok(HillRecord {
        time: values[0],
        center: values[1..=n].to_vec(),
        sigma: values[n + 1..=2 * n].to_vec(),
        height: values[2 * n + 1] / height_scale(bias_factor),
        bias_factor,
    })
}
