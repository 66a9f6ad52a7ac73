//! Multi-frame XYZ trajectories.
//!
//! Each frame is an atom count, a comment line and one `symbol x y z` line per
//! atom. The frame time is read from a `time=<t>` token in the comment line;
//! frames without one are timed by their index.

use super::traits::PlainTextFile;
use crate::core::models::frame::Frame;
use nalgebra::Point3;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XyzTrajectory {
    pub symbols: Vec<String>,
    pub frames: Vec<Frame>,
}

impl XyzTrajectory {
    pub fn new(symbols: Vec<String>, frames: Vec<Frame>) -> Self {
        Self { symbols, frames }
    }
}

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Line {line}: invalid atom count '{value}'")]
    InvalidAtomCount { line: usize, value: String },
    #[error("Line {line}: malformed atom record")]
    MalformedAtom { line: usize },
    #[error("Frame {frame} ends before all {expected} atoms were read")]
    TruncatedFrame { frame: usize, expected: usize },
    #[error("Inconsistent data: {0}")]
    Inconsistency(String),
}

pub struct XyzFile;

const MAX_PREALLOCATED_ATOMS: usize = 4096;

fn parse_time(comment: &str) -> Option<f64> {
    comment
        .split_whitespace()
        .find_map(|token| token.strip_prefix("time="))
        .and_then(|value| value.parse().ok())
}

impl PlainTextFile for XyzFile {
    type Content = XyzTrajectory;
    type Error = XyzError;

    fn read_from(reader: &mut impl BufRead) -> Result<XyzTrajectory, XyzError> {
        let mut lines = reader.lines().enumerate().map(|(i, l)| (i + 1, l));
        let mut trajectory = XyzTrajectory::default();

        while let Some((line_num, line_res)) = lines.next() {
            let line = line_res?;
            let count_str = line.trim();
            if count_str.is_empty() {
                continue;
            }
            let atom_count: usize =
                count_str
                    .parse()
                    .map_err(|_| XyzError::InvalidAtomCount {
                        line: line_num,
                        value: count_str.to_string(),
                    })?;
            let frame_index = trajectory.frames.len();
            let truncated = || XyzError::TruncatedFrame {
                frame: frame_index,
                expected: atom_count,
            };

            let (_, comment) = lines.next().ok_or_else(truncated)?;
            let time = parse_time(&comment?).unwrap_or(frame_index as f64);

            // The count comes from the file; reserve no more than a typical frame.
            let reserve = atom_count.min(MAX_PREALLOCATED_ATOMS);
            let mut symbols = Vec::with_capacity(reserve);
            let mut positions = Vec::with_capacity(reserve);
            for _ in 0..atom_count {
                let (atom_line_num, atom_line) = lines.next().ok_or_else(truncated)?;
                let atom_line = atom_line?;
                let mut tokens = atom_line.split_whitespace();
                let symbol = tokens
                    .next()
                    .ok_or(XyzError::MalformedAtom { line: atom_line_num })?;
                let coords = tokens
                    .take(3)
                    .map(str::parse::<f64>)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| XyzError::MalformedAtom { line: atom_line_num })?;
                if coords.len() != 3 {
                    return Err(XyzError::MalformedAtom { line: atom_line_num });
                }
                symbols.push(symbol.to_string());
                positions.push(Point3::new(coords[0], coords[1], coords[2]));
            }

            if trajectory.frames.is_empty() {
                trajectory.symbols = symbols;
            } else if symbols.len() != trajectory.symbols.len() {
                return Err(XyzError::Inconsistency(format!(
                    "frame {} has {} atoms, the first frame has {}",
                    frame_index,
                    symbols.len(),
                    trajectory.symbols.len()
                )));
            }
            trajectory.frames.push(Frame::new(time, positions));
        }

        Ok(trajectory)
    }

    fn write_to(trajectory: &XyzTrajectory, writer: &mut impl Write) -> Result<(), XyzError> {
        for frame in &trajectory.frames {
            if frame.positions.len() != trajectory.symbols.len() {
                return Err(XyzError::Inconsistency(format!(
                    "frame at time {} has {} atoms for {} symbols",
                    frame.time,
                    frame.positions.len(),
                    trajectory.symbols.len()
                )));
            }
            writeln!(writer, "{}", frame.positions.len())?;
            writeln!(writer, "time={}", frame.time)?;
            for (symbol, p) in trajectory.symbols.iter().zip(&frame.positions) {
                writeln!(writer, "{:<4} {:>22} {:>22} {:>22}", symbol, p.x, p.y, p.z)?;
            }
        }
        Ok(())
    }
}
