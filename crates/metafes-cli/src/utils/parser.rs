use metafes::engine::sampler::CvBounds;
use std::ops::Bound;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid bound format for '{0}'. Expected 'CV=RANGE' (e.g., 'phi=-1.5..0.5' or '0=[-1.5,0.5)').")]
    InvalidBoundFormat(String),

    #[error("Unknown collective variable '{0}'. Use a configured name or a 0-based index.")]
    UnknownVariable(String),

    #[error("Invalid number '{value}' in bound '{spec}'.")]
    InvalidNumber { value: String, spec: String },

    #[error("Bound '{0}' has a lower end above its upper end.")]
    EmptyRange(String),

    #[error("Collective variable '{0}' is bounded more than once.")]
    DuplicateVariable(String),
}

/// Resolves a variable given by name or by 0-based index.
pub fn resolve_variable(key: &str, names: &[String]) -> Result<usize, ParseError> {
    let key = key.trim();
    if let Some(index) = names.iter().position(|name| name == key) {
        return Ok(index);
    }
    match key.parse::<usize>() {
        Ok(index) if index < names.len() => Ok(index),
        _ => Err(ParseError::UnknownVariable(key.to_string())),
    }
}

/// Parses `CV=RANGE` into a variable index and its bounds.
///
/// `RANGE` is either Rust range syntax (`a..b` half-open, `a..=b`, `a..`,
/// `..b`, `..`) or interval notation with brackets (`[a,b]`, `(a,b]`, ...).
/// In interval notation an empty end is unbounded.
pub fn parse_bound(spec: &str, names: &[String]) -> Result<(usize, CvBounds), ParseError> {
    let (key, range) = spec
        .split_once('=')
        .ok_or_else(|| ParseError::InvalidBoundFormat(spec.to_string()))?;
    let index = resolve_variable(key, names)?;
    let range = range.trim();

    let bounds = if range.starts_with('[') || range.starts_with('(') {
        parse_interval(range, spec)?
    } else {
        parse_range(range, spec)?
    };

    if let (Some(lo), Some(hi)) = (finite_end(bounds.lower), finite_end(bounds.upper)) {
        if lo > hi {
            return Err(ParseError::EmptyRange(spec.to_string()));
        }
    }
    Ok((index, bounds))
}

/// Parses every spec into a per-variable bounds vector; unmentioned variables
/// stay unbounded.
pub fn parse_bounds(specs: &[String], names: &[String]) -> Result<Vec<CvBounds>, ParseError> {
    let mut bounds = vec![CvBounds::unbounded(); names.len()];
    let mut seen = vec![false; names.len()];
    for spec in specs {
        let (index, parsed) = parse_bound(spec, names)?;
        if seen[index] {
            return Err(ParseError::DuplicateVariable(names[index].clone()));
        }
        seen[index] = true;
        bounds[index] = parsed;
    }
    Ok(bounds)
}

fn finite_end(bound: Bound<f64>) -> Option<f64> {
    match bound {
        Bound::Included(v) | Bound::Excluded(v) => Some(v),
        Bound::Unbounded => None,
    }
}

fn parse_number(value: &str, spec: &str) -> Result<Option<f64>, ParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|v| !v.is_nan())
        .map(Some)
        .ok_or_else(|| ParseError::InvalidNumber {
            value: value.to_string(),
            spec: spec.to_string(),
        })
}

fn parse_range(range: &str, spec: &str) -> Result<CvBounds, ParseError> {
    let (start, end, inclusive) = if let Some((start, end)) = range.split_once("..=") {
        (start, end, true)
    } else if let Some((start, end)) = range.split_once("..") {
        (start, end, false)
    } else {
        return Err(ParseError::InvalidBoundFormat(spec.to_string()));
    };

    let lower = match parse_number(start, spec)? {
        Some(v) => Bound::Included(v),
        None => Bound::Unbounded,
    };
    let upper = match (parse_number(end, spec)?, inclusive) {
        (Some(v), true) => Bound::Included(v),
        (Some(v), false) => Bound::Excluded(v),
        (None, true) => return Err(ParseError::InvalidBoundFormat(spec.to_string())),
        (None, false) => Bound::Unbounded,
    };
    Ok(CvBounds::new(lower, upper))
}

fn parse_interval(range: &str, spec: &str) -> Result<CvBounds, ParseError> {
    let invalid = || ParseError::InvalidBoundFormat(spec.to_string());
    let lower_closed = range.starts_with('[');
    let upper_closed = match range.chars().last() {
        Some(']') => true,
        Some(')') => false,
        _ => return Err(invalid()),
    };
    let inner = &range[1..range.len() - 1];
    let (start, end) = inner.split_once(',').ok_or_else(invalid)?;

    let lower = match parse_number(start, spec)? {
        Some(v) if lower_closed => Bound::Included(v),
        Some(v) => Bound::Excluded(v),
        None => Bound::Unbounded,
    };
    let upper = match parse_number(end, spec)? {
        Some(v) if upper_closed => Bound::Included(v),
        Some(v) => Bound::Excluded(v),
        None => Bound::Unbounded,
    };
    Ok(CvBounds::new(lower, upper))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["phi".to_string(), "psi".to_string()]
    }

    #[test]
    fn resolves_by_name_then_by_index() {
        assert_eq!(resolve_variable("psi", &names()), Ok(1));
        assert_eq!(resolve_variable(" 0 ", &names()), Ok(0));
        assert_eq!(
            resolve_variable("2", &names()),
            Err(ParseError::UnknownVariable("2".to_string()))
        );
        assert_eq!(
            resolve_variable("omega", &names()),
            Err(ParseError::UnknownVariable("omega".to_string()))
        );
    }

    #[test]
    fn rust_range_syntax_is_half_open_unless_inclusive() {
        let (index, bounds) = parse_bound("0=-1.5..0.5", &names()).unwrap();
        assert_eq!(index, 0);
        assert_eq!(bounds.lower, Bound::Included(-1.5));
        assert_eq!(bounds.upper, Bound::Excluded(0.5));
        assert!(bounds.contains(-1.5));
        assert!(!bounds.contains(0.5));

        let (_, bounds) = parse_bound("phi=-1.5..=0.5", &names()).unwrap();
        assert!(bounds.contains(0.5));
    }

    #[test]
    fn open_ended_ranges_are_unbounded() {
        let (index, bounds) = parse_bound("psi=2.0..", &names()).unwrap();
        assert_eq!(index, 1);
        assert_eq!(bounds.upper, Bound::Unbounded);
        assert!(bounds.contains(1e6));

        let (_, bounds) = parse_bound("psi=..", &names()).unwrap();
        assert_eq!(bounds, CvBounds::unbounded());
    }

    #[test]
    fn interval_notation_sets_each_end_independently() {
        let (_, bounds) = parse_bound("phi=(-1, 1]", &names()).unwrap();
        assert_eq!(bounds.lower, Bound::Excluded(-1.0));
        assert_eq!(bounds.upper, Bound::Included(1.0));

        let (_, bounds) = parse_bound("phi=[,0)", &names()).unwrap();
        assert_eq!(bounds.lower, Bound::Unbounded);
        assert_eq!(bounds.upper, Bound::Excluded(0.0));
    }

    #[test]
    fn malformed_specs_are_rejected() {
        assert!(matches!(
            parse_bound("phi", &names()),
            Err(ParseError::InvalidBoundFormat(_))
        ));
        assert!(matches!(
            parse_bound("phi=1,2", &names()),
            Err(ParseError::InvalidBoundFormat(_))
        ));
        assert!(matches!(
            parse_bound("phi=[1,2", &names()),
            Err(ParseError::InvalidBoundFormat(_))
        ));
        assert!(matches!(
            parse_bound("phi=a..b", &names()),
            Err(ParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse_bound("phi=1..=", &names()),
            Err(ParseError::InvalidBoundFormat(_))
        ));
        assert_eq!(
            parse_bound("phi=2..1", &names()),
            Err(ParseError::EmptyRange("phi=2..1".to_string()))
        );
    }

    #[test]
    fn parse_bounds_fills_unmentioned_variables_and_rejects_duplicates() {
        let specs = vec!["psi=[0,1]".to_string()];
        let bounds = parse_bounds(&specs, &names()).unwrap();
        assert_eq!(bounds[0], CvBounds::unbounded());
        assert_eq!(bounds[1], CvBounds::closed(0.0, 1.0));

        let specs = vec!["psi=0..1".to_string(), "1=..2".to_string()];
        assert_eq!(
            parse_bounds(&specs, &names()),
            Err(ParseError::DuplicateVariable("psi".to_string()))
        );
    }
}
