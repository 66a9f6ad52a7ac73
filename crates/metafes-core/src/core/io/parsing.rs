use std::f64::consts::PI;
use std::str::SplitWhitespace;

/// Parses a float column, accepting the `pi` / `-pi` spelling used in
/// PLUMED-style headers.
pub(crate) fn parse_float(token: &str) -> Option<f64> {
    match token.trim().to_ascii_lowercase().as_str() {
        "pi" | "+pi" => Some(PI),
        "-pi" => Some(-PI),
        other => other.parse().ok(),
    }
}

/// Splits a `#! KEYWORD rest...` header line.
pub(crate) fn header_directive(line: &str) -> Option<(&str, SplitWhitespace<'_>)> {
    let rest = line.trim_start().strip_prefix("#!")?;
    let mut tokens = rest.split_whitespace();
    let keyword = tokens.next()?;
    Some((keyword, tokens))
}

pub(crate) fn is_comment_or_blank(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('@')
}
