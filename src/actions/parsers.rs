//! Parsers for the text printed by host tools.
//!
//! `pactl` and `amixer` report volume and mute state in overlapping but
//! different shapes; both are accepted.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no output to parse")]
    Empty,
    #[error("not a number: '{0}'")]
    NotNumeric(String),
    #[error("no volume percentage in '{0}'")]
    NoVolume(String),
    #[error("no mute marker in '{0}'")]
    NoMuteMarker(String),
}

fn volume_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // pactl: "Volume: front-left: 65536 / 100% / 0.00 dB"; amixer: "[75%]"
        [r"(\d+)%", r"\[(\d+)%\]"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

fn mute_patterns() -> &'static [(Regex, bool)] {
    static PATTERNS: OnceLock<Vec<(Regex, bool)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // Muted markers first: amixer prints both [on] and [off] for some controls.
        [
            (r"(?i)mute:\s*yes", true),
            (r"(?i)\[off\]", true),
            (r"(?i)mute:\s*no", false),
            (r"(?i)\[on\]", false),
        ]
        .iter()
        .filter_map(|(p, muted)| Regex::new(p).ok().map(|re| (re, *muted)))
        .collect()
    })
}

fn parse_percentage(output: &str) -> Result<f64, ParseError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| ParseError::NotNumeric(trimmed.to_string()))
}

pub fn parse_cpu_usage(output: &str) -> Result<f64, ParseError> {
    parse_percentage(output)
}

pub fn parse_ram_usage(output: &str) -> Result<f64, ParseError> {
    parse_percentage(output)
}

pub fn parse_uptime(output: &str) -> Result<String, ParseError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(trimmed.to_string())
}

/// First percentage in the output, e.g. `55` from `... / 55% / ...`.
pub fn parse_volume_level(output: &str) -> Result<u32, ParseError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }
    volume_patterns()
        .iter()
        .find_map(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .ok_or_else(|| ParseError::NoVolume(trimmed.to_string()))
}

pub fn parse_mute_status(output: &str) -> Result<bool, ParseError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }
    mute_patterns()
        .iter()
        .find(|(re, _)| re.is_match(trimmed))
        .map(|(_, muted)| *muted)
        .ok_or_else(|| ParseError::NoMuteMarker(trimmed.to_string()))
}
