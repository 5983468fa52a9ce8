use crate::error::RunnerError;
use regex::Regex;
use std::sync::OnceLock;

/// A `Scenario:` heading found in a feature file. Line numbers are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioHeading {
    pub line_number: usize,
    pub label: String,
}

fn heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*Scenario:\s*(.+)$").expect("valid heading pattern"))
}

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Scenario Outline:|Scenario:").expect("valid marker pattern"))
}

/// Scans feature-file text line by line and yields every `Scenario:` heading.
///
/// The match is case-sensitive and deliberately does not recognize
/// `Scenario Outline:` headings; outlines only participate in selection-based
/// runs via [`scenario_name_from_line`]. Lines that match nothing are skipped,
/// so arbitrary text yields an empty sequence rather than an error. The
/// captured label keeps its trailing whitespace.
pub fn scenario_headings(text: &str) -> impl Iterator<Item = ScenarioHeading> + '_ {
    text.split('\n').enumerate().filter_map(|(line_number, line)| {
        // Tolerate CRLF input.
        let line = line.strip_suffix('\r').unwrap_or(line);
        heading_pattern().captures(line).map(|caps| ScenarioHeading {
            line_number,
            label: caps[1].to_string(),
        })
    })
}

/// Extracts a runnable scenario name from the line under the user's selection.
///
/// A line containing `Scenario` has its `Scenario:` / `Scenario Outline:`
/// marker stripped and is trimmed; a tag line (trimmed text starting with `@`)
/// is returned trimmed, so the synthesizer can route it to tag-based tools.
/// Anything else is not a valid selection.
pub fn scenario_name_from_line(line: &str) -> Result<String, RunnerError> {
    let name = if line.contains("Scenario") {
        marker_pattern().replacen(line, 1, "").trim().to_string()
    } else if line.trim_start().starts_with('@') {
        line.trim().to_string()
    } else {
        return Err(RunnerError::ScenarioSelection(line.to_string()));
    };
    if name.is_empty() {
        return Err(RunnerError::ScenarioSelection(line.to_string()));
    }
    Ok(name)
}
