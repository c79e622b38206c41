use std::path::Path;

use anyhow::{Context, Result};

/// One scenario command with the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFileEntry {
    pub line_number: usize,
    pub command: String,
}

/// Tally of a scenario replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandFileReport {
    pub total: usize,
    pub executed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub halted_early: bool,
}

/// Reads a scenario file, dropping blank lines and `#` comments.
pub fn parse_command_file(path: &Path) -> Result<Vec<CommandFileEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read command file {}", path.display()))?;
    Ok(parse_command_text(&raw))
}

pub fn parse_command_text(raw: &str) -> Vec<CommandFileEntry> {
    raw.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return None;
            }
            Some(CommandFileEntry {
                line_number: index + 1,
                command: trimmed.to_string(),
            })
        })
        .collect()
}
