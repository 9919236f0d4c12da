use std::collections::HashMap;
use std::fs;
use std::path::Path;
use anyhow::{Context, Result};

pub const SEPARATOR: &str = "::";

/// Trigger -> action pairs, one `trigger::action` per line.
pub type CommandDictionary = HashMap<String, String>;

pub fn parse(contents: &str) -> CommandDictionary {
    contents
        .lines()
        .filter_map(|line| line.split_once(SEPARATOR))
        .map(|(trigger, action)| (trigger.to_string(), action.to_string()))
        .collect()
}

/// Read fresh from disk on every call so operator edits apply immediately.
pub fn load(path: &Path) -> Result<CommandDictionary> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read command file {}", path.display()))?;
    Ok(parse(&contents))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use super::*;

    #[test]
    fn ignores_lines_without_separator() {
        let dictionary = parse("weather::https://example.com/weather\njust a note\n\n");
        assert_eq!(dictionary.len(), 1);
        assert_eq!(dictionary["weather"], "https://example.com/weather");
    }

    #[test]
    fn later_duplicates_win() {
        let dictionary = parse("ip::http://one\nip::http://two\r\n");
        assert_eq!(dictionary["ip"], "http://two");
    }

    #[test]
    fn action_keeps_nested_separators() {
        let dictionary = parse("reboot::cmd::sudo reboot\nhangup::dial::ath");
        assert_eq!(dictionary["reboot"], "cmd::sudo reboot");
        assert_eq!(dictionary["hangup"], "dial::ath");
    }

    #[test]
    fn load_sees_edits_between_calls() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a::http://first").unwrap();
        assert_eq!(load(file.path()).unwrap()["a"], "http://first");

        writeln!(file, "a::http://second").unwrap();
        assert_eq!(load(file.path()).unwrap()["a"], "http://second");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.txt")).is_err());
    }
}
