//! Candidate file loader (spec §6 "Candidate input"): one proxy URL per line,
//! `#` comments and blank lines skipped, optional trailing fields ignored.

use anyhow::{Context, Result};
use proxyhawk_core::Candidate;
use std::path::Path;

/// Reads `path` into a list of `Candidate`s. Scheme defaults are applied later
/// by `proxyhawk_core::normalize` — this loader only splits lines, it never
/// rejects a malformed URL itself.
pub fn load_candidates(path: &Path) -> Result<Vec<Candidate>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading candidate file {}", path.display()))?;
    Ok(parse_candidates(&contents))
}

fn parse_candidates(contents: &str) -> Vec<Candidate> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.split_whitespace().next().unwrap_or(line))
        .map(Candidate::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_lines_and_comments() {
        let input = "\n# a comment\nhttp://1.2.3.4:8080\n\n  # indented comment\n5.6.7.8:1080\n";
        let candidates = parse_candidates(input);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].raw, "http://1.2.3.4:8080");
        assert_eq!(candidates[1].raw, "5.6.7.8:1080");
    }

    #[test]
    fn ignores_trailing_whitespace_separated_fields() {
        let input = "1.2.3.4:8080 some annotation here\n";
        let candidates = parse_candidates(input);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].raw, "1.2.3.4:8080");
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "# header\nhttp://example.com:3128\n").unwrap();
        let candidates = load_candidates(file.path()).unwrap();
        assert_eq!(candidates.len(), 1);
    }
}
