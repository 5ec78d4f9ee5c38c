use anyhow::{Context, Result};
use url::Url;

/// Reads a newline-delimited site list: blank lines and lines starting with `#`
/// are skipped, everything else must parse as an absolute URL.
pub fn load(path: &str) -> Result<Vec<Url>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading site list at {path}"))?;

    let mut sites = Vec::new();
    for (line_no, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let url = Url::parse(line)
            .with_context(|| format!("{path}:{}: invalid URL {line:?}", line_no + 1))?;
        sites.push(url);
    }
    Ok(sites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn skips_blank_lines_and_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "http://a.onion/").unwrap();
        writeln!(file, "  ").unwrap();
        writeln!(file, "http://b.i2p/").unwrap();

        let sites = load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].host_str(), Some("a.onion"));
        assert_eq!(sites[1].host_str(), Some("b.i2p"));
    }

    #[test]
    fn rejects_an_unparseable_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a url").unwrap();
        assert!(load(file.path().to_str().unwrap()).is_err());
    }
}
