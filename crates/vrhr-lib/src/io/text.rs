use anyhow::{Context, Result};
use std::path::Path;

/// Parse a plain list of numbers (one or more per line, separated by commas or whitespace).
///
/// Blank lines and `#` comments are ignored.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or_default();
        for token in content
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let val: f64 = token
                .parse()
                .with_context(|| format!("line {}: `{}` is not a number", idx + 1, token))?;
            if !val.is_finite() {
                anyhow::bail!("line {}: `{}` is not finite", idx + 1, token);
            }
            out.push(val);
        }
    }
    if out.is_empty() {
        anyhow::bail!("no numeric values found");
    }
    Ok(out)
}

pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text).with_context(|| format!("in {}", path.display()))
}
