//! Generated `.env` file for dynamic deployments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Render `KEY=value` lines: keys upper-cased, unset values omitted.
pub fn render(env: &BTreeMap<String, Option<String>>) -> String {
    env.iter()
        .filter_map(|(key, value)| {
            value
                .as_ref()
                .map(|value| format!("{}={value}", key.to_uppercase()))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write the rendered file into `root`, replacing any existing one.
///
/// A line break in a key or value would inject extra entries, so such an
/// env map is refused with `InvalidData` and nothing is written.
pub fn write(
    root: &Path,
    file_name: &str,
    env: &BTreeMap<String, Option<String>>,
) -> std::io::Result<PathBuf> {
    let breaks_line = |s: &str| s.contains(['\n', '\r']);
    if let Some((key, _)) = env
        .iter()
        .find(|(key, value)| breaks_line(key) || value.as_deref().is_some_and(breaks_line))
    {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("line break in environment entry {}", key.to_uppercase()),
        ));
    }

    let path = root.join(file_name);
    std::fs::write(&path, render(env))?;
    Ok(path)
}
