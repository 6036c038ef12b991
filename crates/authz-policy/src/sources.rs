// sources.rs — Locating and reading Rego policy sources.
//
// A policy location is either a single file or a directory. Directories are
// scanned recursively for `*.rego`, in sorted order so that load order (and
// therefore the config hash) is stable.

use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::error::PolicyError;

/// One policy module: its display name and its text.
#[derive(Debug, Clone)]
pub struct PolicySource {
    pub name: String,
    pub text: String,
}

impl PolicySource {
    /// The module's package path, as declared (`docker.authz`).
    ///
    /// Comment lines and blank lines before the declaration are skipped.
    pub fn package(&self) -> Option<&str> {
        self.text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#'))
            .and_then(|line| line.strip_prefix("package"))
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .and_then(|rest| rest.split_whitespace().next())
    }
}

/// Expand a policy location into the list of `.rego` files it names.
pub fn rego_files(location: &Path) -> Result<Vec<PathBuf>, PolicyError> {
    if !location.is_dir() {
        return Ok(vec![location.to_path_buf()]);
    }

    let pattern = format!(
        "{}/**/*.rego",
        Pattern::escape(&location.to_string_lossy())
    );
    let entries = glob::glob(&pattern).map_err(|e| PolicyError::Config(e.to_string()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            PolicyError::ReadFailed {
                path,
                source: std::io::Error::from(e),
            }
        })?;
        files.push(path);
    }
    files.sort();

    if files.is_empty() {
        return Err(PolicyError::Config(format!(
            "no .rego files found under {}",
            location.display()
        )));
    }
    Ok(files)
}

/// Read one policy file.
pub fn read_source(path: &Path) -> Result<PolicySource, PolicyError> {
    let text = std::fs::read_to_string(path).map_err(|source| PolicyError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(PolicySource {
        name: path.display().to_string(),
        text,
    })
}

/// Read every policy file under every location, in order.
pub fn load_sources(locations: &[PathBuf]) -> Result<Vec<PolicySource>, PolicyError> {
    let mut sources = Vec::new();
    for location in locations {
        for file in rego_files(location)? {
            sources.push(read_source(&file)?);
        }
    }
    Ok(sources)
}
