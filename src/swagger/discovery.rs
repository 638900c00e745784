//! Contract file discovery.

use std::{collections::HashSet, path::Path};

use glob::Pattern;

use super::{LoadError, LoadResult, loader::normalize_path};
use crate::config::ValidatorConfig;

/// Lists the contract files to load, in discovery order without duplicates.
///
/// Explicit `swagger_paths` win; otherwise every include pattern is expanded
/// under `directory` and files matching an exclude pattern (tested against
/// both the full and the directory-relative path) are dropped.
pub fn discover_spec_paths(config: &ValidatorConfig) -> LoadResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    if !config.swagger_paths.is_empty() {
        for path in &config.swagger_paths {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                config.directory.join(path)
            };
            let path = normalize_path(&path);
            if seen.insert(path.clone()) {
                found.push(path);
            }
        }
        return Ok(found);
    }

    let excludes = config
        .excluded_swagger_paths_pattern
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|e| LoadError::Pattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })
        })
        .collect::<LoadResult<Vec<_>>>()?;

    for include in &config.swagger_paths_pattern {
        let pattern = config.directory.join(include);
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern).map_err(|e| LoadError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable path during discovery");
                    continue;
                }
            };
            if !path.is_file() || is_excluded(&path, &config.directory, &excludes) {
                continue;
            }
            let path = normalize_path(&path);
            if seen.insert(path.clone()) {
                found.push(path);
            }
        }
    }

    tracing::debug!(count = found.len(), "Discovered contract files");
    Ok(found)
}

fn is_excluded(path: &Path, directory: &Path, excludes: &[Pattern]) -> bool {
    let relative = path.strip_prefix(directory).unwrap_or(path);
    excludes
        .iter()
        .any(|pattern| pattern.matches_path(path) || pattern.matches_path(relative))
}
