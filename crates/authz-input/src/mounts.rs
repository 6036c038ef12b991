// mounts.rs — Host bind-mount extraction and path resolution.
//
// A policy like "deny mounts of /etc" is trivially bypassed if it matches the
// literal path in the request: `/tmp/link-to-etc`, `/var/../etc` and
// `/etc/./` all reach the same directory. The resolver therefore reports each
// mount twice: as written (`Source`) and as the daemon will actually see it
// (`ResolvedSource`).
//
// Two request shapes carry bind mounts:
//
//   HostConfig.Binds  — ["<host>:<container>[:<mode>]", ...]
//   HostConfig.Mounts — [{"Type": "bind", "Source": ..., "Target": ..., "ReadOnly": ...}]
//
// Mounts is only consulted when Binds is absent or null.
//
// Resolution walks the path component by component, so a missing leaf under
// a symlinked directory still reports the directory's real location.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;

use crate::document::BindMount;

/// Extracts bind mounts from a container-create body.
pub struct MountResolver;

impl MountResolver {
    /// Collect every host bind mount declared by `body`, in request order.
    ///
    /// Named volumes, non-bind mount types and malformed entries are skipped
    /// individually. Duplicates are kept.
    pub fn resolve(body: &Value) -> Vec<BindMount> {
        let Some(host_config) = body.get("HostConfig") else {
            return Vec::new();
        };

        match host_config.get("Binds") {
            Some(Value::Array(binds)) => return binds.iter().filter_map(parse_bind).collect(),
            Some(Value::Null) | None => {}
            // Present but not an array: neither form applies.
            Some(_) => return Vec::new(),
        }

        match host_config.get("Mounts") {
            Some(Value::Array(mounts)) => mounts.iter().filter_map(parse_mount).collect(),
            _ => Vec::new(),
        }
    }
}

/// Parse one `HostConfig.Binds` entry.
fn parse_bind(entry: &Value) -> Option<BindMount> {
    let spec = entry.as_str()?;
    let source = spec.split(':').next().unwrap_or_default();
    let mode = spec.rsplit(':').next().unwrap_or_default();

    if !is_host_path(source) {
        tracing::debug!(bind = spec, "skipping named volume bind");
        return None;
    }

    Some(BindMount {
        source: source.to_string(),
        read_only: mode == "ro",
        resolved_source: resolve_host_path(source),
    })
}

/// Parse one `HostConfig.Mounts` entry. Only `Type == "bind"` counts.
fn parse_mount(entry: &Value) -> Option<BindMount> {
    if entry.get("Type").and_then(Value::as_str) != Some("bind") {
        return None;
    }
    let source = entry.get("Source").and_then(Value::as_str)?;
    entry.get("Target").and_then(Value::as_str)?;
    if source.is_empty() {
        return None;
    }

    Some(BindMount {
        source: source.to_string(),
        read_only: entry
            .get("ReadOnly")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        resolved_source: resolve_host_path(source),
    })
}

/// A bind source is a filesystem path; a bare name is a named volume.
fn is_host_path(source: &str) -> bool {
    !source.is_empty() && source.contains('/')
}

/// Resolve a host path the way the kernel will: symlinks followed, `..`
/// applied to the physical parent.
///
/// Components that do not exist yet are kept as written, under the real
/// location of their deepest existing ancestor, since that is where the
/// daemon creates a missing bind source.
fn resolve_host_path(source: &str) -> String {
    let absolute = std::path::absolute(source).unwrap_or_else(|_| Path::new("/").join(source));
    physical_path(&absolute, 0).to_string_lossy().into_owned()
}

/// Symlink hops followed through dangling links before giving up.
const MAX_SYMLINK_HOPS: usize = 40;

/// Walk `path` one component at a time. The prefix built so far never
/// contains a symlink, so popping it for `..` matches the kernel.
fn physical_path(path: &Path, hops: usize) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => resolved.push(prefix.as_os_str()),
            Component::RootDir => resolved.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                let candidate = resolved.join(part);
                resolved = follow(candidate, hops);
            }
        }
    }
    resolved
}

/// Real location of `candidate`, whose parent is already physical.
fn follow(candidate: PathBuf, hops: usize) -> PathBuf {
    if let Ok(real) = fs::canonicalize(&candidate) {
        return real;
    }
    // Missing, or a symlink whose target does not exist yet.
    match fs::read_link(&candidate) {
        Ok(target) if hops < MAX_SYMLINK_HOPS => {
            let parent = candidate
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("/"));
            physical_path(&parent.join(target), hops + 1)
        }
        _ => candidate,
    }
}
