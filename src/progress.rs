//! Best-effort progress sidecar for batch runs.

use std::{fs, path::Path};

use serde::Serialize;

#[derive(Serialize)]
struct Progress<'a> {
    current: usize,
    total: usize,
    level: &'a str,
    status: &'a str,
}

/// Overwrite `path` with the batch position. Failures are ignored; the
/// sidecar is advisory.
pub fn write_progress(path: &Path, current: usize, total: usize, level: &str, status: &str) {
    let progress = Progress {
        current,
        total,
        level,
        status,
    };
    if let Ok(json) = serde_json::to_string(&progress) {
        let _ = fs::write(path, json);
    }
}
