//! Crash recovery via JSON marker files on local disk.
//!
//! A small JSON marker is written when a run starts and removed when it
//! finishes, regardless of outcome. Any marker still on disk at startup
//! names a run that was in-flight when the previous runner process died —
//! `collect_crashed_runs` returns them so the caller can register each as a
//! terminal failed run.

use std::fs;
use std::path::{Path, PathBuf};

use rat_core::CrashMarker;

use crate::error::RunnerError;

fn marker_path(state_dir: &str, run_id: &str) -> PathBuf {
    Path::new(state_dir).join(format!("{run_id}.json"))
}

/// Write a marker for an in-flight run. Creates `state_dir` if missing.
pub fn write_marker(state_dir: &str, marker: &CrashMarker) -> Result<(), RunnerError> {
    fs::create_dir_all(state_dir)?;
    let body = serde_json::to_string(marker)?;
    fs::write(marker_path(state_dir, &marker.run_id), body)?;
    Ok(())
}

/// Remove the marker for a completed run. Best-effort — a missing file is
/// not an error.
pub fn remove_marker(state_dir: &str, run_id: &str) {
    match fs::remove_file(marker_path(state_dir, run_id)) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(run_id, error = %e, "failed to remove marker file"),
    }
}

/// Scan `state_dir` for leftover markers, returning one `CrashMarker` per
/// file and deleting each as it's read so they don't accumulate across
/// restarts. A corrupt marker is logged and discarded rather than panicking
/// the startup sequence.
pub fn collect_crashed_runs(state_dir: &str) -> Vec<CrashMarker> {
    let dir = Path::new(state_dir);
    if !dir.exists() {
        return Vec::new();
    }

    let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(read) => read
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect(),
        Err(e) => {
            tracing::warn!(state_dir, error = %e, "failed to read state dir");
            return Vec::new();
        }
    };
    entries.sort();

    let mut crashed = Vec::with_capacity(entries.len());
    for path in entries {
        match fs::read_to_string(&path) {
            Ok(body) => match serde_json::from_str::<CrashMarker>(&body) {
                Ok(marker) => crashed.push(marker),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt marker file"),
            },
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable marker file"),
        }
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove marker file");
        }
    }

    crashed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("rat-runner-test-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir.to_string_lossy().to_string()
    }

    #[test]
    fn write_then_remove_marker_leaves_nothing_behind() {
        let dir = tmp_dir("write-remove");
        let marker = CrashMarker {
            run_id: "r1".to_string(),
            namespace: "default".to_string(),
            layer: "silver".to_string(),
            pipeline_name: "orders".to_string(),
            trigger: "manual".to_string(),
        };
        write_marker(&dir, &marker).unwrap();
        assert!(marker_path(&dir, "r1").exists());
        remove_marker(&dir, "r1");
        assert!(!marker_path(&dir, "r1").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn collect_crashed_runs_reads_and_deletes_markers() {
        let dir = tmp_dir("collect");
        let marker = CrashMarker {
            run_id: "r2".to_string(),
            namespace: "default".to_string(),
            layer: "gold".to_string(),
            pipeline_name: "summary".to_string(),
            trigger: "scheduled".to_string(),
        };
        write_marker(&dir, &marker).unwrap();

        let crashed = collect_crashed_runs(&dir);
        assert_eq!(crashed.len(), 1);
        assert_eq!(crashed[0].run_id, "r2");
        assert!(!marker_path(&dir, "r2").exists());

        assert!(collect_crashed_runs(&dir).is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn collect_crashed_runs_on_missing_dir_is_empty() {
        let dir = tmp_dir("missing");
        assert!(collect_crashed_runs(&dir).is_empty());
    }

    #[test]
    fn corrupt_marker_is_skipped_not_panicking() {
        let dir = tmp_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        fs::write(Path::new(&dir).join("bad.json"), "{not json").unwrap();
        assert!(collect_crashed_runs(&dir).is_empty());
        let _ = fs::remove_dir_all(&dir);
    }
}
