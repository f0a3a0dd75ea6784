//! Concurrent verification of many descriptor files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::history::HistorySource;
use crate::issue::{IssueKind, Layer, ValidationIssue, ValidationResult, code};
use crate::verifier::{Verifier, VerifyContext};

/// Detached signature files sitting next to descriptors.
const SIGNATURE_SUFFIX: &str = ".sig.json";

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub result: ValidationResult,
}

impl FileReport {
    fn failed(path: PathBuf, code: &str, message: String) -> Self {
        Self {
            path,
            result: ValidationResult::rejected(ValidationIssue::critical(
                Layer::Schema,
                IssueKind::StructuralError,
                code,
                message,
            )),
        }
    }
}

fn is_descriptor(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.ends_with(".json") && !name.ends_with(SIGNATURE_SUFFIX)
}

/// Expand directories into the `*.json` descriptors below them.
///
/// Plain file arguments are kept as given, even if they do not exist; the
/// batch run reports them as unreadable. The output is sorted and deduplicated.
#[must_use]
pub fn collect_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if !path.is_dir() {
            out.push(path.clone());
            continue;
        }
        let pattern = format!("{}/**/*.json", glob::Pattern::escape(&path.to_string_lossy()));
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("invalid search pattern for {}: {e}", path.display());
                continue;
            }
        };
        for entry in entries {
            match entry {
                Ok(found) if found.is_file() && is_descriptor(&found) => out.push(found),
                Ok(_) => {}
                Err(e) => tracing::warn!("skipping unreadable entry: {e}"),
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

fn verify_text(
    verifier: &Verifier,
    history: &dyn HistorySource,
    text: &str,
    now: DateTime<Utc>,
) -> ValidationResult {
    verifier
        .verify_str_with(text, |value| {
            let record = value
                .get("skill_id")
                .and_then(Value::as_str)
                .map(|id| history.history(id))
                .unwrap_or_default();
            VerifyContext::at(now).with_history(record)
        })
        .result
}

async fn verify_file(
    verifier: Arc<Verifier>,
    history: Arc<dyn HistorySource>,
    path: PathBuf,
    now: DateTime<Utc>,
) -> FileReport {
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) => {
            let message = format!("failed to read {}: {e}", path.display());
            return FileReport::failed(path, code::IO_ERROR, message);
        }
    };
    let result =
        tokio::task::spawn_blocking(move || verify_text(&verifier, history.as_ref(), &text, now))
            .await;
    match result {
        Ok(result) => FileReport { path, result },
        Err(e) => {
            let message = format!("verification aborted: {e}");
            FileReport::failed(path, code::LAYER_FAILED, message)
        }
    }
}

/// Verify every path with at most `workers` files in flight.
///
/// Every input yields exactly one report, sorted by path.
pub async fn verify_batch(
    verifier: Arc<Verifier>,
    paths: Vec<PathBuf>,
    history: Arc<dyn HistorySource>,
    workers: usize,
    now: DateTime<Utc>,
) -> Vec<FileReport> {
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut join_set = JoinSet::new();
    let mut pending = HashMap::with_capacity(paths.len());

    for path in paths {
        let verifier = Arc::clone(&verifier);
        let history = Arc::clone(&history);
        let permits = Arc::clone(&permits);
        let task_path = path.clone();
        let handle = join_set.spawn(async move {
            let _permit = permits.acquire_owned().await;
            verify_file(verifier, history, task_path, now).await
        });
        pending.insert(handle.id(), path);
    }

    let mut reports = Vec::with_capacity(pending.len());
    while let Some(joined) = join_set.join_next_with_id().await {
        match joined {
            Ok((id, report)) => {
                pending.remove(&id);
                tracing::info!(
                    path = %report.path.display(),
                    verdict = %report.result.verdict,
                    confidence = report.result.confidence,
                    "verified"
                );
                reports.push(report);
            }
            Err(e) => {
                tracing::warn!("verification task failed: {e}");
                if let Some(path) = pending.remove(&e.id()) {
                    let message = format!("verification task failed: {e}");
                    reports.push(FileReport::failed(path, code::LAYER_FAILED, message));
                }
            }
        }
    }

    reports.sort_by(|a, b| a.path.cmp(&b.path));
    reports
}
