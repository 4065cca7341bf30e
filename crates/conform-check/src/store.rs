use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use conform_core::{CheckId, CheckRecord, CheckStatus, ConformError, ResultSummary};
use serde::Serialize;
use tracing::{debug, warn};

/// Largest page `list` will return.
pub const MAX_PAGE_SIZE: usize = 100;

/// Page size used when the caller does not ask for one.
const DEFAULT_PAGE_SIZE: usize = 20;

/// Message recorded when a pipeline task ends without finishing its check.
const ABORTED: &str = "check aborted unexpectedly";

struct Entry {
    record: CheckRecord,
    report: Option<String>,
}

/// In-memory registry of checks and their rendered reports.
///
/// The lock is only held while copying records in or out, never across an
/// `.await`.
#[derive(Default)]
pub struct CheckStore {
    inner: Mutex<HashMap<CheckId, Entry>>,
}

/// Criteria for [`CheckStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    /// Exact status match.
    pub status: Option<CheckStatus>,
    /// Case-insensitive substring of the repository name.
    pub repository: Option<String>,
    /// Page size, clamped to [`MAX_PAGE_SIZE`].
    pub limit: usize,
    /// Records skipped before the page starts.
    pub offset: usize,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            status: None,
            repository: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// One page of checks, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct CheckPage {
    /// Matching checks before pagination.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub checks: Vec<CheckRecord>,
}

impl CheckStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CheckId, Entry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new record and hand out the only writer for it.
    pub fn insert(self: &Arc<Self>, record: CheckRecord) -> CheckWriter {
        let id = record.check_id.clone();
        self.lock().insert(
            id.clone(),
            Entry {
                record,
                report: None,
            },
        );
        CheckWriter {
            store: Arc::clone(self),
            id,
            finished: false,
        }
    }

    /// Snapshot of one record.
    ///
    /// # Errors
    ///
    /// Returns [`ConformError::NotFound`] for unknown ids.
    pub fn get(&self, id: &CheckId) -> Result<CheckRecord, ConformError> {
        self.lock()
            .get(id)
            .map(|e| e.record.clone())
            .ok_or_else(|| ConformError::NotFound(id.to_string()))
    }

    /// The rendered report of a completed check.
    ///
    /// # Errors
    ///
    /// - [`ConformError::NotFound`] for unknown ids
    /// - [`ConformError::NotReady`] while the check has not completed
    pub fn report(&self, id: &CheckId) -> Result<String, ConformError> {
        let guard = self.lock();
        let entry = guard
            .get(id)
            .ok_or_else(|| ConformError::NotFound(id.to_string()))?;
        match (&entry.record.status, &entry.report) {
            (CheckStatus::Completed, Some(report)) => Ok(report.clone()),
            _ => Err(ConformError::NotReady(id.to_string())),
        }
    }

    /// Drop a record and its report.
    ///
    /// # Errors
    ///
    /// Returns [`ConformError::NotFound`] if the id is unknown or was already
    /// removed.
    pub fn remove(&self, id: &CheckId) -> Result<CheckRecord, ConformError> {
        self.lock()
            .remove(id)
            .map(|e| e.record)
            .ok_or_else(|| ConformError::NotFound(id.to_string()))
    }

    /// Filter, sort by start time (newest first) and paginate.
    pub fn list(&self, filter: &ListFilter) -> CheckPage {
        let mut matching: Vec<CheckRecord> = self
            .lock()
            .values()
            .filter(|e| filter.status.is_none_or(|s| e.record.status == s))
            .filter(|e| {
                filter
                    .repository
                    .as_deref()
                    .is_none_or(|n| e.record.repository.contains(n))
            })
            .map(|e| e.record.clone())
            .collect();
        matching.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.check_id.cmp(&b.check_id))
        });

        let limit = filter.limit.min(MAX_PAGE_SIZE);
        let total = matching.len();
        let checks = matching
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .collect();
        CheckPage {
            total,
            limit,
            offset: filter.offset,
            checks,
        }
    }

    /// Number of checks not yet completed or failed.
    pub fn active_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|e| !e.record.status.is_terminal())
            .count()
    }

    /// Apply `f` to a live, non-terminal entry. Returns `false` if the check
    /// was removed or has already finished.
    fn update(&self, id: &CheckId, f: impl FnOnce(&mut Entry)) -> bool {
        let mut guard = self.lock();
        match guard.get_mut(id) {
            Some(entry) if !entry.record.status.is_terminal() => {
                f(entry);
                true
            }
            Some(_) => {
                warn!(check_id = %id, "ignoring update to finished check");
                false
            }
            None => {
                debug!(check_id = %id, "ignoring update to deleted check");
                false
            }
        }
    }
}

/// Exclusive write access to one check's record.
///
/// Owned by the check's pipeline task. Finishing consumes the writer; a writer
/// dropped before finishing (including during a panic) marks the check failed.
pub struct CheckWriter {
    store: Arc<CheckStore>,
    id: CheckId,
    finished: bool,
}

impl CheckWriter {
    pub fn id(&self) -> &CheckId {
        &self.id
    }

    /// Move to `running` and record a progress checkpoint. Progress never
    /// goes backwards.
    pub fn advance(&self, progress: u8, message: &str) {
        self.store.update(&self.id, |entry| {
            let record = &mut entry.record;
            record.status = CheckStatus::Running;
            record.progress = record.progress.max(progress.min(100));
            record.message = message.to_string();
        });
    }

    /// Finish successfully with a summary and the rendered report.
    pub fn complete(mut self, summary: ResultSummary, report: String) {
        self.finished = true;
        self.store.update(&self.id, |entry| {
            let record = &mut entry.record;
            record.status = CheckStatus::Completed;
            record.progress = 100;
            record.message = "Check completed".into();
            record.completed_at = Some(Utc::now());
            record.results = Some(summary);
            entry.report = Some(report);
        });
    }

    /// Finish with an already sanitized error description.
    pub fn fail(mut self, error: impl Into<String>) {
        self.finished = true;
        self.mark_failed(error.into());
    }

    fn mark_failed(&self, error: String) {
        self.store.update(&self.id, |entry| {
            let record = &mut entry.record;
            record.status = CheckStatus::Failed;
            record.message = "Check failed".into();
            record.completed_at = Some(Utc::now());
            record.error = Some(error);
        });
    }
}

impl Drop for CheckWriter {
    fn drop(&mut self) {
        if !self.finished {
            warn!(check_id = %self.id, "check writer dropped before finishing");
            self.mark_failed(ABORTED.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use conform_core::CheckRequest;

    fn record(url: &str) -> CheckRecord {
        CheckRecord::new(CheckId::generate(), &CheckRequest::new(url), Utc::now())
    }

    fn store() -> Arc<CheckStore> {
        Arc::new(CheckStore::new())
    }

    #[test]
    fn insert_then_get_snapshot() {
        let store = store();
        let rec = record("https://example.com/org/app.git");
        let writer = store.insert(rec.clone());
        let got = store.get(writer.id()).unwrap();
        assert_eq!(got, rec);
        assert_eq!(got.status, CheckStatus::Started);
        writer.fail("x");
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let store = store();
        let id = CheckId::from("chk_missing");
        assert!(matches!(store.get(&id), Err(ConformError::NotFound(_))));
        assert!(matches!(store.report(&id), Err(ConformError::NotFound(_))));
        assert!(matches!(store.remove(&id), Err(ConformError::NotFound(_))));
    }

    #[test]
    fn progress_is_monotone() {
        let store = store();
        let writer = store.insert(record("https://example.com/org/app.git"));
        writer.advance(50, "Analyzing code...");
        writer.advance(30, "late");
        let got = store.get(writer.id()).unwrap();
        assert_eq!(got.status, CheckStatus::Running);
        assert_eq!(got.progress, 50);
        assert_eq!(got.message, "late");
        writer.fail("done");
    }

    #[test]
    fn report_only_after_completion() {
        let store = store();
        let writer = store.insert(record("https://example.com/org/app.git"));
        let id = writer.id().clone();
        assert!(matches!(store.report(&id), Err(ConformError::NotReady(_))));
        writer.advance(80, "Generating report...");
        assert!(matches!(store.report(&id), Err(ConformError::NotReady(_))));

        writer.complete(ResultSummary::default(), "# Compliance TODO".into());
        assert_eq!(store.report(&id).unwrap(), "# Compliance TODO");
        let got = store.get(&id).unwrap();
        assert_eq!(got.progress, 100);
        assert_eq!(got.message, "Check completed");
        assert!(got.completed_at.is_some());
        assert!(got.results.is_some());
    }

    #[test]
    fn failed_check_has_no_report_and_keeps_progress() {
        let store = store();
        let writer = store.insert(record("https://example.com/org/app.git"));
        let id = writer.id().clone();
        writer.advance(30, "Loading specifications...");
        writer.fail("clone failed");
        let got = store.get(&id).unwrap();
        assert_eq!(got.status, CheckStatus::Failed);
        assert_eq!(got.progress, 30);
        assert_eq!(got.error.as_deref(), Some("clone failed"));
        assert!(got.results.is_none());
        assert!(matches!(store.report(&id), Err(ConformError::NotReady(_))));
    }

    #[test]
    fn dropped_writer_marks_failed() {
        let store = store();
        let writer = store.insert(record("https://example.com/org/app.git"));
        let id = writer.id().clone();
        writer.advance(10, "Cloning repository...");
        drop(writer);
        let got = store.get(&id).unwrap();
        assert_eq!(got.status, CheckStatus::Failed);
        assert_eq!(got.error.as_deref(), Some(ABORTED));
    }

    #[test]
    fn panicking_task_marks_failed() {
        let store = store();
        let writer = store.insert(record("https://example.com/org/app.git"));
        let id = writer.id().clone();
        let result = std::thread::spawn(move || {
            writer.advance(50, "Analyzing code...");
            panic!("analyzer blew up");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(store.get(&id).unwrap().status, CheckStatus::Failed);
    }

    #[test]
    fn writes_after_removal_are_dropped() {
        let store = store();
        let writer = store.insert(record("https://example.com/org/app.git"));
        let id = writer.id().clone();
        store.remove(&id).unwrap();
        writer.advance(50, "Analyzing code...");
        writer.complete(ResultSummary::default(), "report".into());
        assert!(matches!(store.get(&id), Err(ConformError::NotFound(_))));
        assert!(matches!(store.remove(&id), Err(ConformError::NotFound(_))));
    }

    #[test]
    fn list_filters_sorts_and_paginates() {
        let store = store();
        let now = Utc::now();
        let mut writers = Vec::new();
        for (i, url) in [
            "https://example.com/org/alpha.git",
            "https://example.com/org/beta.git",
            "https://example.com/org/alphabet.git",
        ]
        .iter()
        .enumerate()
        {
            let mut rec = record(url);
            rec.started_at = now + Duration::seconds(i as i64);
            writers.push(store.insert(rec));
        }
        writers.remove(1).fail("boom");

        let all = store.list(&ListFilter::default());
        assert_eq!(all.total, 3);
        let names: Vec<&str> = all.checks.iter().map(|c| c.repository.as_str()).collect();
        assert_eq!(names, vec!["alphabet", "beta", "alpha"]);

        let alpha = store.list(&ListFilter {
            repository: Some("alpha".into()),
            ..ListFilter::default()
        });
        assert_eq!(alpha.total, 2);

        let shouted = store.list(&ListFilter {
            repository: Some("ALPHA".into()),
            ..ListFilter::default()
        });
        assert_eq!(shouted.total, 0);

        let failed = store.list(&ListFilter {
            status: Some(CheckStatus::Failed),
            ..ListFilter::default()
        });
        assert_eq!(failed.total, 1);
        assert_eq!(failed.checks[0].repository, "beta");

        let page = store.list(&ListFilter {
            limit: 1,
            offset: 1,
            ..ListFilter::default()
        });
        assert_eq!(page.total, 3);
        assert_eq!(page.checks.len(), 1);
        assert_eq!(page.checks[0].repository, "beta");

        let capped = store.list(&ListFilter {
            limit: 1_000,
            ..ListFilter::default()
        });
        assert_eq!(capped.limit, MAX_PAGE_SIZE);

        assert_eq!(store.active_count(), 2);
        for w in writers {
            w.fail("cleanup");
        }
        assert_eq!(store.active_count(), 0);
    }
}
