//! Shared server state
//!
//! One [`Reconciler`] per server. At most one comparison runs at a time; its
//! handles live in the run slot so `/progress` and `/cancel` can reach them
//! while the worker owns the plan.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use recon_core::{
    CancellationHandle, ComparisonResult, CompareRequest, JoinPlan, ProgressHandle,
    ProgressSnapshot, Reconciler, Row, Separator, Side, PREVIEW_ROWS,
};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::ApiError;

/// Server settings taken from the command line
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Rows returned by `/upload`, at most [`PREVIEW_ROWS`]
    pub preview_rows: usize,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            preview_rows: PREVIEW_ROWS,
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Handles of the active run, or of the last one
#[derive(Debug, Default)]
struct RunSlot {
    cancel: Option<CancellationHandle>,
    progress: ProgressHandle,
}

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    reconciler: Arc<Mutex<Reconciler>>,
    run: Arc<Mutex<RunSlot>>,
    /// Uploaded files stay on disk until replaced
    uploads: Arc<Mutex<HashMap<Side, NamedTempFile>>>,
}

/// Poisoning only means another handler panicked; the data is still usable
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl AppState {
    pub fn new(mut config: ServerConfig) -> Self {
        if config.preview_rows > PREVIEW_ROWS {
            warn!(
                requested = config.preview_rows,
                max = PREVIEW_ROWS,
                "preview rows capped at loaded preview size"
            );
            config.preview_rows = PREVIEW_ROWS;
        }
        Self {
            config: Arc::new(config),
            reconciler: Arc::new(Mutex::new(Reconciler::new())),
            run: Arc::new(Mutex::new(RunSlot::default())),
            uploads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn reconciler(&self) -> MutexGuard<'_, Reconciler> {
        lock(&self.reconciler)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run).cancel.is_some()
    }

    /// Write uploaded bytes to a temp file and load it for `side`
    ///
    /// Returns the headers and the first preview rows. Blocking.
    pub fn load_upload(
        &self,
        side: Side,
        separator: Separator,
        bytes: &[u8],
    ) -> Result<(Vec<String>, Vec<Row>), ApiError> {
        let slot = lock(&self.run);
        if slot.cancel.is_some() {
            return Err(ApiError::Busy);
        }

        let mut file = NamedTempFile::new().map_err(recon_core::Error::Io)?;
        file.write_all(bytes).map_err(recon_core::Error::Io)?;
        file.flush().map_err(recon_core::Error::Io)?;

        let mut reconciler = self.reconciler();
        let headers = reconciler
            .load_preview(side, file.path(), separator)?
            .to_vec();
        let preview = reconciler.preview(side, self.config.preview_rows).to_vec();
        drop(reconciler);

        // replacing the entry deletes the previous upload
        lock(&self.uploads).insert(side, file);
        drop(slot);
        Ok((headers, preview))
    }

    /// Install the request's rules and claim the run slot
    pub fn begin_run(
        &self,
        request: &CompareRequest,
    ) -> Result<(JoinPlan, CancellationHandle, ProgressHandle), ApiError> {
        let mut slot = lock(&self.run);
        if slot.cancel.is_some() {
            return Err(ApiError::Busy);
        }

        let plan = {
            let mut reconciler = self.reconciler();
            reconciler.set_match_rules(request.match_rules.clone());
            reconciler.set_transfer_rules(request.transfer_rules.clone());
            reconciler.prepare()?
        };

        let cancel = CancellationHandle::new();
        let progress = ProgressHandle::new();
        slot.cancel = Some(cancel.clone());
        slot.progress = progress.clone();
        info!(start_index = request.start_index, "comparison started");
        Ok((plan, cancel, progress))
    }

    /// Keep a finished run's result for export
    pub fn store_result(&self, result: ComparisonResult) -> Arc<ComparisonResult> {
        self.reconciler().store_result(result)
    }

    /// Run `plan` on the calling thread, keep its result and release the slot
    ///
    /// The slot stays claimed until the run returns, even when the request
    /// that started it has gone away. Blocking.
    pub fn execute(
        &self,
        plan: JoinPlan,
        start_index: usize,
        cancel: &CancellationHandle,
        progress: &ProgressHandle,
    ) -> Result<Arc<ComparisonResult>, ApiError> {
        let _release = SlotRelease(self);
        let result = plan.run(start_index, cancel, progress)?;
        Ok(self.store_result(result))
    }

    /// Release the run slot; the progress handle stays readable
    pub fn end_run(&self) {
        lock(&self.run).cancel = None;
    }

    /// Trip the active run's cancellation handle
    pub fn cancel_run(&self) -> bool {
        match &lock(&self.run).cancel {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Latest progress and whether a run is active
    pub fn progress(&self) -> (ProgressSnapshot, bool) {
        let slot = lock(&self.run);
        (slot.progress.snapshot(), slot.cancel.is_some())
    }
}

struct SlotRelease<'a>(&'a AppState);

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.0.end_run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::MatchRule;

    fn loaded_state() -> AppState {
        let state = AppState::new(ServerConfig::default());
        state
            .load_upload(Side::A, Separator::COMMA, b"id\n1\n2\n")
            .unwrap();
        state
            .load_upload(Side::B, Separator::COMMA, b"id\n2\n")
            .unwrap();
        state
    }

    #[test]
    fn test_single_active_run() {
        let state = loaded_state();
        let request = CompareRequest {
            match_rules: vec![MatchRule::new("id", "id")],
            ..Default::default()
        };

        let (_plan, _cancel, _progress) = state.begin_run(&request).unwrap();
        assert!(state.is_running());
        assert!(matches!(state.begin_run(&request), Err(ApiError::Busy)));
        assert!(matches!(
            state.load_upload(Side::A, Separator::COMMA, b"id\n"),
            Err(ApiError::Busy)
        ));

        assert!(state.cancel_run());
        state.end_run();
        assert!(!state.is_running());
        assert!(!state.cancel_run());
        assert!(state.begin_run(&request).is_ok());
    }

    #[test]
    fn test_slot_held_until_worker_returns() {
        let state = loaded_state();
        let request = CompareRequest {
            match_rules: vec![MatchRule::new("id", "id")],
            ..Default::default()
        };

        let (plan, cancel, progress) = state.begin_run(&request).unwrap();
        // the request is gone but the worker has not finished
        cancel.cancel();
        assert!(matches!(state.begin_run(&request), Err(ApiError::Busy)));

        let result = state.execute(plan, 0, &cancel, &progress).unwrap();
        assert!(result.cancelled);
        assert!(!state.is_running());
        assert!(Arc::ptr_eq(&state.reconciler().last_result().unwrap(), &result));
        assert!(state.begin_run(&request).is_ok());
    }

    #[test]
    fn test_failed_run_releases_slot() {
        let state = loaded_state();
        let request = CompareRequest {
            match_rules: vec![MatchRule::new("id", "id")],
            ..Default::default()
        };
        let (plan, cancel, progress) = state.begin_run(&request).unwrap();
        let path = state
            .reconciler()
            .file(Side::A)
            .map(|f| f.source.path.clone())
            .unwrap();
        std::fs::remove_file(path).unwrap();

        assert!(state.execute(plan, 0, &cancel, &progress).is_err());
        assert!(!state.is_running());
    }

    #[test]
    fn test_preview_rows_capped() {
        let state = AppState::new(ServerConfig {
            preview_rows: PREVIEW_ROWS * 5,
            ..Default::default()
        });
        assert_eq!(state.config.preview_rows, PREVIEW_ROWS);

        let state = AppState::new(ServerConfig {
            preview_rows: 3,
            ..Default::default()
        });
        assert_eq!(state.config.preview_rows, 3);
    }

    #[test]
    fn test_failed_prepare_leaves_slot_free() {
        let state = AppState::new(ServerConfig::default());
        let err = state.begin_run(&CompareRequest::default()).unwrap_err();
        assert!(matches!(err, ApiError::Core(recon_core::Error::FileNotLoaded(Side::A))));
        assert!(!state.is_running());
    }

    #[test]
    fn test_upload_keeps_temp_file() {
        let state = loaded_state();
        let path = state
            .reconciler()
            .file(Side::A)
            .map(|f| f.source.path.clone())
            .unwrap();
        assert!(path.exists());
    }
}
