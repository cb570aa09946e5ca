//! C FFI bindings for recon-core
//!
//! This crate provides a C-compatible API over the [`Reconciler`] service for
//! native desktop hosts. All functions take the handle by const pointer: a
//! host may call `recon_progress` or `recon_cancel` from its UI thread while
//! `recon_compare` runs on a worker thread.
//!
//! Functions returning `c_int` report `RECON_OK` or a negative error code;
//! the message of the last failure on the calling thread is available from
//! `recon_last_error`.

use recon_core::{
    CancellationHandle, CompareRequest, ComparisonResult, Error, ExportKind, ProgressHandle,
    Reconciler, RunPhase, Separator, Side,
};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

pub const RECON_OK: c_int = 0;
/// Null pointer, bad side or non UTF-8 string
pub const RECON_ERR_ARGUMENT: c_int = -1;
/// Invalid separator, rules or JSON
pub const RECON_ERR_FORMAT: c_int = -2;
/// File not loaded, no result, or a run already active
pub const RECON_ERR_STATE: c_int = -3;
/// Reading or writing a file failed
pub const RECON_ERR_IO: c_int = -4;

pub const RECON_SIDE_A: c_int = 0;
pub const RECON_SIDE_B: c_int = 1;

pub const RECON_EXPORT_RESULTS: c_int = 0;
pub const RECON_EXPORT_NOT_FOUND: c_int = 1;

pub const RECON_COUNT_TOTAL_A: c_int = 0;
pub const RECON_COUNT_TOTAL_B: c_int = 1;
pub const RECON_COUNT_MATCHES: c_int = 2;
pub const RECON_COUNT_MODIFIED: c_int = 3;
pub const RECON_COUNT_NOT_FOUND_IN_B: c_int = 4;
pub const RECON_COUNT_NOT_FOUND_IN_A: c_int = 5;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: impl Into<String>) {
    let msg = msg.into();
    tracing::debug!(error = %msg, "ffi call failed");
    let msg = CString::new(msg.replace('\0', " ")).ok();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = msg);
}

fn fail(code: c_int, msg: impl Into<String>) -> c_int {
    set_last_error(msg);
    code
}

fn error_code(e: &Error) -> c_int {
    match e {
        e if e.is_format_error() => RECON_ERR_FORMAT,
        Error::FileNotLoaded(_) | Error::NoResult | Error::DuplicateKey { .. } => RECON_ERR_STATE,
        _ => RECON_ERR_IO,
    }
}

fn report(e: Error) -> c_int {
    fail(error_code(&e), e.to_string())
}

fn side_from(side: c_int) -> Option<Side> {
    match side {
        RECON_SIDE_A => Some(Side::A),
        RECON_SIDE_B => Some(Side::B),
        _ => None,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

unsafe fn str_arg<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}

fn into_c_string(s: &str) -> *mut c_char {
    CString::new(s)
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}

#[derive(Default)]
struct RunHandles {
    cancel: Option<CancellationHandle>,
    progress: ProgressHandle,
}

/// Opaque handle to a reconciler
pub struct FfiReconciler {
    inner: Mutex<Reconciler>,
    start_index: Mutex<usize>,
    run: Mutex<RunHandles>,
}

impl FfiReconciler {
    fn last_result(&self) -> Option<Arc<ComparisonResult>> {
        lock(&self.inner).last_result()
    }
}

/// Create a reconciler
///
/// The returned handle must be released with `recon_free`.
#[no_mangle]
pub extern "C" fn recon_new() -> *mut FfiReconciler {
    Box::into_raw(Box::new(FfiReconciler {
        inner: Mutex::new(Reconciler::new()),
        start_index: Mutex::new(0),
        run: Mutex::new(RunHandles::default()),
    }))
}

/// Free a reconciler
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new` or null
/// - No other call may be using the handle
#[no_mangle]
pub unsafe extern "C" fn recon_free(handle: *mut FfiReconciler) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Load the headers and first rows of a file for one side
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new`
/// - `path` must be a valid C string
#[no_mangle]
pub unsafe extern "C" fn recon_load_file(
    handle: *const FfiReconciler,
    side: c_int,
    path: *const c_char,
    separator: c_char,
) -> c_int {
    if handle.is_null() {
        return fail(RECON_ERR_ARGUMENT, "null handle");
    }
    let Some(side) = side_from(side) else {
        return fail(RECON_ERR_ARGUMENT, format!("invalid side {}", side));
    };
    let Some(path) = str_arg(path) else {
        return fail(RECON_ERR_ARGUMENT, "path must be a UTF-8 C string");
    };
    let separator = match Separator::from_char(separator as u8 as char) {
        Ok(s) => s,
        Err(e) => return report(e),
    };

    let handle = &*handle;
    if lock(&handle.run).cancel.is_some() {
        return fail(RECON_ERR_STATE, "a comparison is running");
    }
    match lock(&handle.inner).load_preview(side, PathBuf::from(path), separator) {
        Ok(_) => RECON_OK,
        Err(e) => report(e),
    }
}

/// Number of header columns loaded for a side
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new`
#[no_mangle]
pub unsafe extern "C" fn recon_header_count(handle: *const FfiReconciler, side: c_int) -> usize {
    if handle.is_null() {
        return 0;
    }
    match side_from(side) {
        Some(side) => lock(&(*handle).inner).headers(side).len(),
        None => 0,
    }
}

/// Get a header name by index
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new`
/// - Returns null if index is out of bounds
/// - Caller must free the returned string with `recon_free_string`
#[no_mangle]
pub unsafe extern "C" fn recon_header_name(
    handle: *const FfiReconciler,
    side: c_int,
    index: usize,
) -> *mut c_char {
    if handle.is_null() {
        return ptr::null_mut();
    }
    let Some(side) = side_from(side) else {
        return ptr::null_mut();
    };

    lock(&(*handle).inner)
        .headers(side)
        .get(index)
        .map(|h| into_c_string(h))
        .unwrap_or(ptr::null_mut())
}

/// Set match rules, transfer rules and start index from a JSON request
///
/// The JSON shape is `{"matchRules": [...], "transferRules": [...], "startIndex": 0}`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new`
/// - `json` must be a valid C string
#[no_mangle]
pub unsafe extern "C" fn recon_set_rules_json(
    handle: *const FfiReconciler,
    json: *const c_char,
) -> c_int {
    if handle.is_null() {
        return fail(RECON_ERR_ARGUMENT, "null handle");
    }
    let Some(json) = str_arg(json) else {
        return fail(RECON_ERR_ARGUMENT, "json must be a UTF-8 C string");
    };
    let request = match CompareRequest::from_json(json) {
        Ok(r) => r,
        Err(e) => return report(e),
    };
    if let Err(e) = recon_core::rules::validate_rules(&request.match_rules, &request.transfer_rules) {
        return report(e);
    }

    let handle = &*handle;
    let mut inner = lock(&handle.inner);
    inner.set_match_rules(request.match_rules);
    inner.set_transfer_rules(request.transfer_rules);
    *lock(&handle.start_index) = request.start_index;
    RECON_OK
}

/// Run a comparison with the loaded files and rules
///
/// Blocks until the run finishes or is cancelled with `recon_cancel`. A
/// cancelled run still returns `RECON_OK`; check `recon_result_cancelled`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new`
#[no_mangle]
pub unsafe extern "C" fn recon_compare(handle: *const FfiReconciler) -> c_int {
    if handle.is_null() {
        return fail(RECON_ERR_ARGUMENT, "null handle");
    }
    let handle = &*handle;

    let (plan, cancel, progress) = {
        let mut run = lock(&handle.run);
        if run.cancel.is_some() {
            return fail(RECON_ERR_STATE, "a comparison is already running");
        }
        let plan = match lock(&handle.inner).prepare() {
            Ok(plan) => plan,
            Err(e) => return report(e),
        };
        let cancel = CancellationHandle::new();
        run.cancel = Some(cancel.clone());
        run.progress = ProgressHandle::new();
        (plan, cancel, run.progress.clone())
    };

    let start_index = *lock(&handle.start_index);
    let outcome = plan.run(start_index, &cancel, &progress);
    let code = match outcome {
        Ok(result) => {
            lock(&handle.inner).store_result(result);
            RECON_OK
        }
        Err(e) => report(e),
    };
    lock(&handle.run).cancel = None;
    code
}

/// Request cancellation of the running comparison
///
/// Returns 1 if a run was active, 0 otherwise.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new`
#[no_mangle]
pub unsafe extern "C" fn recon_cancel(handle: *const FfiReconciler) -> c_int {
    if handle.is_null() {
        return 0;
    }
    match &lock(&(*handle).run).cancel {
        Some(cancel) => {
            cancel.cancel();
            1
        }
        None => 0,
    }
}

/// Read the latest progress of the active or last run
///
/// Writes the processed and total row counts when the pointers are non-null
/// and returns the phase: 0 idle, 1 indexing, 2 counting, 3 probing,
/// 4 reconciling B, 5 done, 6 cancelled.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new`
/// - `processed` and `total` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn recon_progress(
    handle: *const FfiReconciler,
    processed: *mut usize,
    total: *mut usize,
) -> c_int {
    if handle.is_null() {
        return 0;
    }
    let snap = lock(&(*handle).run).progress.snapshot();
    if !processed.is_null() {
        *processed = snap.processed;
    }
    if !total.is_null() {
        *total = snap.total;
    }
    match snap.phase {
        RunPhase::Idle => 0,
        RunPhase::Indexing => 1,
        RunPhase::Counting => 2,
        RunPhase::Probing => 3,
        RunPhase::ReconcilingUnmatchedB => 4,
        RunPhase::Done => 5,
        RunPhase::Cancelled => 6,
    }
}

/// Get one count of the last result
///
/// `which` is one of the `RECON_COUNT_*` constants. Returns 0 when there is
/// no result.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new`
#[no_mangle]
pub unsafe extern "C" fn recon_result_count(handle: *const FfiReconciler, which: c_int) -> usize {
    if handle.is_null() {
        return 0;
    }
    let Some(result) = (*handle).last_result() else {
        return 0;
    };

    match which {
        RECON_COUNT_TOTAL_A => result.total_records_a,
        RECON_COUNT_TOTAL_B => result.total_records_b,
        RECON_COUNT_MATCHES => result.match_count,
        RECON_COUNT_MODIFIED => result.modified_records.len(),
        RECON_COUNT_NOT_FOUND_IN_B => result.not_found_in_b.len(),
        RECON_COUNT_NOT_FOUND_IN_A => result.not_found_in_a.len(),
        _ => 0,
    }
}

/// Whether the last result comes from a cancelled run
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new`
#[no_mangle]
pub unsafe extern "C" fn recon_result_cancelled(handle: *const FfiReconciler) -> bool {
    if handle.is_null() {
        return false;
    }
    (*handle).last_result().is_some_and(|r| r.cancelled)
}

/// Get the summary of the last result as JSON
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new`
/// - Returns null if there is no result
/// - Caller must free the returned string with `recon_free_string`
#[no_mangle]
pub unsafe extern "C" fn recon_result_json(handle: *const FfiReconciler) -> *mut c_char {
    if handle.is_null() {
        return ptr::null_mut();
    }
    let Some(result) = (*handle).last_result() else {
        set_last_error(Error::NoResult.to_string());
        return ptr::null_mut();
    };

    match serde_json::to_string(&result.summary()) {
        Ok(json) => into_c_string(&json),
        Err(e) => {
            set_last_error(e.to_string());
            ptr::null_mut()
        }
    }
}

/// Export part of the last result to a file
///
/// `kind` is `RECON_EXPORT_RESULTS` or `RECON_EXPORT_NOT_FOUND`. The
/// headers and separator of `side` are used; for not-found exports `side`
/// also selects which unmatched rows are written.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `recon_new`
/// - `path` must be a valid C string
#[no_mangle]
pub unsafe extern "C" fn recon_export(
    handle: *const FfiReconciler,
    kind: c_int,
    side: c_int,
    path: *const c_char,
) -> c_int {
    if handle.is_null() {
        return fail(RECON_ERR_ARGUMENT, "null handle");
    }
    let kind = match kind {
        RECON_EXPORT_RESULTS => ExportKind::Results,
        RECON_EXPORT_NOT_FOUND => ExportKind::NotFound,
        other => return fail(RECON_ERR_ARGUMENT, format!("invalid export kind {}", other)),
    };
    let Some(side) = side_from(side) else {
        return fail(RECON_ERR_ARGUMENT, format!("invalid side {}", side));
    };
    let Some(path) = str_arg(path) else {
        return fail(RECON_ERR_ARGUMENT, "path must be a UTF-8 C string");
    };

    let inner = lock(&(*handle).inner);
    let outcome = match kind {
        ExportKind::Results => inner.export_results(path, side),
        ExportKind::NotFound => inner.export_not_found(path, side),
    };
    match outcome {
        Ok(()) => RECON_OK,
        Err(e) => report(e),
    }
}

/// Message of the last failed call on this thread
///
/// # Safety
/// - Returns null if no call has failed
/// - Caller must free the returned string with `recon_free_string`
#[no_mangle]
pub unsafe extern "C" fn recon_last_error() -> *mut c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|s| s.clone().into_raw())
            .unwrap_or(ptr::null_mut())
    })
}

/// Free a string returned by other FFI functions
///
/// # Safety
/// - `s` must be a valid pointer returned by a recon_* function or null
#[no_mangle]
pub unsafe extern "C" fn recon_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    unsafe fn take(s: *mut c_char) -> String {
        assert!(!s.is_null());
        let out = CStr::from_ptr(s).to_str().unwrap().to_string();
        recon_free_string(s);
        out
    }

    fn write(dir: &Path, name: &str, content: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_full_run_through_c_api() {
        let dir = tempfile::tempdir().unwrap();
        let a = c(&write(dir.path(), "a.csv", "id,name\n1,alice\n2,bob\n"));
        let b = c(&write(dir.path(), "b.csv", "id;city\n1;NYC\n3;Oslo\n"));
        let rules = c(r#"{
            "matchRules": [{"columnA": "id", "columnB": "id"}],
            "transferRules": [{"isSourceA": true, "sourceColumn": "name", "destinationColumn": "city"}]
        }"#);
        let out = dir.path().join("out.csv");
        let out_c = c(out.to_str().unwrap());

        unsafe {
            let h = recon_new();
            assert_eq!(recon_load_file(h, RECON_SIDE_A, a.as_ptr(), b',' as c_char), RECON_OK);
            assert_eq!(recon_load_file(h, RECON_SIDE_B, b.as_ptr(), b';' as c_char), RECON_OK);
            assert_eq!(recon_header_count(h, RECON_SIDE_B), 2);
            assert_eq!(take(recon_header_name(h, RECON_SIDE_B, 1)), "city");
            assert!(recon_header_name(h, RECON_SIDE_B, 2).is_null());

            assert_eq!(recon_set_rules_json(h, rules.as_ptr()), RECON_OK);
            assert_eq!(recon_compare(h), RECON_OK);

            assert_eq!(recon_result_count(h, RECON_COUNT_TOTAL_A), 2);
            assert_eq!(recon_result_count(h, RECON_COUNT_MATCHES), 1);
            assert_eq!(recon_result_count(h, RECON_COUNT_MODIFIED), 1);
            assert_eq!(recon_result_count(h, RECON_COUNT_NOT_FOUND_IN_B), 1);
            assert_eq!(recon_result_count(h, RECON_COUNT_NOT_FOUND_IN_A), 1);
            assert!(!recon_result_cancelled(h));

            let mut processed = 0usize;
            let mut total = 0usize;
            assert_eq!(recon_progress(h, &mut processed, &mut total), 5);
            assert_eq!((processed, total), (2, 2));

            let json = take(recon_result_json(h));
            assert!(json.contains("\"matchCount\":1"));

            assert_eq!(recon_export(h, RECON_EXPORT_RESULTS, RECON_SIDE_B, out_c.as_ptr()), RECON_OK);
            assert_eq!(std::fs::read_to_string(&out).unwrap(), "id;city\n1;alice\n");

            recon_free(h);
        }
    }

    #[test]
    fn test_errors_are_reported() {
        let rules = c(r#"{"matchRules": [{"columnA": "", "columnB": "id"}]}"#);
        let missing = c("/definitely/not/here.csv");

        unsafe {
            let h = recon_new();

            assert_eq!(recon_compare(h), RECON_ERR_STATE);
            assert!(take(recon_last_error()).contains("not been loaded"));

            assert_eq!(recon_set_rules_json(h, rules.as_ptr()), RECON_ERR_FORMAT);
            assert_eq!(
                recon_load_file(h, RECON_SIDE_A, missing.as_ptr(), b',' as c_char),
                RECON_ERR_IO
            );
            assert_eq!(
                recon_load_file(h, 7, missing.as_ptr(), b',' as c_char),
                RECON_ERR_ARGUMENT
            );
            assert_eq!(
                recon_load_file(h, RECON_SIDE_A, missing.as_ptr(), b'\n' as c_char),
                RECON_ERR_FORMAT
            );
            assert_eq!(recon_result_count(h, RECON_COUNT_MATCHES), 0);
            assert!(recon_result_json(h).is_null());

            recon_free(h);
        }
    }

    #[test]
    fn test_null_handles_are_tolerated() {
        unsafe {
            assert_eq!(recon_compare(ptr::null()), RECON_ERR_ARGUMENT);
            assert_eq!(recon_header_count(ptr::null(), RECON_SIDE_A), 0);
            assert_eq!(recon_cancel(ptr::null()), 0);
            recon_free(ptr::null_mut());
            recon_free_string(ptr::null_mut());
        }
    }
}
