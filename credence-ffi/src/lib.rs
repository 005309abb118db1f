//! C ABI bindings for Credence.
//!
//! Every function returning a string hands back a NUL-terminated UTF-8
//! buffer owned by this library. Callers must pass it to
//! [`credence_release_string`] exactly once; releasing a pointer twice, or a
//! pointer this library never returned, is detected and rejected.
//!
//! Fallible calls return a JSON envelope: `{"ok": ...}` on success and
//! `{"error": {"code": ..., "message": ...}}` on failure. Panics are caught
//! and reported as a `PANIC` error envelope.

use std::collections::HashSet;
use std::ffi::{c_char, c_int, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use credence_core::api::{self, AddManifestOptions, ErrorEnvelope, Response};
use credence_core::{CredenceError, Result, Settings};
use tracing::warn;

/// Addresses of strings handed out and not yet released.
fn live_strings() -> &'static Mutex<HashSet<usize>> {
    static LIVE: OnceLock<Mutex<HashSet<usize>>> = OnceLock::new();
    LIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

fn to_c_string(text: String) -> *mut c_char {
    let c_string = CString::new(text).unwrap_or_else(|e| {
        // Interior NUL: drop everything from the first one.
        let nul = e.nul_position();
        let mut bytes = e.into_vec();
        bytes.truncate(nul);
        CString::new(bytes).unwrap_or_default()
    });
    let ptr = c_string.into_raw();
    live_strings()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(ptr as usize);
    ptr
}

/// Borrow a caller string argument.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
unsafe fn arg<'a>(ptr: *const c_char, name: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(CredenceError::InvalidDefinition(format!("{name} is null")));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| CredenceError::InvalidDefinition(format!("{name} is not valid UTF-8")))
}

/// Run `f`, converting its result (or a panic) into an envelope string.
fn envelope<F>(f: F) -> *mut c_char
where
    F: FnOnce() -> Result<serde_json::Value>,
{
    let response = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => Response::from_result(result),
        Err(_) => Response::Error(ErrorEnvelope::new("PANIC", "internal panic")),
    };
    to_c_string(response.to_json())
}

/// Library name and version, e.g. `credence-core/0.1.0`.
#[no_mangle]
pub extern "C" fn credence_version() -> *mut c_char {
    to_c_string(api::version())
}

/// JSON array of MIME types that can carry an embedded store.
#[no_mangle]
pub extern "C" fn credence_supported_formats() -> *mut c_char {
    to_c_string(serde_json::json!(api::supported_formats()).to_string())
}

/// 1 if the file carries a manifest store, 0 if not, -1 on a bad argument.
///
/// # Safety
///
/// `path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn credence_has_manifest(path: *const c_char) -> c_int {
    let Ok(path) = arg(path, "path") else {
        return -1;
    };
    catch_unwind(|| c_int::from(api::has_manifest(path))).unwrap_or(-1)
}

/// Verify the file at `path`. Trust settings come from the environment.
///
/// # Safety
///
/// `path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn credence_verify_from_file(path: *const c_char) -> *mut c_char {
    envelope(|| {
        let path = arg(path, "path")?;
        api::verify_from_path(path, &Settings::from_env(), Utc::now())
    })
}

/// Describe the file at `path` as an ingredient. Store bytes and the
/// thumbnail, if any, are written into `data_dir`.
///
/// # Safety
///
/// Both arguments must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn credence_ingredient_from_file(
    path: *const c_char,
    data_dir: *const c_char,
) -> *mut c_char {
    envelope(|| {
        let path = arg(path, "path")?;
        let data_dir = arg(data_dir, "data_dir")?;
        let info = api::ingredient_from_path(path, data_dir)?;
        Ok(serde_json::to_value(info)?)
    })
}

/// Sign `source` with a manifest and write the result to `dest`.
///
/// `options_json` may be null; it accepts `{"sidecar": true}`.
///
/// # Safety
///
/// Every argument must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn credence_add_manifest_to_file(
    source: *const c_char,
    dest: *const c_char,
    manifest_json: *const c_char,
    signer_info_json: *const c_char,
    options_json: *const c_char,
) -> *mut c_char {
    envelope(|| {
        let source = arg(source, "source")?;
        let dest = arg(dest, "dest")?;
        let manifest_json = arg(manifest_json, "manifest_json")?;
        let signer_info_json = arg(signer_info_json, "signer_info_json")?;
        let options: AddManifestOptions = if options_json.is_null() {
            AddManifestOptions::default()
        } else {
            serde_json::from_str(arg(options_json, "options_json")?)?
        };

        let outcome = api::add_manifest(
            source,
            dest,
            manifest_json,
            signer_info_json,
            &options,
            &Settings::from_env(),
        )?;
        Ok(serde_json::to_value(outcome)?)
    })
}

/// Release a string returned by this library.
///
/// Returns 0 on success and -1 if `ptr` is null, was already released, or
/// was not returned by this library (in which case nothing is freed).
///
/// # Safety
///
/// `ptr` must not be used after a successful release.
#[no_mangle]
pub unsafe extern "C" fn credence_release_string(ptr: *mut c_char) -> c_int {
    if ptr.is_null() {
        return -1;
    }
    let known = live_strings()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .remove(&(ptr as usize));
    if !known {
        warn!(ptr = ?ptr, "Rejected release of unknown or already released string");
        return -1;
    }
    drop(CString::from_raw(ptr));
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(ptr: *mut c_char) -> serde_json::Value {
        let text = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        assert_eq!(unsafe { credence_release_string(ptr) }, 0);
        serde_json::from_str(&text).unwrap()
    }

    fn c(text: &str) -> CString {
        CString::new(text).unwrap()
    }

    fn jpeg() -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        out.extend_from_slice(b"JFIF\0\x01\x01\x00\x00\x01\x00\x01\x00\x00");
        out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
        out.extend_from_slice(&[0x12, 0x34, 0xFF, 0xD9]);
        out
    }

    #[test]
    fn test_version_and_release() {
        let ptr = credence_version();
        let version = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        assert!(version.starts_with("credence-core/"));
        assert_eq!(unsafe { credence_release_string(ptr) }, 0);
    }

    #[test]
    fn test_double_release_is_rejected() {
        let ptr = credence_supported_formats();
        assert_eq!(unsafe { credence_release_string(ptr) }, 0);
        assert_eq!(unsafe { credence_release_string(ptr) }, -1);
        assert_eq!(unsafe { credence_release_string(std::ptr::null_mut()) }, -1);
    }

    #[test]
    fn test_foreign_pointer_is_rejected() {
        let mut own = *b"not ours\0";
        assert_eq!(
            unsafe { credence_release_string(own.as_mut_ptr().cast()) },
            -1
        );
    }

    #[test]
    fn test_supported_formats() {
        let formats = take(credence_supported_formats());
        assert_eq!(formats, serde_json::json!(["image/jpeg", "image/png"]));
    }

    #[test]
    fn test_null_argument_is_error_envelope() {
        let response = take(unsafe { credence_verify_from_file(std::ptr::null()) });
        assert_eq!(response["error"]["code"], "INVALID_INPUT");
        assert_eq!(unsafe { credence_has_manifest(std::ptr::null()) }, -1);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let path = c("/nonexistent/credence/photo.jpg");
        let response = take(unsafe { credence_verify_from_file(path.as_ptr()) });
        assert_eq!(response["error"]["code"], "NOT_FOUND");
    }

    #[test]
    fn test_unsigned_file_reports_no_manifest() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("photo.jpg");
        std::fs::write(&file, jpeg()).unwrap();
        let path = c(file.to_str().unwrap());

        let response = take(unsafe { credence_verify_from_file(path.as_ptr()) });
        assert_eq!(response["ok"]["validation_state"], "NoManifest");
        assert_eq!(unsafe { credence_has_manifest(path.as_ptr()) }, 0);
    }

    #[test]
    fn test_ingredient_from_unsigned_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("photo.jpg");
        std::fs::write(&file, jpeg()).unwrap();
        let path = c(file.to_str().unwrap());
        let data_dir = c(dir.path().join("data").to_str().unwrap());

        let response =
            take(unsafe { credence_ingredient_from_file(path.as_ptr(), data_dir.as_ptr()) });
        assert_eq!(response["ok"]["title"], "photo.jpg");
        assert_eq!(response["ok"]["format"], "image/jpeg");
        assert!(response["ok"].get("active_manifest").is_none());

        let response =
            take(unsafe { credence_ingredient_from_file(path.as_ptr(), std::ptr::null()) });
        assert_eq!(response["error"]["code"], "INVALID_INPUT");
    }

    #[test]
    fn test_add_manifest_bad_definition() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("photo.jpg");
        std::fs::write(&file, jpeg()).unwrap();
        let path = c(file.to_str().unwrap());
        let manifest = c(r#"{"title": "missing generator"}"#);
        let signer = c("{}");

        let response = take(unsafe {
            credence_add_manifest_to_file(
                path.as_ptr(),
                path.as_ptr(),
                manifest.as_ptr(),
                signer.as_ptr(),
                std::ptr::null(),
            )
        });
        assert_eq!(response["error"]["code"], "INVALID_INPUT");
        assert_eq!(std::fs::read(&file).unwrap(), jpeg());
    }
}
