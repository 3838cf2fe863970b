//! C FFI bindings for ioblackbox.
//!
//! Every function takes and returns JSON strings so the surface stays usable
//! from C, Python, Go, etc. without shared struct layouts.
//!
//! # Example (C)
//!
//! ```c
//! #include "ioblackbox.h"
//!
//! int main() {
//!     char* parsed = snare_parse_script_json(script_source);
//!     // {"success": true, "config": {...}}
//!     char* result = snare_generate_json(config_json, params_json);
//!     if (result) {
//!         printf("Result: %s\n", result);
//!         snare_free_string(result);
//!     }
//!     snare_free_string(parsed);
//!     return 0;
//! }
//! ```

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use chrono::Utc;

use crate::{parse_snare_js, BlackboxGenerator, BlackboxParams, SnareConfig};

/// Convert Rust String to C string pointer.
fn string_to_ptr(s: String) -> *mut c_char {
    CString::new(s)
        .map(|cs| cs.into_raw())
        .unwrap_or(ptr::null_mut())
}

/// Convert C string to Rust String, returns None if null or invalid UTF-8.
unsafe fn ptr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn error_json(message: impl std::fmt::Display) -> *mut c_char {
    string_to_ptr(
        serde_json::json!({
            "success": false,
            "error": message.to_string()
        })
        .to_string(),
    )
}

/// Generate a blackbox (JSON in, JSON out).
///
/// # Parameters
///
/// - `config_json`: a serialized `SnareConfig` (as returned in the `config`
///   member of `snare_parse_script_json`)
/// - `params_json`: a serialized `BlackboxParams`, e.g.
///   `{"user_agent": "...", "page_url": "...", "integration_type": "form"}`
///
/// # Returns
///
/// ```json
/// {"success": true, "blackbox": "0400..."}
/// ```
///
/// Or on error:
/// ```json
/// {"success": false, "error": "error message"}
/// ```
///
/// The caller must free the string with `snare_free_string`.
///
/// # Safety
///
/// - `config_json` must be a valid null-terminated C string
/// - `params_json` must be a valid null-terminated C string
#[no_mangle]
pub unsafe extern "C" fn snare_generate_json(
    config_json: *const c_char,
    params_json: *const c_char,
) -> *mut c_char {
    let config_json = match ptr_to_string(config_json) {
        Some(s) => s,
        None => return error_json("config_json is required"),
    };
    let params_json = match ptr_to_string(params_json) {
        Some(s) => s,
        None => return error_json("params_json is required"),
    };

    let config: SnareConfig = match serde_json::from_str(&config_json) {
        Ok(config) => config,
        Err(e) => return error_json(format!("Invalid config: {}", e)),
    };
    let params: BlackboxParams = match serde_json::from_str(&params_json) {
        Ok(params) => params,
        Err(e) => return error_json(format!("Invalid params: {}", e)),
    };

    let mut generator = match BlackboxGenerator::new(config) {
        Ok(generator) => generator,
        Err(e) => return error_json(e),
    };

    match generator.try_generate_at(&params, Utc::now()) {
        Ok(blackbox) => string_to_ptr(
            serde_json::json!({
                "success": true,
                "blackbox": blackbox
            })
            .to_string(),
        ),
        Err(e) => error_json(e),
    }
}

/// Extract the config from snare.js source text (JSON out).
///
/// # Returns
///
/// ```json
/// {"success": true, "config": {"subscriber_id": "...", "des_key": "7c4c...", ...}}
/// ```
///
/// The caller must free the string with `snare_free_string`.
///
/// # Safety
///
/// - `script` must be a valid null-terminated C string
#[no_mangle]
pub unsafe extern "C" fn snare_parse_script_json(script: *const c_char) -> *mut c_char {
    let script = match ptr_to_string(script) {
        Some(s) => s,
        None => return error_json("script is required"),
    };

    match parse_snare_js(&script) {
        Ok(config) => string_to_ptr(
            serde_json::json!({
                "success": true,
                "config": config
            })
            .to_string(),
        ),
        Err(e) => error_json(e),
    }
}

/// Free a string returned by ioblackbox FFI functions.
///
/// # Safety
///
/// - `s` must be NULL or a valid pointer previously returned by ioblackbox
/// - Each string must only be freed once
#[no_mangle]
pub unsafe extern "C" fn snare_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Get the library version.
///
/// # Returns
///
/// A static string with the version number. Do NOT free this string.
#[no_mangle]
pub extern "C" fn snare_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn take_json(ptr: *mut c_char) -> serde_json::Value {
        assert!(!ptr.is_null());
        let text = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        snare_free_string(ptr);
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_generate_json() {
        let config = CString::new(serde_json::to_string(&SnareConfig::sample()).unwrap()).unwrap();
        let params = CString::new(
            r#"{"user_agent":"Mozilla/5.0 (X11; Linux x86_64)","page_url":"https://example.com/checkout","integration_type":"function"}"#,
        )
        .unwrap();

        let result = unsafe { take_json(snare_generate_json(config.as_ptr(), params.as_ptr())) };
        assert_eq!(result["success"], true);

        let blackbox = result["blackbox"].as_str().unwrap();
        let fields = crate::decode_blackbox(&SnareConfig::sample().des_key, blackbox).unwrap();
        assert!(fields.iter().any(|f| f.key == "JINT" && f.value == "function"));
    }

    #[test]
    fn test_generate_json_errors() {
        let params = CString::new("{}").unwrap();
        let result = unsafe { take_json(snare_generate_json(ptr::null(), params.as_ptr())) };
        assert_eq!(result["success"], false);

        let config = CString::new(serde_json::to_string(&SnareConfig::sample()).unwrap()).unwrap();
        let result = unsafe { take_json(snare_generate_json(config.as_ptr(), params.as_ptr())) };
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().starts_with("Invalid params"));
    }

    #[test]
    fn test_parse_script_json_error() {
        let script = CString::new("var x = 1;").unwrap();
        let result = unsafe { take_json(snare_parse_script_json(script.as_ptr())) };

        assert_eq!(result["success"], false);
        assert_eq!(result["error"], "Failed to extract IGGY from snare.js");
    }

    #[test]
    fn test_header_config_shipped() {
        let config = include_str!("../cbindgen.toml");
        assert!(config.contains(r#"include_guard = "IOBLACKBOX_H""#));
        assert!(config.contains(r#"features = ["ffi"]"#));
    }

    #[test]
    fn test_version() {
        let version = unsafe { CStr::from_ptr(snare_version()) };
        assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }
}
