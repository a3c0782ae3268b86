//! Fuzz target: `OtaRequest::parse`
//!
//! Arbitrary update-command text must parse into a well-formed request or
//! a typed error, never a panic.
//!
//! cargo fuzz run fuzz_ota_request

#![no_main]

use libfuzzer_sys::fuzz_target;
use vitalnode::ota::OtaRequest;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    if let Ok(req) = OtaRequest::parse(&text) {
        assert!(!req.version.is_empty());
        assert!(req.version.len() <= 32);
        assert!(!req.version.chars().any(char::is_whitespace));
        // Idempotent on the bare-version form.
        if req.url.is_none() && !text.trim_start().starts_with('{') {
            assert_eq!(OtaRequest::parse(&req.version), Ok(req));
        }
    }
});
