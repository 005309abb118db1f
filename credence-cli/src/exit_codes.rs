//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and CI systems to handle errors appropriately.

use credence_core::{CredenceError, TrustStatus};

/// Successful execution.
pub const SUCCESS: u8 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: u8 = 1;

/// Data format error (verification failed, tampered content, no manifest).
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: u8 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: u8 = 66;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: u8 = 74;

/// Signature valid but the chain is not trusted, or provenance incomplete.
/// Maps to EX_NOPERM from sysexits.h.
pub const UNTRUSTED: u8 = 77;

/// Configuration or signing credential error.
/// Maps to EX_CONFIG from sysexits.h.
pub const CONFIG_ERROR: u8 = 78;

/// Process exit code for a command outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode {
    pub code: u8,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self { code: SUCCESS }
    }

    pub const fn new(code: u8) -> Self {
        Self { code }
    }

    /// Exit code for a verification outcome.
    pub fn from_status(status: TrustStatus) -> Self {
        match status {
            TrustStatus::Trusted => Self::success(),
            TrustStatus::ValidButUntrusted | TrustStatus::MissingIngredient => Self::new(UNTRUSTED),
            TrustStatus::InvalidSignature | TrustStatus::HashMismatch => {
                Self::new(VERIFICATION_FAILED)
            }
        }
    }

    /// Classify an error by the library error code in its chain.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let Some(err) = err.chain().find_map(|e| e.downcast_ref::<CredenceError>()) else {
            return Self::new(GENERAL_ERROR);
        };

        let code = match err.code() {
            "NOT_FOUND" | "PERMISSION_DENIED" => INPUT_ERROR,
            "IO_ERROR" | "WRITE_FAILURE" | "NO_SPACE" => IO_ERROR,
            "CONFIG_ERROR" | "SIGNING_KEY_REJECTED" | "CRYPTO_ERROR" => CONFIG_ERROR,
            "NO_MANIFEST" | "MALFORMED_MANIFEST" | "DANGLING_ACTIVE_POINTER"
            | "DUPLICATE_MANIFEST" | "CYCLIC_PROVENANCE" | "CORRUPT_SEGMENT"
            | "UNSUPPORTED_FORMAT" | "INVALID_INPUT" | "CONFLICTING_MANIFEST" => {
                VERIFICATION_FAILED
            }
            _ => GENERAL_ERROR,
        };
        Self::new(code)
    }
}
