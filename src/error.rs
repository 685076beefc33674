use thiserror::Error;

/// Which signature of a transaction failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigKind {
    Input,
    Confirmation,
}

impl std::fmt::Display for SigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SigKind::Input => write!(f, "input"),
            SigKind::Confirmation => write!(f, "confirmation"),
        }
    }
}

/// Error kinds surfaced by the ledger core. Admission failures travel back
/// to the submitting caller verbatim; storage failures abort the operation
/// that hit them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("input {which} not found")]
    InputNotFound { which: u8 },

    #[error("invalid {kind} signature for input {which}")]
    InvalidSignature { kind: SigKind, which: u8 },

    #[error("inputs and outputs do not have the same sum")]
    SumMismatch,

    #[error("transaction double-spends a known outpoint")]
    DoubleSpend,

    #[error("mempool is full")]
    MempoolFull,

    #[error("no {entity} found")]
    NotFound { entity: &'static str },

    #[error("failed to decode {entity}: {reason}")]
    Decode { entity: &'static str, reason: String },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        LedgerError::Storage(err.to_string())
    }
}
