use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::mining::RoundState;
use crate::transaction::{OutPoint, UtxoStatus};

/// Coarse error classes exposed to API clients next to the stable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed request, rejected before touching shared state.
    Validation,
    /// Recoverable by retrying or resetting.
    StateConflict,
    NotFound,
    /// A ledger invariant failed on data we built ourselves.
    Fatal,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("wallet name '{0}' is already taken")]
    DuplicateName(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("insufficient funds: available {available} units, required {required} units")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("utxo {outpoint} is {status}, not available")]
    UtxoUnavailable {
        outpoint: OutPoint,
        status: UtxoStatus,
    },

    #[error("utxo {0} is already locked by a pending transaction")]
    AlreadyLocked(OutPoint),

    #[error("utxo {outpoint} cannot move from {from} to {to}")]
    InvalidTransition {
        outpoint: OutPoint,
        from: UtxoStatus,
        to: UtxoStatus,
    },

    #[error("utxo {0} already exists")]
    DuplicateOutput(OutPoint),

    #[error("transaction {0} is already pending")]
    DuplicateTransaction(String),

    #[error("invalid signature on input {0}")]
    InvalidSignature(usize),

    #[error("outputs ({outputs} units) exceed inputs ({inputs} units)")]
    OutputsExceedInputs { inputs: u64, outputs: u64 },

    #[error("transaction only pays its own inputs' owner")]
    SelfTransfer,

    #[error("cannot {action} while the mining round is {state}")]
    InvalidRoundState {
        state: RoundState,
        action: &'static str,
    },

    #[error("the mining round has no winner yet")]
    NoWinnerYet,

    #[error("no wallets are registered to take part in a mining round")]
    NoParticipants,

    #[error("{0} not found")]
    NotFound(String),

    #[error("ledger consistency violation: {0}")]
    ConsistencyViolation(String),
}

impl ChainError {
    /// Stable identifier clients can match on.
    pub fn code(&self) -> &'static str {
        match self {
            ChainError::Validation(_) => "ValidationError",
            ChainError::DuplicateName(_) => "DuplicateName",
            ChainError::InvalidKey(_) => "InvalidKey",
            ChainError::InvalidRecipient(_) => "InvalidRecipient",
            ChainError::InsufficientFunds { .. } => "InsufficientFunds",
            ChainError::UtxoUnavailable { .. } => "UTXOUnavailable",
            ChainError::AlreadyLocked(_) => "AlreadyLocked",
            ChainError::InvalidTransition { .. } => "InvalidTransition",
            ChainError::DuplicateOutput(_) => "DuplicateOutput",
            ChainError::DuplicateTransaction(_) => "DuplicateTransaction",
            ChainError::InvalidSignature(_) => "InvalidSignature",
            ChainError::OutputsExceedInputs { .. } => "OutputsExceedInputs",
            ChainError::SelfTransfer => "SelfTransfer",
            ChainError::InvalidRoundState { .. } => "InvalidRoundState",
            ChainError::NoWinnerYet => "NoWinnerYet",
            ChainError::NoParticipants => "NoParticipants",
            ChainError::NotFound(_) => "NotFound",
            ChainError::ConsistencyViolation(_) => "ConsistencyViolation",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ChainError::Validation(_)
            | ChainError::InvalidKey(_)
            | ChainError::InvalidRecipient(_)
            | ChainError::InsufficientFunds { .. }
            | ChainError::InvalidSignature(_)
            | ChainError::OutputsExceedInputs { .. }
            | ChainError::SelfTransfer => ErrorCategory::Validation,
            ChainError::DuplicateName(_)
            | ChainError::UtxoUnavailable { .. }
            | ChainError::AlreadyLocked(_)
            | ChainError::InvalidTransition { .. }
            | ChainError::DuplicateOutput(_)
            | ChainError::DuplicateTransaction(_)
            | ChainError::InvalidRoundState { .. }
            | ChainError::NoWinnerYet
            | ChainError::NoParticipants => ErrorCategory::StateConflict,
            ChainError::NotFound(_) => ErrorCategory::NotFound,
            ChainError::ConsistencyViolation(_) => ErrorCategory::Fatal,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: &'static str,
    category: ErrorCategory,
}

impl ResponseError for ChainError {
    fn status_code(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::StateConflict => StatusCode::CONFLICT,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            success: false,
            error: self.to_string(),
            code: self.code(),
            category: self.category(),
        })
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_http_statuses() {
        assert_eq!(
            ChainError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ChainError::DuplicateName("alice".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ChainError::NotFound("block 9".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ChainError::ConsistencyViolation("tip".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn round_state_errors_carry_stable_code() {
        let err = ChainError::InvalidRoundState {
            state: RoundState::Computing,
            action: "start a round",
        };
        assert_eq!(err.code(), "InvalidRoundState");
        assert_eq!(err.category(), ErrorCategory::StateConflict);
        assert!(err.to_string().contains("computing"));
    }
}
