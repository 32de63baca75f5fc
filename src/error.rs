//! Closed error taxonomy (spec §7) and its propagation policy.
//!
//! `CoreError` is the only error type that crosses a component boundary
//! inside C1-C7. Connector-facing code is free to use `anyhow::Result`
//! internally (timeouts, malformed payloads, IO) but must collapse those
//! into one of these variants - or swallow them - before they reach the
//! belief/decision/state-machine layer.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("connector unavailable: {0}")]
    ConnectorUnavailable(String),

    #[error("connector timeout: {0}")]
    ConnectorTimeout(String),

    #[error("parse rejected: {0}")]
    ParseRejected(String),

    #[error("signal ineligible: {0}")]
    SignalIneligible(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("duplicate position for market {0}")]
    DuplicatePosition(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("calibration failure: {0}")]
    CalibrationFailure(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),
}

impl CoreError {
    /// How this error is handled per §7. Returned as data rather than left
    /// implicit in scattered match arms, so the propagation policy is
    /// checkable in one place.
    pub fn policy(&self) -> ErrorPolicy {
        match self {
            CoreError::ConnectorUnavailable(_)
            | CoreError::ConnectorTimeout(_)
            | CoreError::ParseRejected(_) => ErrorPolicy::RecoveredLocally,
            CoreError::SignalIneligible(_) => ErrorPolicy::ReturnToObserve,
            CoreError::DuplicatePosition(_) | CoreError::OrderRejected(_) => {
                ErrorPolicy::ReturnNoTrade
            }
            CoreError::PersistenceFailure(_) => ErrorPolicy::RetryThenHalt,
            CoreError::InvariantViolation(_)
            | CoreError::IllegalTransition(_)
            | CoreError::CalibrationFailure(_)
            | CoreError::ConfigInvalid(_) => ErrorPolicy::ImmediateHalt,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CoreError::ConfigInvalid(_) => "ConfigInvalid",
            CoreError::ConnectorUnavailable(_) => "ConnectorUnavailable",
            CoreError::ConnectorTimeout(_) => "ConnectorTimeout",
            CoreError::ParseRejected(_) => "ParseRejected",
            CoreError::SignalIneligible(_) => "SignalIneligible",
            CoreError::InvariantViolation(_) => "InvariantViolation",
            CoreError::DuplicatePosition(_) => "DuplicatePosition",
            CoreError::OrderRejected(_) => "OrderRejected",
            CoreError::PersistenceFailure(_) => "PersistenceFailure",
            CoreError::CalibrationFailure(_) => "CalibrationFailure",
            CoreError::IllegalTransition(_) => "IllegalTransition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    RecoveredLocally,
    ReturnToObserve,
    ReturnNoTrade,
    RetryThenHalt,
    ImmediateHalt,
}

pub type CoreResult<T> = Result<T, CoreError>;
