use serde::Serialize;
use thiserror::Error;

/// Failures raised by a browser session or a locator.
#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Browser protocol error: {0}")]
    Browser(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

impl AutomationError {
    /// Element-not-found and timeouts are the "absent is not fatal" class:
    /// the step is skipped instead of reported as a failure.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            AutomationError::ElementNotFound(_) | AutomationError::Timeout(_)
        )
    }
}

impl From<chromiumoxide::error::CdpError> for AutomationError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        AutomationError::Browser(e.to_string())
    }
}

/// Run-level error taxonomy. Only the fatal variants ever leave a step.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LoginError {
    #[error("missing credentials: {0}")]
    Configuration(String),

    #[error("interaction timed out: {0}")]
    InteractionTimeout(String),

    #[error("second factor required, no seed configured")]
    SecondFactorRequired,

    #[error("second factor seed is invalid: {0}")]
    InvalidSecondFactorSeed(String),

    #[error("browser session unavailable: {0}")]
    Session(String),

    #[error("sign-in did not complete: {0}")]
    VerdictFailure(String),
}

impl LoginError {
    /// Missing credentials is a soft no-op for the process; everything else
    /// that aborts a run is reported with a non-zero status.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoginError::Configuration(_) => 0,
            _ => 1,
        }
    }
}

/// Errors from decoding a second-factor seed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TotpError {
    #[error("seed is empty")]
    EmptySeed,

    #[error("seed is not valid base32: {0}")]
    InvalidBase32(String),
}

impl From<TotpError> for LoginError {
    fn from(e: TotpError) -> Self {
        LoginError::InvalidSecondFactorSeed(e.to_string())
    }
}
