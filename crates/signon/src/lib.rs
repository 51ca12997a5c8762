//! Headless federated sign-in
//!
//! Drives a browser through a console's "sign in with <provider>" flow,
//! including an optional TOTP second factor and the provider's consent page,
//! then classifies the final page and reports the outcome to an operator
//! channel.
//!
//! The flow itself lives in [`LoginFlow`]; the browser is reached through the
//! [`BrowserSession`] trait so the state machine can be driven by any
//! implementation (Chrome over CDP in production, scripted pages in tests).

pub mod config;
pub mod errors;
pub mod locator;
pub mod notifier;
pub mod orchestrator;
pub mod outcome;
pub mod selector;
pub mod session;
pub mod totp;
pub mod verdict;
pub mod wait;

pub use config::{CredentialInput, Credentials, FlowConfig, FlowTimeouts};
pub use errors::{AutomationError, LoginError, TotpError};
pub use locator::Locator;
pub use notifier::{Notifier, TelegramNotifier};
pub use orchestrator::LoginFlow;
pub use outcome::{LoginReport, Step, StepOutcome, StepRecord, Terminal, Verdict};
pub use selector::Selector;
pub use session::{BrowserSession, ChromeLauncher, SessionLauncher};
pub use verdict::{PageSignals, Rule, VerdictRules};
