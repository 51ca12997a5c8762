use crate::errors::LoginError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Steps of the sign-in state machine, in the order they normally run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Init,
    NavigateToTarget,
    ClickFederatedLogin,
    AwaitFederatedRedirect,
    SubmitCredentials,
    CheckSecondFactor,
    CheckAuthorizationPrompt,
    AwaitFinalRedirect,
    Evaluate,
    Aborted,
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// How a single step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum StepOutcome {
    Completed,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub outcome: StepOutcome,
}

/// Final classification of a run that reached `Evaluate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    Success {
        final_url: String,
    },
    Failure {
        reason: String,
        screenshot: Option<PathBuf>,
    },
}

/// How the run ended: through `Evaluate` with a verdict, or aborted early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Terminal {
    Completed {
        verdict: Verdict,
    },
    Aborted {
        error: LoginError,
        screenshot: Option<PathBuf>,
    },
}

impl Terminal {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Terminal::Completed {
                verdict: Verdict::Success { .. }
            }
        )
    }

    /// Process status: 0 for success and for the missing-credentials skip.
    pub fn exit_code(&self) -> i32 {
        match self {
            Terminal::Completed {
                verdict: Verdict::Success { .. },
            } => 0,
            Terminal::Completed {
                verdict: Verdict::Failure { .. },
            } => 1,
            Terminal::Aborted { error, .. } => error.exit_code(),
        }
    }

    /// Markdown message for the operator channel.
    pub fn notification(&self) -> String {
        match self {
            Terminal::Completed {
                verdict: Verdict::Success { final_url },
            } => format!("🎉 *Console sign-in succeeded*\n`{final_url}`"),
            Terminal::Completed {
                verdict: Verdict::Failure { reason, .. },
            } => format!("❌ *Console sign-in failed*: {reason}. Check the screenshot"),
            Terminal::Aborted {
                error: LoginError::SecondFactorRequired,
                ..
            } => "🚨 *Console sign-in failed*: second factor required but no seed is configured"
                .to_string(),
            Terminal::Aborted {
                error: LoginError::Configuration(detail),
                ..
            } => format!("❌ Sign-in skipped: {detail}"),
            Terminal::Aborted { error, .. } => format!("🚨 *Console sign-in aborted*: {error}"),
        }
    }

    /// One-line summary for the console.
    pub fn summary(&self) -> String {
        match self {
            Terminal::Completed {
                verdict: Verdict::Success { final_url },
            } => format!("sign-in succeeded ({final_url})"),
            Terminal::Completed {
                verdict: Verdict::Failure { reason, .. },
            } => format!("sign-in failed: {reason}"),
            Terminal::Aborted { error, .. } => format!("sign-in aborted: {error}"),
        }
    }
}

/// Everything a run produced: the terminal outcome and the step trail.
#[derive(Debug, Clone, Serialize)]
pub struct LoginReport {
    pub terminal: Terminal,
    pub steps: Vec<StepRecord>,
}

impl LoginReport {
    pub fn visited(&self, step: Step) -> bool {
        self.steps.iter().any(|r| r.step == step)
    }

    pub fn outcome_of(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| r.step == step).map(|r| &r.outcome)
    }

    pub fn exit_code(&self) -> i32 {
        self.terminal.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let success = Terminal::Completed {
            verdict: Verdict::Success {
                final_url: "https://console.example/apps".into(),
            },
        };
        assert_eq!(success.exit_code(), 0);

        let failure = Terminal::Completed {
            verdict: Verdict::Failure {
                reason: "still on provider".into(),
                screenshot: None,
            },
        };
        assert_eq!(failure.exit_code(), 1);

        let skipped = Terminal::Aborted {
            error: LoginError::Configuration("username must be set".into()),
            screenshot: None,
        };
        assert_eq!(skipped.exit_code(), 0);

        let second_factor = Terminal::Aborted {
            error: LoginError::SecondFactorRequired,
            screenshot: Some(PathBuf::from("login_result.png")),
        };
        assert_eq!(second_factor.exit_code(), 1);
        assert!(second_factor.notification().contains("second factor required"));
    }

    #[test]
    fn test_report_serializes_with_tags() {
        let report = LoginReport {
            terminal: Terminal::Aborted {
                error: LoginError::SecondFactorRequired,
                screenshot: None,
            },
            steps: vec![StepRecord {
                step: Step::CheckSecondFactor,
                outcome: StepOutcome::Failed("second factor required".into()),
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["terminal"]["state"], "aborted");
        assert_eq!(json["terminal"]["error"]["kind"], "second_factor_required");
        assert_eq!(json["steps"][0]["step"], "check_second_factor");
        assert_eq!(json["steps"][0]["outcome"]["status"], "failed");
    }
}
