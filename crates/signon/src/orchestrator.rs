//! The sign-in state machine.
//!
//! One [`LoginFlow`] drives one attempt: every step is bounded, per-step
//! browser failures are classified into a [`StepOutcome`] at the step
//! boundary, and the run always ends in `Done` with the session closed.

use crate::config::{CredentialInput, Credentials, FlowConfig};
use crate::errors::{AutomationError, LoginError};
use crate::locator::{wait_for_url, Locator};
use crate::notifier::Notifier;
use crate::outcome::{LoginReport, Step, StepOutcome, StepRecord, Terminal, Verdict};
use crate::session::{BrowserSession, SessionLauncher};
use crate::totp;
use crate::verdict::{PageSignals, Rule, VerdictRules};
use crate::wait::poll_until;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, instrument, warn};

const START_MESSAGE: &str = "🚀 *Console sign-in started*";

enum State {
    Init,
    NavigateToTarget,
    ClickFederatedLogin,
    AwaitFederatedRedirect,
    SubmitCredentials,
    CheckSecondFactor,
    CheckAuthorizationPrompt,
    AwaitFinalRedirect,
    Evaluate,
    Aborted(LoginError),
    Done(Terminal),
}

impl State {
    fn step(&self) -> Step {
        match self {
            State::Init => Step::Init,
            State::NavigateToTarget => Step::NavigateToTarget,
            State::ClickFederatedLogin => Step::ClickFederatedLogin,
            State::AwaitFederatedRedirect => Step::AwaitFederatedRedirect,
            State::SubmitCredentials => Step::SubmitCredentials,
            State::CheckSecondFactor => Step::CheckSecondFactor,
            State::CheckAuthorizationPrompt => Step::CheckAuthorizationPrompt,
            State::AwaitFinalRedirect => Step::AwaitFinalRedirect,
            State::Evaluate => Step::Evaluate,
            State::Aborted(_) => Step::Aborted,
            State::Done(_) => Step::Done,
        }
    }
}

/// Classify a browser error at a step boundary.
fn contained(err: AutomationError, what: &str) -> StepOutcome {
    if err.is_absence() {
        let reason = LoginError::InteractionTimeout(format!("{what}: {err}"));
        StepOutcome::Skipped(reason.to_string())
    } else {
        StepOutcome::Failed(format!("{what}: {err}"))
    }
}

/// Drives a single sign-in attempt.
pub struct LoginFlow {
    config: FlowConfig,
    rules: VerdictRules,
    launcher: Arc<dyn SessionLauncher>,
    notifier: Arc<dyn Notifier>,
    session: Option<Box<dyn BrowserSession>>,
    credentials: Option<Credentials>,
    steps: Vec<StepRecord>,
}

impl LoginFlow {
    pub fn new(
        config: FlowConfig,
        launcher: Arc<dyn SessionLauncher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let rules = VerdictRules::from_config(&config);
        Self {
            config,
            rules,
            launcher,
            notifier,
            session: None,
            credentials: None,
            steps: Vec::new(),
        }
    }

    /// Run the flow to completion. Never fails: every path ends in a report.
    #[instrument(skip_all, fields(target_url = %self.config.target_url))]
    pub async fn run(mut self, input: CredentialInput) -> LoginReport {
        let mut input = Some(input);
        let mut state = State::Init;
        loop {
            let step = state.step();
            let (outcome, next) = match state {
                State::Init => self.init(input.take().unwrap_or_default()).await,
                State::NavigateToTarget => self.navigate_to_target().await,
                State::ClickFederatedLogin => self.click_federated_login().await,
                State::AwaitFederatedRedirect => self.await_federated_redirect().await,
                State::SubmitCredentials => self.submit_credentials().await,
                State::CheckSecondFactor => self.check_second_factor().await,
                State::CheckAuthorizationPrompt => self.check_authorization_prompt().await,
                State::AwaitFinalRedirect => self.await_final_redirect().await,
                State::Evaluate => self.evaluate().await,
                State::Aborted(error) => self.aborted(error).await,
                State::Done(terminal) => return self.done(terminal).await,
            };
            match &outcome {
                StepOutcome::Completed => info!(%step, "step completed"),
                StepOutcome::Skipped(reason) => info!(%step, %reason, "step skipped"),
                StepOutcome::Failed(reason) => warn!(%step, %reason, "step failed"),
            }
            self.steps.push(StepRecord { step, outcome });
            state = next;
        }
    }

    fn session(&self) -> Result<&dyn BrowserSession, AutomationError> {
        self.session
            .as_deref()
            .ok_or_else(|| AutomationError::Browser("no browser session".to_string()))
    }

    fn locator(&self, selector: &crate::Selector) -> Result<Locator<'_>, AutomationError> {
        Ok(Locator::new(self.session()?, selector.clone())
            .set_poll_interval(self.config.timeouts.poll_interval))
    }

    async fn init(&mut self, input: CredentialInput) -> (StepOutcome, State) {
        match Credentials::try_from(input) {
            Ok(credentials) => {
                debug!(?credentials, "credentials loaded");
                self.credentials = Some(credentials);
                self.notifier.notify(START_MESSAGE).await;
                (StepOutcome::Completed, State::NavigateToTarget)
            }
            Err(e) => (StepOutcome::Failed(e.to_string()), State::Aborted(e)),
        }
    }

    async fn navigate_to_target(&mut self) -> (StepOutcome, State) {
        match self.launcher.launch().await {
            Ok(session) => self.session = Some(session),
            Err(e) => {
                let error = LoginError::Session(e.to_string());
                return (StepOutcome::Failed(error.to_string()), State::Aborted(error));
            }
        }

        let outcome = match self.session() {
            Ok(session) => match session
                .goto(&self.config.target_url, self.config.timeouts.navigation)
                .await
            {
                Ok(()) => StepOutcome::Completed,
                Err(e) => contained(e, "opening target page"),
            },
            Err(e) => contained(e, "opening target page"),
        };
        (outcome, State::ClickFederatedLogin)
    }

    async fn click_federated_login(&self) -> (StepOutcome, State) {
        let result = match self.locator(&self.config.federated_login_button) {
            Ok(locator) => {
                locator
                    .click(self.config.timeouts.federated_button)
                    .await
            }
            Err(e) => Err(e),
        };
        let outcome = match result {
            Ok(()) => StepOutcome::Completed,
            // Some consoles redirect to the provider without a button.
            Err(e) => contained(e, "federated login control"),
        };
        (outcome, State::AwaitFederatedRedirect)
    }

    async fn await_federated_redirect(&self) -> (StepOutcome, State) {
        let timeouts = &self.config.timeouts;
        let outcome = match self.session() {
            Ok(session) => match wait_for_url(
                session,
                timeouts.federated_redirect,
                timeouts.poll_interval,
                |url| self.rules.is_on_provider(url),
            )
            .await
            {
                Ok(url) => {
                    debug!(%url, "reached identity provider");
                    StepOutcome::Completed
                }
                Err(e) => contained(e, "redirect to identity provider"),
            },
            Err(e) => contained(e, "redirect to identity provider"),
        };
        (outcome, State::SubmitCredentials)
    }

    async fn submit_credentials(&self) -> (StepOutcome, State) {
        let outcome = match self.fill_login_form().await {
            Ok(outcome) => outcome,
            Err(e) => contained(e, "login form"),
        };
        (outcome, State::CheckSecondFactor)
    }

    async fn fill_login_form(&self) -> Result<StepOutcome, AutomationError> {
        let session = self.session()?;
        let url = session.current_url().await?;
        if !url.contains(&self.config.login_page_marker) {
            return Ok(StepOutcome::Skipped(
                "no login form, already authenticated".to_string(),
            ));
        }
        let Some(credentials) = &self.credentials else {
            return Ok(StepOutcome::Failed("credentials not loaded".to_string()));
        };

        let timeout = self.config.timeouts.interaction;
        self.locator(&self.config.username_field)?
            .fill(credentials.username(), timeout)
            .await?;
        self.locator(&self.config.password_field)?
            .fill(credentials.password(), timeout)
            .await?;
        self.locator(&self.config.submit_button)?
            .click(timeout)
            .await?;
        Ok(StepOutcome::Completed)
    }

    async fn second_factor_prompted(&self) -> bool {
        let Ok(session) = self.session() else {
            return false;
        };
        let marker = &self.config.second_factor_url_marker;
        let field = &self.config.second_factor_field;
        let timeouts = &self.config.timeouts;
        poll_until(timeouts.settle, timeouts.poll_interval, move || async move {
            let on_marker_url = session
                .current_url()
                .await
                .map(|url| url.contains(marker.as_str()))
                .unwrap_or(false);
            let field_present = session.is_present(field).await.unwrap_or(false);
            (on_marker_url || field_present).then_some(())
        })
        .await
        .is_some()
    }

    async fn check_second_factor(&self) -> (StepOutcome, State) {
        if !self.second_factor_prompted().await {
            return (
                StepOutcome::Skipped("no second factor prompt".to_string()),
                State::CheckAuthorizationPrompt,
            );
        }

        let Some(seed) = self
            .credentials
            .as_ref()
            .and_then(|c| c.second_factor_seed())
        else {
            let error = LoginError::SecondFactorRequired;
            return (StepOutcome::Failed(error.to_string()), State::Aborted(error));
        };

        let code = match totp::code(seed, SystemTime::now()) {
            Ok(code) => code,
            Err(e) => {
                let error = LoginError::from(e);
                return (StepOutcome::Failed(error.to_string()), State::Aborted(error));
            }
        };

        let result = match self.locator(&self.config.second_factor_field) {
            Ok(locator) => {
                locator
                    .fill(&code, self.config.timeouts.interaction)
                    .await
            }
            Err(e) => Err(e),
        };
        let outcome = match result {
            Ok(()) => StepOutcome::Completed,
            Err(e) => contained(e, "second factor field"),
        };
        (outcome, State::CheckAuthorizationPrompt)
    }

    async fn check_authorization_prompt(&self) -> (StepOutcome, State) {
        let Ok(session) = self.session() else {
            return (
                StepOutcome::Skipped("no browser session".to_string()),
                State::AwaitFinalRedirect,
            );
        };
        let marker = self.config.authorize_url_marker.to_lowercase();
        let timeouts = &self.config.timeouts;
        let on_consent_page = wait_for_url(session, timeouts.settle, timeouts.poll_interval, |url| {
            url.to_lowercase().contains(&marker)
        })
        .await
        .is_ok();

        if !on_consent_page {
            return (
                StepOutcome::Skipped("no authorization prompt".to_string()),
                State::AwaitFinalRedirect,
            );
        }

        let result = match self.locator(&self.config.authorize_button) {
            Ok(locator) => locator.click(timeouts.interaction).await,
            Err(e) => Err(e),
        };
        let outcome = match result {
            Ok(()) => StepOutcome::Completed,
            Err(e) => contained(e, "authorize button"),
        };
        (outcome, State::AwaitFinalRedirect)
    }

    async fn marker_present(&self, session: &dyn BrowserSession) -> bool {
        match &self.config.authenticated_marker {
            Some(marker) => session.is_present(marker).await.unwrap_or_else(|e| {
                debug!("authenticated marker check failed: {e}");
                false
            }),
            None => false,
        }
    }

    async fn await_final_redirect(&self) -> (StepOutcome, State) {
        let Ok(session) = self.session() else {
            return (
                StepOutcome::Skipped("no browser session".to_string()),
                State::Evaluate,
            );
        };
        let timeouts = &self.config.timeouts;
        let settled = poll_until(timeouts.final_redirect, timeouts.poll_interval, move || async move {
            if self.marker_present(session).await {
                return Some(());
            }
            let url = session.current_url().await.ok()?;
            self.rules.left_provider(&url).then_some(())
        })
        .await;

        let outcome = match settled {
            Some(()) => StepOutcome::Completed,
            None => StepOutcome::Skipped(format!(
                "still on the identity provider after {:?}",
                timeouts.final_redirect
            )),
        };
        (outcome, State::Evaluate)
    }

    async fn capture_screenshot(&self) -> Option<PathBuf> {
        let session = self.session.as_deref()?;
        let path = self.config.screenshot_path.clone();
        match session.screenshot(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "screenshot saved");
                Some(path)
            }
            Err(e) => {
                warn!("could not save screenshot: {e}");
                None
            }
        }
    }

    async fn evaluate(&self) -> (StepOutcome, State) {
        let (final_url, marker) = match self.session() {
            Ok(session) => {
                let url = session.current_url().await.unwrap_or_else(|e| {
                    warn!("could not read final URL: {e}");
                    String::new()
                });
                (url, self.marker_present(session).await)
            }
            Err(_) => (String::new(), false),
        };
        let screenshot = self.capture_screenshot().await;

        let signals = PageSignals {
            final_url: final_url.clone(),
            authenticated_marker_present: marker,
        };
        let rule = self.rules.classify(&signals);
        info!(?rule, %final_url, "verdict evaluated");

        let verdict = if rule.is_success() {
            Verdict::Success { final_url }
        } else {
            let error = LoginError::VerdictFailure(format!("ended on {final_url:?}"));
            Verdict::Failure {
                reason: error.to_string(),
                screenshot,
            }
        };
        let outcome = match rule {
            Rule::NoSignal => StepOutcome::Failed("no success signal".to_string()),
            _ => StepOutcome::Completed,
        };
        (outcome, State::Done(Terminal::Completed { verdict }))
    }

    async fn aborted(&self, error: LoginError) -> (StepOutcome, State) {
        error!("sign-in aborted: {error}");
        let screenshot = self.capture_screenshot().await;
        (
            StepOutcome::Completed,
            State::Done(Terminal::Aborted { error, screenshot }),
        )
    }

    async fn done(mut self, terminal: Terminal) -> LoginReport {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("closing browser session failed: {e}");
            }
        }

        let summary = terminal.summary();
        if terminal.is_success() {
            info!("{summary}");
        } else {
            warn!("{summary}");
        }
        self.notifier.notify(&terminal.notification()).await;

        self.steps.push(StepRecord {
            step: Step::Done,
            outcome: StepOutcome::Completed,
        });
        LoginReport {
            terminal,
            steps: self.steps,
        }
    }
}
