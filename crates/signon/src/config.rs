//! Run configuration: credentials and flow settings.

use crate::errors::LoginError;
use crate::selector::Selector;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Raw credential values as they come from the environment.
#[derive(Clone, Default)]
pub struct CredentialInput {
    pub username: Option<String>,
    pub password: Option<String>,
    pub second_factor_seed: Option<String>,
}

impl fmt::Debug for CredentialInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialInput")
            .field("username", &self.username.as_ref().map(|_| "<set>"))
            .field("password", &self.password.as_ref().map(|_| "<set>"))
            .field(
                "second_factor_seed",
                &self.second_factor_seed.as_ref().map(|_| "<set>"),
            )
            .finish()
    }
}

/// Validated, read-only credentials for one run.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
    second_factor_seed: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .field("has_second_factor_seed", &self.second_factor_seed.is_some())
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<CredentialInput> for Credentials {
    type Error = LoginError;

    fn try_from(input: CredentialInput) -> Result<Self, Self::Error> {
        let username = non_empty(input.username);
        let password = non_empty(input.password);
        match (username, password) {
            (Some(username), Some(password)) => Ok(Self {
                username,
                password,
                second_factor_seed: non_empty(input.second_factor_seed),
            }),
            (None, None) => Err(LoginError::Configuration(
                "username and password must be set".to_string(),
            )),
            (None, _) => Err(LoginError::Configuration("username must be set".to_string())),
            (_, None) => Err(LoginError::Configuration("password must be set".to_string())),
        }
    }
}

impl Credentials {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn second_factor_seed(&self) -> Option<&str> {
        self.second_factor_seed.as_deref()
    }
}

/// Upper bounds for every wait in the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowTimeouts {
    /// Initial page load of the target console.
    pub navigation: Duration,
    /// Looking for the federated-login button.
    pub federated_button: Duration,
    /// Waiting for the redirect to the identity provider.
    pub federated_redirect: Duration,
    /// Each fill/click on the provider's forms.
    pub interaction: Duration,
    /// Second-factor and consent page detection.
    pub settle: Duration,
    /// Grace period for the redirect back to the console.
    pub final_redirect: Duration,
    pub poll_interval: Duration,
}

impl Default for FlowTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            federated_button: Duration::from_secs(10),
            federated_redirect: Duration::from_secs(15),
            interaction: Duration::from_secs(5),
            settle: Duration::from_secs(3),
            final_redirect: Duration::from_secs(20),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Where the flow goes and what it looks for on the way.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub target_url: String,
    /// Host of the identity provider, e.g. `github.com`.
    pub provider_domain: String,
    pub federated_login_button: Selector,
    /// Substring of the provider URL that marks its sign-in form.
    pub login_page_marker: String,
    pub username_field: Selector,
    pub password_field: Selector,
    pub submit_button: Selector,
    /// Substring of the provider URL that marks the second-factor page.
    pub second_factor_url_marker: String,
    pub second_factor_field: Selector,
    /// Substring (case-insensitive) of the provider URL for the consent page.
    pub authorize_url_marker: String,
    pub authorize_button: Selector,
    /// Element only rendered inside the authenticated console.
    pub authenticated_marker: Option<Selector>,
    /// Path prefixes of the authenticated console.
    pub console_paths: Vec<String>,
    /// URL fragments that mean "still on a sign-in page".
    pub signin_markers: Vec<String>,
    pub screenshot_path: PathBuf,
    pub timeouts: FlowTimeouts,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            target_url: "https://ap-northeast-1.run.claw.cloud/".to_string(),
            provider_domain: "github.com".to_string(),
            federated_login_button: Selector::from("button|GitHub"),
            login_page_marker: "login".to_string(),
            username_field: Selector::from("#login_field"),
            password_field: Selector::from("#password"),
            submit_button: Selector::from("input[name='commit']"),
            second_factor_url_marker: "two-factor".to_string(),
            second_factor_field: Selector::from("#app_totp"),
            authorize_url_marker: "authorize".to_string(),
            authorize_button: Selector::from("button|Authorize"),
            authenticated_marker: None,
            console_paths: Vec::new(),
            signin_markers: vec!["signin".to_string()],
            screenshot_path: PathBuf::from("login_result.png"),
            timeouts: FlowTimeouts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(username: Option<&str>, password: Option<&str>) -> CredentialInput {
        CredentialInput {
            username: username.map(str::to_string),
            password: password.map(str::to_string),
            second_factor_seed: None,
        }
    }

    #[test]
    fn test_missing_credentials_are_configuration_errors() {
        for (u, p) in [(None, None), (Some("octocat"), None), (None, Some("pw"))] {
            let err = Credentials::try_from(input(u, p)).unwrap_err();
            assert!(matches!(err, LoginError::Configuration(_)), "{err:?}");
            assert_eq!(err.exit_code(), 0);
        }
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let err = Credentials::try_from(input(Some("  "), Some("pw"))).unwrap_err();
        assert_eq!(
            err,
            LoginError::Configuration("username must be set".to_string())
        );

        let creds = Credentials::try_from(CredentialInput {
            username: Some("octocat".into()),
            password: Some("pw".into()),
            second_factor_seed: Some(String::new()),
        })
        .unwrap();
        assert_eq!(creds.second_factor_seed(), None);
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let creds = Credentials::try_from(CredentialInput {
            username: Some("octocat".into()),
            password: Some("hunter2".into()),
            second_factor_seed: Some("JBSWY3DPEHPK3PXP".into()),
        })
        .unwrap();
        let rendered = format!("{creds:?} {:?}", input(Some("octocat"), Some("hunter2")));
        assert!(!rendered.contains("octocat"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("JBSWY3DPEHPK3PXP"));
        assert!(rendered.contains("has_second_factor_seed: true"));
    }
}
