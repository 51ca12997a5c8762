//! Success heuristic applied once the flow has settled.
//!
//! Signals are checked in priority order: authenticated DOM marker, console
//! path, then "left the identity provider". No single signal is reliable
//! across provider redirect variants, so the first positive one wins.

use crate::config::FlowConfig;
use serde::Serialize;
use url::Url;

/// What `Evaluate` observed on the final page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSignals {
    pub final_url: String,
    pub authenticated_marker_present: bool,
}

/// Which rule produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    AuthenticatedMarker,
    ConsolePath,
    LeftProvider,
    NoSignal,
}

impl Rule {
    pub fn is_success(self) -> bool {
        !matches!(self, Rule::NoSignal)
    }
}

#[derive(Debug, Clone)]
pub struct VerdictRules {
    provider_domain: String,
    console_paths: Vec<String>,
    signin_markers: Vec<String>,
}

impl VerdictRules {
    pub fn new(
        provider_domain: impl Into<String>,
        console_paths: Vec<String>,
        signin_markers: Vec<String>,
    ) -> Self {
        Self {
            provider_domain: provider_domain.into().to_lowercase(),
            console_paths,
            signin_markers: signin_markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &FlowConfig) -> Self {
        Self::new(
            config.provider_domain.clone(),
            config.console_paths.clone(),
            config.signin_markers.clone(),
        )
    }

    pub fn classify(&self, signals: &PageSignals) -> Rule {
        if signals.authenticated_marker_present {
            return Rule::AuthenticatedMarker;
        }
        if self.matches_console_path(&signals.final_url) {
            return Rule::ConsolePath;
        }
        if self.left_provider(&signals.final_url) && !self.is_signin_page(&signals.final_url) {
            return Rule::LeftProvider;
        }
        Rule::NoSignal
    }

    /// Whether `url` is a web page served by someone other than the provider.
    /// `about:blank` and `chrome-error:` pages mean the target never loaded.
    pub fn left_provider(&self, url: &str) -> bool {
        web_host(url).is_some_and(|host| !self.host_is_provider(&host))
    }

    fn host_is_provider(&self, host: &str) -> bool {
        !self.provider_domain.is_empty()
            && (host == self.provider_domain
                || host.ends_with(&format!(".{}", self.provider_domain)))
    }

    /// Whether `url` is served by the identity provider (host or subdomain).
    pub fn is_on_provider(&self, url: &str) -> bool {
        if self.provider_domain.is_empty() {
            return false;
        }
        match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) {
            Some(host) => self.host_is_provider(&host),
            // Unparseable URL: fall back to a plain substring test.
            None => url.to_lowercase().contains(&self.provider_domain),
        }
    }

    fn is_signin_page(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.signin_markers.iter().any(|m| url.contains(m.as_str()))
    }

    fn matches_console_path(&self, url: &str) -> bool {
        if self.console_paths.is_empty() {
            return false;
        }
        if !self.left_provider(url) {
            return false;
        }
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let path = parsed.path();
        self.console_paths
            .iter()
            .any(|prefix| path_has_prefix(path, prefix))
    }
}

/// Lowercased host of an `http`/`https` URL; `None` for anything else.
fn web_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().map(str::to_lowercase)
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> VerdictRules {
        VerdictRules::new(
            "github.com",
            vec!["/console".to_string(), "/apps/".to_string()],
            vec!["signin".to_string()],
        )
    }

    fn signals(url: &str, marker: bool) -> PageSignals {
        PageSignals {
            final_url: url.to_string(),
            authenticated_marker_present: marker,
        }
    }

    #[test]
    fn test_marker_wins_even_on_provider_domain() {
        let rule = rules().classify(&signals("https://github.com/login/oauth/authorize", true));
        assert_eq!(rule, Rule::AuthenticatedMarker);
    }

    #[test]
    fn test_console_path_match() {
        let r = rules();
        assert_eq!(
            r.classify(&signals("https://run.claw.cloud/console/apps?x=1", false)),
            Rule::ConsolePath
        );
        assert_eq!(
            r.classify(&signals("https://run.claw.cloud/apps", false)),
            Rule::ConsolePath
        );
        // prefix must end on a segment boundary
        assert_ne!(
            r.classify(&signals("https://run.claw.cloud/consoles-signin", false)),
            Rule::ConsolePath
        );
    }

    #[test]
    fn test_left_provider() {
        assert_eq!(
            rules().classify(&signals("https://ap-northeast-1.run.claw.cloud/", false)),
            Rule::LeftProvider
        );
    }

    #[test]
    fn test_still_on_provider_is_failure() {
        let r = rules();
        for url in [
            "https://github.com/sessions/two-factor/app",
            "https://api.github.com/whatever",
            "",
        ] {
            assert_eq!(r.classify(&signals(url, false)), Rule::NoSignal, "{url}");
        }
    }

    #[test]
    fn test_browser_internal_pages_are_not_success() {
        let r = rules();
        for url in [
            "about:blank",
            "chrome-error://chromewebdata/",
            "data:text/html,<p>hi</p>",
            "not a url",
        ] {
            assert_eq!(r.classify(&signals(url, false)), Rule::NoSignal, "{url}");
        }
    }

    #[test]
    fn test_signin_page_is_not_success() {
        assert_eq!(
            rules().classify(&signals("https://run.claw.cloud/signin?error=1", false)),
            Rule::NoSignal
        );
    }

    #[test]
    fn test_provider_name_in_query_does_not_count() {
        let r = rules();
        assert!(!r.is_on_provider("https://run.claw.cloud/callback?from=github.com"));
        assert!(r.is_on_provider("https://GitHub.com/login"));
        assert!(!r.is_on_provider("https://notgithub.com/"));
    }
}
