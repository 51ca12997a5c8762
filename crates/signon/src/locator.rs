use tracing::{debug, instrument};

use crate::errors::AutomationError;
use crate::selector::Selector;
use crate::session::BrowserSession;
use crate::wait::poll_until;
use std::sync::Mutex;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A selector bound to a session. Every wait or action takes its own bound.
#[derive(Clone)]
pub struct Locator<'a> {
    session: &'a dyn BrowserSession,
    selector: Selector,
    interval: Duration,
}

impl<'a> Locator<'a> {
    pub fn new(session: &'a dyn BrowserSession, selector: impl Into<Selector>) -> Self {
        Self {
            session,
            selector: selector.into(),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn set_poll_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wait up to `timeout` for an element matching the locator to appear.
    #[instrument(level = "debug", skip(self), fields(selector = %self.selector))]
    pub async fn wait(&self, timeout: Duration) -> Result<(), AutomationError> {
        if let Selector::Invalid(reason) = &self.selector {
            return Err(AutomationError::InvalidSelector(reason.clone()));
        }

        let found = poll_until(timeout, self.interval, move || async move {
            match self.session.is_present(&self.selector).await {
                Ok(true) => Some(()),
                Ok(false) => None,
                Err(e) => {
                    debug!("presence check failed: {e}");
                    None
                }
            }
        })
        .await;

        found.ok_or_else(|| {
            AutomationError::Timeout(format!(
                "Timed out after {timeout:?} waiting for element {}",
                self.selector
            ))
        })
    }

    pub async fn click(&self, timeout: Duration) -> Result<(), AutomationError> {
        self.wait(timeout).await?;
        self.session.click(&self.selector).await
    }

    pub async fn fill(&self, value: &str, timeout: Duration) -> Result<(), AutomationError> {
        self.wait(timeout).await?;
        self.session.fill(&self.selector, value).await
    }
}

/// Wait until the page URL satisfies `predicate`, returning the matching URL.
pub async fn wait_for_url<P>(
    session: &dyn BrowserSession,
    timeout: Duration,
    interval: Duration,
    predicate: P,
) -> Result<String, AutomationError>
where
    P: Fn(&str) -> bool,
{
    let last_seen = Mutex::new(String::new());
    let (predicate, last_seen) = (&predicate, &last_seen);
    let matched = poll_until(timeout, interval, move || async move {
        let url = session.current_url().await.ok()?;
        if predicate(&url) {
            return Some(url);
        }
        if let Ok(mut last) = last_seen.lock() {
            *last = url;
        }
        None
    })
    .await;

    matched.ok_or_else(|| {
        let last = last_seen.lock().map(|s| s.clone()).unwrap_or_default();
        AutomationError::Timeout(format!(
            "URL did not reach the expected page within {timeout:?} (last seen {last:?})"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;

    /// A page whose element shows up after a number of presence checks.
    struct SlowPage {
        appears_after: u32,
        checks: Mutex<u32>,
        clicked: Mutex<bool>,
    }

    impl SlowPage {
        fn new(appears_after: u32) -> Self {
            Self {
                appears_after,
                checks: Mutex::new(0),
                clicked: Mutex::new(false),
            }
        }
    }

    #[async_trait]
    impl BrowserSession for SlowPage {
        async fn goto(&self, _url: &str, _timeout: Duration) -> Result<(), AutomationError> {
            Ok(())
        }

        async fn current_url(&self) -> Result<String, AutomationError> {
            Ok("https://console.example/".to_string())
        }

        async fn is_present(&self, _selector: &Selector) -> Result<bool, AutomationError> {
            let mut checks = self.checks.lock().unwrap();
            *checks += 1;
            Ok(*checks > self.appears_after)
        }

        async fn click(&self, _selector: &Selector) -> Result<(), AutomationError> {
            *self.clicked.lock().unwrap() = true;
            Ok(())
        }

        async fn fill(&self, _selector: &Selector, _value: &str) -> Result<(), AutomationError> {
            Ok(())
        }

        async fn screenshot(&self, _path: &Path) -> Result<(), AutomationError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), AutomationError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_waits_for_late_element() {
        let page = SlowPage::new(3);
        let locator = Locator::new(&page, "button|GitHub");

        locator.click(Duration::from_secs(5)).await.unwrap();

        assert!(*page.clicked.lock().unwrap());
        assert_eq!(*page.checks.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_honours_given_bound() {
        let page = SlowPage::new(u32::MAX);
        let locator = Locator::new(&page, "#login_field").set_poll_interval(Duration::from_millis(100));

        let start = tokio::time::Instant::now();
        let err = locator.click(Duration::from_secs(2)).await.unwrap_err();

        assert!(err.is_absence());
        assert!(err.to_string().contains("2s"), "{err}");
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!*page.clicked.lock().unwrap());
    }

    #[tokio::test]
    async fn test_invalid_selector_fails_without_polling() {
        let page = SlowPage::new(0);
        let locator = Locator::new(&page, "");

        let err = locator.wait(Duration::from_secs(1)).await.unwrap_err();

        assert!(matches!(err, AutomationError::InvalidSelector(_)));
        assert_eq!(*page.checks.lock().unwrap(), 0);
    }
}
