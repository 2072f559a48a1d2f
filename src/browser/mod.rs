//! Browser driving: the traits the snapshot orchestrator talks to.
//!
//! The orchestrator needs very little from a browser: load a URL, report
//! where it ended up, hand back the rendered markup, run a script, list
//! cookies, and shut down. [`BrowserDriver`] is exactly that surface, and
//! [`BrowserLauncher`] creates one session per run.
//!
//! The `chromium` feature provides [`chromium::ChromiumLauncher`], which
//! drives a local Chrome/Chromium over the DevTools protocol. Tests use
//! in-memory fakes.

#[cfg(feature = "chromium")]
pub mod chromium;

use crate::error::BrowserError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a browser session should be started.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Binary to launch instead of the auto-detected one.
    pub executable: Option<PathBuf>,
}

/// A cookie as reported by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
}

impl Cookie {
    /// Render as a `Set-Cookie` header value.
    pub fn to_set_cookie(&self) -> String {
        let mut s = format!("{}={}", self.name, self.value);
        if let Some(ref d) = self.domain {
            s.push_str("; Domain=");
            s.push_str(d);
        }
        s.push_str("; Path=");
        s.push_str(self.path.as_deref().unwrap_or("/"));
        if self.secure {
            s.push_str("; Secure");
        }
        s
    }
}

/// One live browser session.
///
/// Errors carry the driver's own message; the orchestrator reports it
/// verbatim.
#[async_trait]
pub trait BrowserDriver: Send {
    /// Load `url` and return once the browser reports the navigation done.
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// The address currently shown, after redirects.
    async fn current_url(&mut self) -> Result<String, BrowserError>;

    /// The current DOM serialised as HTML.
    async fn page_source(&mut self) -> Result<String, BrowserError>;

    /// Run `script` as the body of a function and return its `return` value
    /// (`null` when it returns nothing).
    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value, BrowserError>;

    /// Cookies visible to the current page.
    async fn cookies(&mut self) -> Result<Vec<Cookie>, BrowserError>;

    /// End the session. Called exactly once per session by the orchestrator.
    async fn quit(&mut self) -> Result<(), BrowserError>;
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &BrowserOptions) -> Result<Box<dyn BrowserDriver>, BrowserError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_rendering() {
        let c = Cookie {
            name: "sid".into(),
            value: "abc".into(),
            domain: Some(".example.com".into()),
            path: None,
            secure: true,
        };
        assert_eq!(c.to_set_cookie(), "sid=abc; Domain=.example.com; Path=/; Secure");

        let plain = Cookie {
            domain: None,
            path: Some("/app".into()),
            secure: false,
            ..c
        };
        assert_eq!(plain.to_set_cookie(), "sid=abc; Path=/app");
    }
}
