//! Chrome/Chromium over the DevTools protocol (`chromiumoxide`).

use super::{BrowserDriver, BrowserLauncher, BrowserOptions, Cookie};
use crate::error::BrowserError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Launches a local Chrome/Chromium per session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &BrowserOptions) -> Result<Box<dyn BrowserDriver>, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--mute-audio");
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(ref exe) = options.executable {
            builder = builder.chrome_executable(exe);
        }
        let config = builder
            .build()
            .map_err(|e| BrowserError::new(format!("browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::new(format!("launch failed: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                let mut driver = ChromiumDriver {
                    browser,
                    page: None,
                    handler: handler_task,
                };
                if let Err(quit_err) = driver.quit().await {
                    warn!("Browser shutdown after failed launch: {quit_err}");
                }
                return Err(BrowserError::new(format!("could not open a page: {e}")));
            }
        };

        info!("Browser launched (headless: {})", options.headless);
        Ok(Box::new(ChromiumDriver {
            browser,
            page: Some(page),
            handler: handler_task,
        }))
    }
}

/// A running browser with one page.
pub struct ChromiumDriver {
    browser: Browser,
    page: Option<Page>,
    handler: JoinHandle<()>,
}

impl ChromiumDriver {
    fn page(&self) -> Result<&Page, BrowserError> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::new("session already closed"))
    }
}

fn cdp_err(e: impl std::fmt::Display) -> BrowserError {
    BrowserError::new(e.to_string())
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.page()?.goto(url).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        self.page()?
            .url()
            .await
            .map_err(cdp_err)?
            .ok_or_else(|| BrowserError::new("page reports no URL"))
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        self.page()?.content().await.map_err(cdp_err)
    }

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value, BrowserError> {
        let params = EvaluateParams::builder()
            .expression(format!("(() => {{ {script} }})()"))
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(BrowserError::new)?;
        let result = self
            .page()?
            .evaluate_expression(params)
            .await
            .map_err(cdp_err)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn cookies(&mut self) -> Result<Vec<Cookie>, BrowserError> {
        let cookies = self.page()?.get_cookies().await.map_err(cdp_err)?;
        Ok(cookies
            .into_iter()
            .map(|c| Cookie {
                name: c.name,
                value: c.value,
                domain: Some(c.domain).filter(|d| !d.is_empty()),
                path: Some(c.path).filter(|p| !p.is_empty()),
                secure: c.secure,
            })
            .collect())
    }

    async fn quit(&mut self) -> Result<(), BrowserError> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Page close failed: {e}");
            }
        }
        let closed = self.browser.close().await.map(|_| ()).map_err(cdp_err);
        if let Err(e) = self.browser.wait().await {
            warn!("Waiting for browser exit failed: {e}");
        }
        self.handler.abort();
        closed
    }
}
