//! Chromium-backed [`BrowsingSession`].

use anyhow::{Context, Result, anyhow, bail};
use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::BrowserSettings;
use crate::session::{BrowsingSession, Control};
use crate::utils::{POLL_INTERVAL, get_random_user_agent, poll_until};

const CONTROL_ATTR: &str = "data-floorsheet-control";

const CHROME_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-blink-features=AutomationControlled",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-default-apps",
    "--disable-sync",
    "--no-first-run",
    "--no-default-browser-check",
];

/// Owns the Chrome process, its CDP handler task and the single page the
/// scrape runs in. Call [`BrowsingSession::close`] when done; dropping the
/// session only aborts the handler and removes the profile directory.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
    page_load_timeout: Duration,
}

impl ChromeSession {
    pub async fn launch(settings: &BrowserSettings, page_load_timeout: Duration) -> Result<Self> {
        let user_data_dir =
            std::env::temp_dir().join(format!("floorsheet_chrome_{}", std::process::id()));
        std::fs::create_dir_all(&user_data_dir).context("Failed to create user data directory")?;

        let mut builder = BrowserConfig::builder()
            .request_timeout(page_load_timeout)
            .window_size(settings.window_width, settings.window_height)
            .user_data_dir(user_data_dir.clone())
            .arg(format!("--user-agent={}", get_random_user_agent()));

        builder = if settings.headless {
            builder.headless_mode(HeadlessMode::default())
        } else {
            builder.with_head()
        };

        if let Some(path) = &settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        for arg in CHROME_ARGS {
            builder = builder.arg(*arg);
        }
        if settings.ci {
            builder = builder.arg("--single-process");
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {e}"))?;

        log::info!("Launching Chrome (headless: {}, ci: {})", settings.headless, settings.ci);

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::debug!("Browser handler error: {e:?}");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(anyhow!("Failed to open browser tab: {e}"));
            }
        };

        Ok(Self {
            browser,
            page,
            handler,
            user_data_dir: Some(user_data_dir),
            page_load_timeout,
        })
    }

    fn cleanup_user_data_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                log::warn!("Failed to remove Chrome profile {}: {e}", path.display());
            }
        }
    }

    async fn has_element(&self, selector: &str) -> bool {
        self.page.find_element(selector).await.is_ok()
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler.abort();
        if self.user_data_dir.is_some() {
            log::warn!("ChromeSession dropped without close()");
            self.cleanup_user_data_dir();
        }
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn find_controls_script(needle: &str) -> String {
    format!(
        r#"(() => {{
    const needle = {needle};
    document.querySelectorAll('[{attr}]').forEach((el) => el.removeAttribute('{attr}'));
    const found = [];
    document.querySelectorAll('a, button').forEach((el) => {{
        const text = el.textContent || '';
        const aria = el.tagName === 'A' ? (el.getAttribute('aria-label') || '') : '';
        if (!text.includes(needle) && !aria.includes(needle)) return;
        const id = String(found.length);
        el.setAttribute('{attr}', id);
        const style = window.getComputedStyle(el);
        const rect = el.getBoundingClientRect();
        found.push({{
            selector: '[{attr}="' + id + '"]',
            label: (text.trim() || aria).slice(0, 64),
            enabled: !el.disabled && el.getAttribute('aria-disabled') !== 'true',
            displayed: style.display !== 'none' && style.visibility !== 'hidden'
                && rect.width > 0 && rect.height > 0,
        }});
    }});
    return found;
}})()"#,
        needle = js_string(needle),
        attr = CONTROL_ATTR,
    )
}

impl BrowsingSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let goto = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };
        match tokio::time::timeout(self.page_load_timeout, goto).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow!("Failed to navigate to {url}: {e}")),
            Err(_) => bail!(
                "Page load timed out after {}s: {url}",
                self.page_load_timeout.as_secs()
            ),
        }
    }

    async fn wait_for_element(&mut self, tag: &str, timeout: Duration) -> Result<bool> {
        let this = &*self;
        Ok(poll_until(timeout, POLL_INTERVAL, || this.has_element(tag)).await)
    }

    async fn current_document_html(&mut self) -> Result<String> {
        self.page
            .content()
            .await
            .context("Failed to read page content")
    }

    async fn find_clickable_by_text(&mut self, text: &str) -> Result<Vec<Control>> {
        self.page
            .evaluate(find_controls_script(text).as_str())
            .await
            .context("Failed to search for clickable controls")?
            .into_value::<Vec<Control>>()
            .context("Unexpected control search result")
    }

    async fn click(&mut self, control: &Control) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
            js_string(&control.selector)
        );
        let clicked = self
            .page
            .evaluate(script.as_str())
            .await
            .context("Failed to click control")?
            .into_value::<bool>()
            .unwrap_or(false);
        if !clicked {
            bail!("Control {:?} is no longer attached", control.label);
        }
        Ok(())
    }

    async fn select_option(&mut self, name: &str, value: &str, timeout: Duration) -> Result<bool> {
        let selector = format!("select[name={}]", js_string(name));
        let this = &*self;
        if !poll_until(timeout, POLL_INTERVAL, || this.has_element(&selector)).await {
            return Ok(false);
        }

        let script = format!(
            r#"(() => {{
    const el = document.querySelector({selector});
    if (!el) return false;
    el.value = {value};
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return el.value === {value};
}})()"#,
            selector = js_string(&selector),
            value = js_string(value),
        );
        let selected = self
            .page
            .evaluate(script.as_str())
            .await
            .context("Failed to change selection")?
            .into_value::<bool>()
            .unwrap_or(false);
        Ok(selected)
    }

    /// Closes Chrome and waits for the process to exit.
    async fn close(&mut self) {
        if self.user_data_dir.is_none() {
            return;
        }
        if let Err(e) = self.browser.close().await {
            log::warn!("Failed to close browser: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            log::warn!("Failed to wait for browser exit: {e}");
        }
        self.handler.abort();
        self.cleanup_user_data_dir();
        log::info!("Browser closed");
    }
}
