use crate::core::{BrowserTrait, Config, PageDriver};
use crate::errors::{FormError, Result};
use crate::utils::javascript;
use async_trait::async_trait;
use headless_chrome::browser::tab::point::Point;
use headless_chrome::browser::tab::ModifierKey;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

/// Chrome browser implementation
pub struct ChromeBrowser {
    browser: Option<Browser>,
}

impl ChromeBrowser {
    pub fn new() -> Self {
        Self { browser: None }
    }
}

impl Default for ChromeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserTrait for ChromeBrowser {
    type Page = ChromePage;

    async fn launch(&mut self, config: &Config) -> Result<()> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.browser.viewport.width, config.browser.viewport.height
        );

        let user_agent_arg = config
            .browser
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];

        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }

        if config.browser.disable_images {
            args.push(OsStr::new("--blink-settings=imagesEnabled=false"));
        }

        for arg in &config.browser.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.browser.headless)
            .window_size(Some((
                config.browser.viewport.width,
                config.browser.viewport.height,
            )))
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(args)
            .build()
            .map_err(|e| FormError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| FormError::LaunchFailed(e.to_string()))?;

        debug!(headless = config.browser.headless, "chrome launched");
        self.browser = Some(browser);
        Ok(())
    }

    async fn new_page(&self) -> Result<ChromePage> {
        let browser = self.browser.as_ref().ok_or(FormError::BrowserNotLaunched)?;

        let tab = browser
            .new_tab()
            .map_err(|e| FormError::LaunchFailed(e.to_string()))?;

        Ok(ChromePage { tab })
    }

    fn is_running(&self) -> bool {
        self.browser.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the handle terminates the Chrome process.
        self.browser = None;
        Ok(())
    }
}

/// One Chrome tab.
pub struct ChromePage {
    tab: Arc<Tab>,
}

fn chrome_err(e: impl std::fmt::Display) -> FormError {
    FormError::from_any_error(e)
}

impl ChromePage {
    fn run_script(&self, script: &str) -> Result<Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| FormError::JavaScriptFailed(e.to_string()))?;
        Ok(result.value.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        self.tab.set_default_timeout(timeout);
        self.tab
            .navigate_to(url)
            .map_err(|e| FormError::NavigationFailed(format!("{}: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| FormError::NavigationFailed(format!("{}: {}", url, e)))?;

        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|e| FormError::Timeout(format!("waiting for {}: {}", selector, e)))?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let element = self
            .tab
            .find_element(selector)
            .map_err(|_| FormError::ElementNotFound(selector.to_string()))?;
        element.click().map_err(chrome_err)?;
        element
            .call_js_fn(javascript::CLEAR_ELEMENT_FN, vec![], false)
            .map_err(|e| FormError::JavaScriptFailed(e.to_string()))?;
        element.type_into(value).map_err(chrome_err)?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .tab
            .find_element(selector)
            .map_err(|_| FormError::ElementNotFound(selector.to_string()))?;
        element.click().map_err(chrome_err)?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let outcome = self.run_script(&javascript::select_option(selector, value))?;
        match outcome.as_str() {
            Some("ok") => Ok(()),
            Some("no_option") => Err(FormError::OptionNotFound {
                selector: selector.to_string(),
                value: value.to_string(),
            }),
            _ => Err(FormError::ElementNotFound(selector.to_string())),
        }
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<()> {
        match self.run_script(&javascript::set_checked(selector, checked))? {
            Value::Bool(true) => Ok(()),
            _ => Err(FormError::InvalidValue {
                field: selector.to_string(),
                reason: format!("could not set checked = {}", checked),
            }),
        }
    }

    async fn upload_files(&self, selector: &str, paths: &[PathBuf]) -> Result<()> {
        let element = self
            .tab
            .find_element(selector)
            .map_err(|_| FormError::ElementNotFound(selector.to_string()))?;
        let paths: Vec<String> = paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
        element.set_input_files(&paths).map_err(chrome_err)?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| FormError::ScreenshotFailed(e.to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.run_script(script)
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.tab.press_key(key).map_err(chrome_err)?;
        Ok(())
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
        self.tab.click_point(Point { x, y }).map_err(chrome_err)?;
        Ok(())
    }

    async fn clear_focused(&self) -> Result<()> {
        self.tab
            .press_key_with_modifiers("a", Some(&[ModifierKey::Ctrl]))
            .map_err(chrome_err)?;
        self.tab.press_key("Backspace").map_err(chrome_err)?;
        Ok(())
    }

    async fn type_keys(&self, text: &str) -> Result<()> {
        self.tab.type_str(text).map_err(chrome_err)?;
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        self.tab.get_content().map_err(chrome_err)
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    async fn title(&self) -> Result<String> {
        self.tab.get_title().map_err(chrome_err)
    }

    async fn close(&self) -> Result<()> {
        self.tab.close(true).map_err(chrome_err)?;
        Ok(())
    }
}
