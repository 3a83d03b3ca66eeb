use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::BrowserPage;
use crate::error::BrowserError;

const DEFAULT_ENDPOINT: &str = "http://localhost:4444";
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(250);
const QUIET_POLLS: u32 = 2;

const READY_STATE_SCRIPT: &str = "return { ready: document.readyState === 'complete', \
resources: performance.getEntriesByType('resource').length };";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebDriverConfig {
    /// Base URL of a running chromedriver or compatible server.
    pub endpoint: String,
    pub headless: bool,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            headless: true,
        }
    }
}

impl WebDriverConfig {
    /// Reads `WEBDRIVER_URL` and `BROWSER_HEADLESS`.
    pub fn from_env() -> Self {
        let endpoint = std::env::var("WEBDRIVER_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let headless = std::env::var("BROWSER_HEADLESS")
            .map(|value| !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Self { endpoint, headless }
    }

    fn capabilities(&self) -> Value {
        let mut args = vec!["--window-size=1280,800", "--disable-gpu"];
        if self.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args },
                }
            }
        })
    }
}

/// A browser session driven over the W3C WebDriver protocol. The session's
/// current window is the page.
pub struct WebDriverBrowser {
    client: Client,
    endpoint: String,
    session_id: Option<String>,
}

impl WebDriverBrowser {
    pub async fn launch(config: WebDriverConfig) -> Result<Self, BrowserError> {
        let client = Client::new();
        let endpoint = config.endpoint.trim_end_matches('/').to_string();

        let response = client
            .post(format!("{endpoint}/session"))
            .json(&config.capabilities())
            .send()
            .await?;
        let value = read_value(response).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Request("new session response had no sessionId".to_string()))?
            .to_string();

        info!(session = %session_id, endpoint = %endpoint, headless = config.headless, "browser launched");
        Ok(Self {
            client,
            endpoint,
            session_id: Some(session_id),
        })
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let session_id = self.session_id.as_deref().ok_or(BrowserError::Closed)?;
        let url = format!("{}/session/{session_id}{path}", self.endpoint);
        debug!(%method, path, "webdriver command");

        let request = self.client.request(method, url);
        let request = match body {
            Some(body) => request.json(&body),
            None => request,
        };
        read_value(request.send().await?).await
    }

    async fn execute(&self, script: &str) -> Result<Value, BrowserError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    async fn find_element(&self, using: &str, query: &str) -> Result<String, BrowserError> {
        let value = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": using, "value": query })),
            )
            .await
            .map_err(|err| match err {
                BrowserError::WebDriver { error, .. } if error == "no such element" => {
                    BrowserError::ElementNotFound(query.to_string())
                }
                other => other,
            })?;

        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Request("element response had no element reference".to_string()))
    }

    /// CSS first; text that is not a usable selector falls back to an exact,
    /// then partial, text match.
    async fn locate(&self, target: &str) -> Result<String, BrowserError> {
        match self.find_element("css selector", target).await {
            Ok(element) => return Ok(element),
            Err(BrowserError::ElementNotFound(_)) => {}
            Err(BrowserError::WebDriver { error, .. }) if error == "invalid selector" => {}
            Err(err) => return Err(err),
        }

        let literal = xpath_literal(target);
        for xpath in [
            format!("//*[normalize-space(text())={literal}]"),
            format!("//*[contains(normalize-space(text()), {literal})]"),
        ] {
            match self.find_element("xpath", &xpath).await {
                Ok(element) => return Ok(element),
                Err(BrowserError::ElementNotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(BrowserError::ElementNotFound(target.to_string()))
    }
}

#[async_trait]
impl BrowserPage for WebDriverBrowser {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        if url.trim().is_empty() {
            return Err(BrowserError::InvalidInput("url must not be empty".to_string()));
        }
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), BrowserError> {
        let mut tracker = IdleTracker::default();
        let poll = async {
            loop {
                let state = self.execute(READY_STATE_SCRIPT).await?;
                let ready = state.get("ready").and_then(Value::as_bool).unwrap_or(false);
                let resources = state.get("resources").and_then(Value::as_u64).unwrap_or(0);
                if tracker.observe(ready, resources) {
                    return Ok::<(), BrowserError>(());
                }
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .unwrap_or(Err(BrowserError::Timeout("network idle")))
    }

    async fn evaluate(&mut self, script: &str) -> Result<String, BrowserError> {
        Ok(match self.execute(script).await? {
            Value::Null => String::new(),
            Value::String(text) => text,
            other => other.to_string(),
        })
    }

    async fn click(&mut self, target: &str) -> Result<(), BrowserError> {
        if target.trim().is_empty() {
            return Err(BrowserError::InvalidInput("click target must not be empty".to_string()));
        }
        let element = self.locate(target).await?;
        self.command(Method::POST, &format!("/element/{element}/click"), Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), BrowserError> {
        if selector.trim().is_empty() {
            return Err(BrowserError::InvalidInput("selector must not be empty".to_string()));
        }
        let element = self.find_element("css selector", selector).await?;
        self.command(Method::POST, &format!("/element/{element}/clear"), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": value })),
        )
        .await
        .map(|_| ())
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::Request("screenshot response was not a string".to_string()))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|err| BrowserError::Request(format!("screenshot was not valid base64: {err}")))?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.session_id.is_none() {
            return Ok(());
        }
        let result = self.command(Method::DELETE, "", None).await;
        let session_id = self.session_id.take();
        info!(session = ?session_id, "browser closed");
        result.map(|_| ())
    }
}

impl Drop for WebDriverBrowser {
    fn drop(&mut self) {
        let Some(session_id) = self.session_id.take() else {
            return;
        };
        warn!(session = %session_id, "browser dropped without close; releasing in background");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let request = self
                .client
                .delete(format!("{}/session/{session_id}", self.endpoint));
            handle.spawn(async move {
                let _ = request.send().await;
            });
        }
    }
}

async fn read_value(response: reqwest::Response) -> Result<Value, BrowserError> {
    let status = response.status();
    let payload = response.json::<Value>().await?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    Err(BrowserError::WebDriver {
        error: value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
        message: value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_else(|| status.as_str())
            .to_string(),
    })
}

/// Quotes `text` as an XPath 1.0 string literal.
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    if !text.contains('"') {
        return format!("\"{text}\"");
    }
    let parts = text
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect::<Vec<_>>()
        .join(", \"'\", ");
    format!("concat({parts})")
}

/// Network idle: the document is complete and the resource count held still
/// for [`QUIET_POLLS`] consecutive polls.
#[derive(Default)]
struct IdleTracker {
    last: Option<u64>,
    quiet: u32,
}

impl IdleTracker {
    fn observe(&mut self, ready: bool, resources: u64) -> bool {
        if ready && self.last == Some(resources) {
            self.quiet += 1;
        } else {
            self.quiet = 0;
        }
        self.last = Some(resources);
        self.quiet >= QUIET_POLLS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_flag_controls_chrome_args() {
        let headless = WebDriverConfig::default().capabilities();
        let args = &headless["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
        assert!(args.as_array().unwrap().contains(&json!("--headless=new")));

        let headed = WebDriverConfig {
            headless: false,
            ..WebDriverConfig::default()
        }
        .capabilities();
        let args = &headed["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
        assert!(!args.as_array().unwrap().contains(&json!("--headless=new")));
    }

    #[test]
    fn xpath_literal_handles_quotes() {
        assert_eq!(xpath_literal("Sign in"), "'Sign in'");
        assert_eq!(xpath_literal("Don't panic"), "\"Don't panic\"");
        assert_eq!(
            xpath_literal(r#"Say "hi" it's fine"#),
            r#"concat('Say "hi" it', "'", 's fine')"#
        );
    }

    #[test]
    fn idle_needs_complete_document_and_quiet_resources() {
        let mut tracker = IdleTracker::default();
        assert!(!tracker.observe(false, 3));
        assert!(!tracker.observe(true, 3));
        assert!(!tracker.observe(true, 3));
        assert!(tracker.observe(true, 3));

        let mut tracker = IdleTracker::default();
        assert!(!tracker.observe(true, 1));
        assert!(!tracker.observe(true, 1));
        assert!(!tracker.observe(true, 4));
        assert!(!tracker.observe(true, 4));
        assert!(tracker.observe(true, 4));
    }

    #[tokio::test]
    async fn closed_browser_rejects_commands() {
        let mut browser = WebDriverBrowser {
            client: Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            session_id: None,
        };
        assert!(matches!(
            browser.navigate("https://example.com").await,
            Err(BrowserError::Closed)
        ));
        assert!(browser.close().await.is_ok());
    }
}
