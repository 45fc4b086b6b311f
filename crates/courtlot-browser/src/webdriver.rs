//! W3C WebDriver client (chromedriver and compatible servers).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::{Browser, BrowserError, Choice, ElementState, LaunchOptions, LoadState, Locator, Page};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Quiet period that must pass with the page still settled before
/// [`LoadState::NetworkIdle`] is reported.
const IDLE_QUIET: Duration = Duration::from_millis(500);
const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(60);
/// Headroom over the driver's own timeouts before an HTTP round trip is
/// abandoned.
const REQUEST_SLACK: Duration = Duration::from_secs(2);

/// Launches Chrome sessions through a WebDriver server.
pub struct WebDriverBrowser {
    client: reqwest::Client,
    endpoint: String,
    options: LaunchOptions,
    action_timeout: Duration,
    page_load_timeout: Duration,
}

impl WebDriverBrowser {
    /// `endpoint` should be like `http://localhost:9515` (no trailing slash).
    pub fn new(endpoint: String, options: LaunchOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            options,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            page_load_timeout: DEFAULT_PAGE_LOAD_TIMEOUT,
        }
    }

    /// How long element actions wait for their target to appear.
    pub fn with_action_timeout(mut self, action_timeout: Duration) -> Self {
        self.action_timeout = action_timeout;
        self
    }

    /// How long the driver may spend on a navigation, including one started
    /// by a click.
    pub fn with_page_load_timeout(mut self, page_load_timeout: Duration) -> Self {
        self.page_load_timeout = page_load_timeout;
        self
    }

    /// Upper bound on any single request to the driver.
    fn request_timeout(&self) -> Duration {
        self.action_timeout.max(self.page_load_timeout) + REQUEST_SLACK
    }

    fn capabilities(&self) -> Value {
        let mut args = vec!["--no-first-run", "--disable-search-engine-choice-screen"];
        if self.options.headless {
            args.push("--headless=new");
        }
        let mut chrome = json!({ "args": args });
        if self.options.disable_autofill {
            if let Some(args) = chrome["args"].as_array_mut() {
                args.push(json!("--disable-features=AutofillServerCommunication"));
            }
            chrome["prefs"] = json!({
                "autofill.profile_enabled": false,
                "autofill.credit_card_enabled": false,
                "credentials_enable_service": false,
                "profile.password_manager_enabled": false,
            });
        }
        let prompts = if self.options.accept_dialogs {
            "accept"
        } else {
            "dismiss and notify"
        };
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "unhandledPromptBehavior": prompts,
                    "timeouts": {
                        "implicit": 0,
                        "pageLoad": millis(self.page_load_timeout),
                        "script": millis(self.action_timeout),
                    },
                    "goog:chromeOptions": chrome,
                }
            }
        })
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn launch(&self) -> Result<Box<dyn Page>, BrowserError> {
        let url = format!("{}/session", self.endpoint);
        info!(endpoint = %self.endpoint, headless = self.options.headless, "starting browser session");

        let request = self.client.post(&url).json(&self.capabilities());
        let value = within(self.request_timeout(), "new session", async {
            unwrap_value(request.send().await?).await
        })
        .await
        .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| BrowserError::Launch("response carried no sessionId".into()))?
            .to_string();

        info!(session = %session_id, "browser session started");
        Ok(Box::new(WebDriverPage {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            action_timeout: self.action_timeout,
            request_timeout: self.request_timeout(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One WebDriver session with its single window.
///
/// Dropping an unclosed page deletes the remote session in the background so
/// no browser process outlives its owner.
pub struct WebDriverPage {
    client: reqwest::Client,
    base: String,
    action_timeout: Duration,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl WebDriverPage {
    fn ensure_open(&self) -> Result<(), BrowserError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrowserError::Closed);
        }
        Ok(())
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, BrowserError> {
        self.ensure_open()?;
        let request = self.client.post(format!("{}{}", self.base, path)).json(&body);
        within(self.request_timeout, &format!("POST {path}"), async {
            unwrap_value(request.send().await?).await
        })
        .await
    }

    async fn get(&self, path: &str) -> Result<Value, BrowserError> {
        self.ensure_open()?;
        let request = self.client.get(format!("{}{}", self.base, path));
        within(self.request_timeout, &format!("GET {path}"), async {
            unwrap_value(request.send().await?).await
        })
        .await
    }

    async fn script(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        let body = match (locator, locator.to_xpath()) {
            (_, Some(xpath)) => json!({ "using": "xpath", "value": xpath }),
            (Locator::Css(css), None) => json!({ "using": "css selector", "value": css }),
            (other, None) => {
                return Err(BrowserError::Malformed(format!("no query for {other}")));
            }
        };
        let found = self.post("/elements", body).await?;
        let elements = found
            .as_array()
            .ok_or_else(|| BrowserError::Malformed("find elements returned a non-array".into()))?;
        Ok(elements
            .iter()
            .filter_map(|e| e[ELEMENT_KEY].as_str().map(str::to_string))
            .collect())
    }

    async fn displayed(&self, element: &str) -> Result<bool, BrowserError> {
        match self.get(&format!("/element/{element}/displayed")).await {
            Ok(v) => Ok(v.as_bool().unwrap_or(false)),
            // The element went away between lookup and check.
            Err(BrowserError::Protocol { error, .. }) if error == "stale element reference" => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn first_visible(&self, locator: &Locator) -> Result<Option<String>, BrowserError> {
        for element in self.find_all(locator).await? {
            if self.displayed(&element).await? {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    async fn visible_element(&self, locator: &Locator) -> Result<String, BrowserError> {
        let deadline = Instant::now() + self.action_timeout;
        loop {
            if let Some(element) = self.first_visible(locator).await? {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: locator.to_string(),
                    timeout: self.action_timeout,
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn ready_state(&self) -> Result<(String, bool), BrowserError> {
        let v = self
            .script(
                "return [document.readyState, window.jQuery ? window.jQuery.active === 0 : true];",
                vec![],
            )
            .await?;
        let state = v[0].as_str().unwrap_or_default().to_string();
        let quiet = v[1].as_bool().unwrap_or(true);
        Ok((state, quiet))
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&self, url: &str, limit: Duration) -> Result<(), BrowserError> {
        debug!(url, "navigating");
        timeout(limit, self.post("/url", json!({ "url": url })))
            .await
            .map_err(|_| BrowserError::Timeout {
                what: format!("navigation to {url}"),
                timeout: limit,
            })?
            .map(|_| ())
    }

    async fn wait_for_load(&self, state: LoadState, limit: Duration) -> Result<(), BrowserError> {
        let settled = |ready: &str, quiet: bool| match state {
            LoadState::DomContentLoaded => ready == "interactive" || ready == "complete",
            LoadState::Load => ready == "complete",
            LoadState::NetworkIdle => ready == "complete" && quiet,
        };
        let settled = &settled;
        poll(&format!("{state:?}"), limit, move || async move {
            let (ready, quiet) = self.ready_state().await?;
            if !settled(&ready, quiet) {
                return Ok(false);
            }
            if state != LoadState::NetworkIdle {
                return Ok(true);
            }
            sleep(IDLE_QUIET).await;
            let (ready, quiet) = self.ready_state().await?;
            Ok::<bool, BrowserError>(settled(&ready, quiet))
        })
        .await
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        state: ElementState,
        limit: Duration,
    ) -> Result<(), BrowserError> {
        poll(&format!("{locator} to be {state:?}"), limit, move || async move {
            let visible = self.first_visible(locator).await?.is_some();
            Ok::<bool, BrowserError>(match state {
                ElementState::Visible => visible,
                ElementState::Hidden => !visible,
            })
        })
        .await
    }

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
        let element = self.visible_element(locator).await?;
        debug!(%locator, "click");
        self.post(&format!("/element/{element}/click"), json!({}))
            .await
            .map(|_| ())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError> {
        let element = self.visible_element(locator).await?;
        self.post(&format!("/element/{element}/clear"), json!({}))
            .await?;
        self.post(&format!("/element/{element}/value"), json!({ "text": value }))
            .await
            .map(|_| ())
    }

    async fn select(&self, locator: &Locator, choice: &Choice) -> Result<String, BrowserError> {
        let element = self.visible_element(locator).await?;
        let (by_label, wanted) = match choice {
            Choice::Label(label) => (true, json!(label)),
            Choice::Index(i) => (false, json!(i)),
        };
        let picked = self
            .script(
                "const [s, byLabel, wanted] = arguments;\
                 const i = byLabel\
                   ? Array.from(s.options).findIndex(o => o.text.trim() === wanted || o.value === wanted)\
                   : wanted;\
                 if (i < 0 || i >= s.options.length) { return null; }\
                 s.selectedIndex = i;\
                 s.dispatchEvent(new Event('input', { bubbles: true }));\
                 s.dispatchEvent(new Event('change', { bubbles: true }));\
                 return s.options[i].text.trim();",
                vec![element_ref(&element), json!(by_label), wanted],
            )
            .await?;
        picked
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Malformed(format!("{locator} has no option {choice:?}")))
    }

    async fn count(&self, locator: &Locator) -> Result<usize, BrowserError> {
        Ok(self.find_all(locator).await?.len())
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, BrowserError> {
        Ok(self.first_visible(locator).await?.is_some())
    }

    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        let mut out = Vec::new();
        for element in self.find_all(locator).await? {
            let text = self.get(&format!("/element/{element}/text")).await?;
            out.push(text.as_str().unwrap_or_default().trim().to_string());
        }
        Ok(out)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(session = %self.base, "closing browser session");
        let request = self.client.delete(&self.base);
        within(self.request_timeout, "DELETE session", async {
            unwrap_value(request.send().await?).await
        })
        .await
        .map(|_| ())
    }
}

impl Drop for WebDriverPage {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!(session = %self.base, "browser session dropped without close; deleting");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = self.client.clone();
            let base = self.base.clone();
            let limit = self.request_timeout;
            handle.spawn(async move {
                if let Err(e) = client.delete(&base).timeout(limit).send().await {
                    warn!(session = %base, error = %e, "failed to delete dropped session");
                }
            });
        }
    }
}

fn element_ref(element: &str) -> Value {
    let mut reference = serde_json::Map::new();
    reference.insert(ELEMENT_KEY.to_string(), json!(element));
    Value::Object(reference)
}

/// Give up on a driver round trip that has not answered within `limit`.
async fn within<F>(limit: Duration, what: &str, call: F) -> Result<Value, BrowserError>
where
    F: Future<Output = Result<Value, BrowserError>>,
{
    timeout(limit, call)
        .await
        .map_err(|_| BrowserError::Timeout {
            what: format!("webdriver {what}"),
            timeout: limit,
        })?
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Re-run `check` every [`POLL_INTERVAL`] until it yields `true` or `limit` passes.
async fn poll<F, Fut>(what: &str, limit: Duration, mut check: F) -> Result<(), BrowserError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, BrowserError>>,
{
    let deadline = Instant::now() + limit;
    loop {
        if check().await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(BrowserError::Timeout {
                what: what.to_string(),
                timeout: limit,
            });
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Unwrap the `{"value": ...}` envelope, turning WebDriver error payloads into
/// [`BrowserError::Protocol`].
async fn unwrap_value(resp: reqwest::Response) -> Result<Value, BrowserError> {
    let status = resp.status();
    let mut body: Value = resp.json().await?;
    let value = body["value"].take();
    if !status.is_success() {
        return Err(BrowserError::Protocol {
            error: value["error"].as_str().unwrap_or("unknown error").to_string(),
            message: value["message"].as_str().unwrap_or_default().to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    /// Read one HTTP request, headers and body.
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// A driver that creates a session and then never answers again.
    async fn stalled_driver() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut answered = false;
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                if answered {
                    tokio::spawn(async move {
                        let _held = socket;
                        std::future::pending::<()>().await;
                    });
                    continue;
                }
                answered = true;
                let body = r#"{"value":{"sessionId":"s1","capabilities":{}}}"#;
                let resp = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(resp.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let browser = WebDriverBrowser::new(stalled_driver().await, LaunchOptions::default())
            .with_action_timeout(Duration::from_millis(200))
            .with_page_load_timeout(Duration::from_millis(200));
        let page = browser.launch().await.unwrap();

        let started = Instant::now();
        let err = page.click(&Locator::css("#go")).await.unwrap_err();
        assert!(err.is_timeout(), "{err}");
        assert!(started.elapsed() < Duration::from_secs(5));

        let err = page.texts(&Locator::css("td")).await.unwrap_err();
        assert!(err.to_string().contains("webdriver POST /elements"));
    }

    #[test]
    fn capabilities_carry_driver_timeouts() {
        let caps = WebDriverBrowser::new("http://wd".into(), LaunchOptions::default())
            .with_action_timeout(Duration::from_secs(30))
            .with_page_load_timeout(Duration::from_secs(60))
            .capabilities();
        let timeouts = &caps["capabilities"]["alwaysMatch"]["timeouts"];
        assert_eq!(timeouts["pageLoad"], 60_000);
        assert_eq!(timeouts["script"], 30_000);
        assert_eq!(timeouts["implicit"], 0);
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let browser = WebDriverBrowser::new("http://localhost:9515/".into(), LaunchOptions::default());
        assert_eq!(browser.endpoint, "http://localhost:9515");
    }

    #[test]
    fn capabilities_accept_dialogs_and_disable_autofill() {
        let browser = WebDriverBrowser::new("http://localhost:9515".into(), LaunchOptions::default());
        let caps = browser.capabilities();
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["unhandledPromptBehavior"], "accept");
        assert_eq!(
            always["goog:chromeOptions"]["prefs"]["autofill.profile_enabled"],
            false
        );
        let args = always["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(!args.iter().any(|a| a == "--headless=new"));
    }

    #[test]
    fn headless_adds_flag() {
        let options = LaunchOptions {
            headless: true,
            disable_autofill: false,
            accept_dialogs: false,
        };
        let caps = WebDriverBrowser::new("http://wd".into(), options).capabilities();
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["unhandledPromptBehavior"], "dismiss and notify");
        assert!(always["goog:chromeOptions"]["prefs"].is_null());
        let args = always["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
    }

    #[tokio::test]
    async fn poll_times_out() {
        let err = poll("never", Duration::from_millis(10), || async {
            Ok::<bool, BrowserError>(false)
        })
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn poll_returns_once_true() {
        let mut calls = 0;
        poll("soon", Duration::from_secs(5), || {
            calls += 1;
            let done = calls >= 2;
            async move { Ok::<bool, BrowserError>(done) }
        })
        .await
        .unwrap();
        assert_eq!(calls, 2);
    }
}
