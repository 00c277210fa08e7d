//! W3C WebDriver client (chromedriver) implementing [`PageDriver`].
//!
//! Each launch creates a new WebDriver session with Chrome options derived
//! from [`LaunchOptions`]; `close` deletes it. Element waits poll
//! find-element until the deadline.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info};

use super::{DriverLauncher, ElementRef, LaunchOptions, Locator, PageDriver};
use crate::error::DriverError;

/// Key under which W3C WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Delay between find-element attempts while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on any single WebDriver HTTP round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Launcher
// ---------------------------------------------------------------------------

/// Creates browser sessions on a running chromedriver.
pub struct WebDriverLauncher {
    client: Client,
    base_url: String,
}

impl WebDriverLauncher {
    pub fn new(base_url: &str) -> Result<Self, DriverError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DriverLauncher for WebDriverLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn PageDriver>, DriverError> {
        let url = format!("{}/session", self.base_url);
        let value = send(self.client.post(&url).json(&new_session_body(options)))
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Launch("new session response has no sessionId".into()))?;

        info!(session_id, headless = options.headless, "webdriver session created");

        Ok(Box::new(WebDriverPage {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.base_url, session_id),
        }))
    }
}

/// Body of the W3C "New Session" command.
fn new_session_body(options: &LaunchOptions) -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": {
                    "args": options.chrome_args(),
                    "excludeSwitches": ["enable-automation"],
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// One WebDriver session, i.e. one browser context.
pub struct WebDriverPage {
    client: Client,
    session_url: String,
}

impl WebDriverPage {
    async fn get(&self, path: &str) -> Result<Value, DriverError> {
        send(self.client.get(format!("{}{}", self.session_url, path))).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, DriverError> {
        send(
            self.client
                .post(format!("{}{}", self.session_url, path))
                .json(&body),
        )
        .await
    }

    fn on_element(
        &self,
        element: &ElementRef,
        result: Result<Value, DriverError>,
    ) -> Result<Value, DriverError> {
        result.map_err(|e| match e {
            DriverError::Protocol { ref error, .. } if error == "stale element reference" => {
                DriverError::StaleElement(element.id().to_string())
            }
            other => other,
        })
    }
}

#[async_trait]
impl PageDriver for WebDriverPage {
    async fn open(&self, url: &str) -> Result<(), DriverError> {
        debug!(url, "navigating");
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementRef, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.find_optional(locator).await? {
                return Ok(element);
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(DriverError::Timeout {
                    locator: locator.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn find_optional(&self, locator: &Locator) -> Result<Option<ElementRef>, DriverError> {
        let body = json!({ "using": locator.strategy(), "value": locator.value() });
        match self.post("/element", body).await {
            Ok(value) => element_from(&value).map(Some),
            Err(DriverError::Protocol { error, .. }) if error == "no such element" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, DriverError> {
        let body = json!({ "using": locator.strategy(), "value": locator.value() });
        let value = self.post("/elements", body).await?;
        value
            .as_array()
            .map(|items| items.iter().map(element_from).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        let path = format!("/element/{}/value", element.id());
        let result = self.post(&path, json!({ "text": text })).await;
        self.on_element(element, result)?;
        Ok(())
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError> {
        let path = format!("/element/{}/click", element.id());
        let result = self.post(&path, json!({})).await;
        self.on_element(element, result)?;
        Ok(())
    }

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let path = format!("/element/{}/attribute/{}", element.id(), name);
        let result = self.get(&path).await;
        let value = self.on_element(element, result)?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn text(&self, element: &ElementRef) -> Result<String, DriverError> {
        let path = format!("/element/{}/text", element.id());
        let result = self.get(&path).await;
        let value = self.on_element(element, result)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), DriverError> {
        self.post("/window/rect", json!({ "width": width, "height": height }))
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        send(self.client.delete(&self.session_url)).await?;
        debug!(session_url = %self.session_url, "webdriver session deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// Send a command and unwrap the `value` member of the response.
async fn send(request: RequestBuilder) -> Result<Value, DriverError> {
    let response = request
        .send()
        .await
        .map_err(|e| DriverError::Transport(e.to_string()))?;
    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| DriverError::Transport(e.to_string()))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        Ok(value)
    } else {
        Err(failure_from(&value))
    }
}

fn failure_from(value: &Value) -> DriverError {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let error = field("error");
    DriverError::Protocol {
        error: if error.is_empty() {
            "unknown error".to_string()
        } else {
            error
        },
        message: field("message"),
    }
}

fn element_from(value: &Value) -> Result<ElementRef, DriverError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(ElementRef::new)
        .ok_or_else(|| DriverError::Protocol {
            error: "invalid response".to_string(),
            message: format!("expected element reference, got {value}"),
        })
}
