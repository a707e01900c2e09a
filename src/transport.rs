// Remote endpoint table and the HTTP seam the session talks through.
// The trait exists so session logic can be exercised against a canned
// transport in tests; only `HttpTransport` ever touches the network.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::Url;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
}

/// The site's endpoints, relative to the public base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerCall {
    Login,
    Index,
    EventSave,
    EventCancel,
    FetchEvents,
    EventInfo,
}

impl ServerCall {
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "login.php",
            Self::Index => "index.php",
            Self::EventSave => "async-event-save.php",
            Self::EventCancel => "async-event-cancel.php",
            Self::FetchEvents => "async_fetchevents.php",
            Self::EventInfo => "async-eventinfo.php",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://esmuc.asimut.net/public/".to_string(),
        }
    }
}

/// One request/response exchange per call, body returned as text. No retries
/// and no timeout policy; a stalled call blocks until the transport gives up.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, call: ServerCall, query: &[(&str, &str)])
        -> Result<String, TransportError>;

    async fn post_form(
        &self,
        call: ServerCall,
        form: &[(&str, &str)],
    ) -> Result<String, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TransportError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;

        // The site's own scripts set this viewport cookie before login; seed it
        // so the very first request already carries it.
        let jar = Arc::new(Jar::default());
        jar.add_cookie_str("asimut-width=640", &base_url);

        let client = reqwest::Client::builder().cookie_provider(jar).build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, call: ServerCall) -> Result<Url, TransportError> {
        self.base_url
            .join(call.path())
            .map_err(|e| TransportError::InvalidBaseUrl(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        call: ServerCall,
        query: &[(&str, &str)],
    ) -> Result<String, TransportError> {
        let response = self
            .client
            .get(self.endpoint(call)?)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn post_form(
        &self,
        call: ServerCall,
        form: &[(&str, &str)],
    ) -> Result<String, TransportError> {
        let response = self
            .client
            .post(self.endpoint(call)?)
            .form(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}
