use std::fmt;

use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde::Serialize;
use tracing::{debug, field, instrument, trace, Span};
use url::Url;
use uuid::Uuid;

use crate::{config::PortalConfig, error::CardError, http_tools::RequestErrors};

/// The two servlets the portal exposes under its base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Session,
    Commerce,
}

impl Service {
    pub fn path(&self) -> &'static str {
        match self {
            Service::Session => "SesionPortalServlet",
            Service::Commerce => "ComercialesPortalServlet",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Hands out portal sessions. Every call must return an independent session
/// that shares no cookies with any other.
#[allow(async_fn_in_trait)]
pub trait Portal {
    type Session: PortalSession;

    async fn create_session(&self) -> Result<Self::Session, CardError>;
}

#[allow(async_fn_in_trait)]
pub trait PortalSession {
    /// GETs `service` with `params` as the query string and returns the raw
    /// page. Never retries.
    async fn query<P: Serialize + ?Sized>(
        &self,
        service: Service,
        params: &P,
    ) -> Result<String, CardError>;
}

#[derive(Debug, Clone)]
pub struct HttpPortal {
    config: PortalConfig,
}

/// One cookie jar, primed against the portal root.
#[derive(Debug)]
pub struct HttpSession {
    id: Uuid,
    http: Client,
    base_url: Url,
}

impl HttpPortal {
    pub fn new(config: PortalConfig) -> Self {
        HttpPortal { config }
    }
}

impl Portal for HttpPortal {
    type Session = HttpSession;

    #[instrument("create_session", skip_all, fields(session_id))]
    async fn create_session(&self) -> Result<HttpSession, CardError> {
        let id = Uuid::new_v4();
        Span::current().record("session_id", field::display(&id));
        let base_url = self.config.base_url.clone();

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let http = Client::builder()
            .user_agent(&self.config.user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(self.config.timeout())
            .build()
            .map_err(|e| CardError::upstream(&base_url, e))?;

        // The portal hands out its session cookie on the landing page and
        // ignores servlet calls that arrive without it.
        debug!(url = %base_url, "Priming session");
        let resp = http
            .get(base_url.clone())
            .send()
            .await
            .map_err(|e| CardError::upstream(&base_url, e))?;
        trace!(status = ?resp.status(), "Primed");

        Ok(HttpSession { id, http, base_url })
    }
}

impl HttpSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    fn service_url(&self, service: Service) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            service.path()
        )
    }
}

impl PortalSession for HttpSession {
    #[instrument("query", skip_all, fields(session_id = %self.id, %service))]
    async fn query<P: Serialize + ?Sized>(
        &self,
        service: Service,
        params: &P,
    ) -> Result<String, CardError> {
        let url = self.service_url(service);
        debug!(%url, "GET");

        let body = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| CardError::upstream(service, e))?
            .check_status(service.path())
            .await?
            .text()
            .await
            .map_err(|e| CardError::upstream(service, e))?;

        debug!(size = body.len(), "Received page");
        Ok(body)
    }
}
