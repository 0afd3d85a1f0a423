use tracing::{debug, error, trace};

use crate::error::CardError;

pub(crate) trait RequestErrors: Sized {
    async fn check_status(self, endpoint: &str) -> Result<Self, CardError>;
}

impl RequestErrors for reqwest::Response {
    async fn check_status(self, endpoint: &str) -> Result<Self, CardError> {
        let resp = self;
        let failure = resp.error_for_status_ref().err();
        if let Some(error) = failure {
            error!(%error, status = ?resp.status(), endpoint, "Failed response");
            if let Ok(body) = resp.text().await {
                debug!(?body, "Response body");
            }
            return Err(CardError::upstream(endpoint, error));
        }

        trace!(status = ?resp.status(), headers = ?resp.headers());
        Ok(resp)
    }
}
