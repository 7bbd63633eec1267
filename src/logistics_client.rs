use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::errors::{truncate, PipelineError, MAX_ERROR_BODY_CHARS};
use crate::laas_models::{OrderPayload, OrderResponse, QuotePayload, QuoteResponse};
use crate::token_cache::{redact_secrets, Credential};

/// Builds the HTTP client shared by the credential cache and the API client.
///
/// Every request is bounded by `timeout`; a timeout surfaces as a transport
/// error like any other network failure.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("laas-dispatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PipelineError::Transport(format!("failed to create HTTP client: {}", e)))
}

/// Client for the quote and order endpoints of the logistics API.
#[derive(Clone)]
pub struct LaasClient {
    client: reqwest::Client,
    base_url: Url,
}

impl LaasClient {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Requests a quote for one delivery.
    ///
    /// A success response without a `quoteId` is treated as a rejection, since
    /// nothing downstream can use it.
    pub async fn create_quote(
        &self,
        credential: &Credential,
        payload: &QuotePayload,
    ) -> Result<QuoteResponse, PipelineError> {
        let url = self.endpoint(&["v2", "laas", "quotes"])?;
        tracing::debug!(
            client_id = %payload.origin.client_id,
            pickup_time = %payload.pickup_details.pickup_time,
            "Requesting quote"
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(credential.bearer())
            .json(payload)
            .send()
            .await?;

        self.read_json(response, credential).await
    }

    /// Places an order against a previously issued quote.
    pub async fn create_order(
        &self,
        credential: &Credential,
        quote_id: &str,
        payload: &OrderPayload,
    ) -> Result<OrderResponse, PipelineError> {
        let url = self.endpoint(&["v2", "laas", "quotes", quote_id, "parcels"])?;
        tracing::debug!(
            quote_id,
            pickup_order_code = %payload.pickup_order_code,
            "Placing order"
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(credential.bearer())
            .json(payload)
            .send()
            .await?;

        self.read_json(response, credential).await
    }

    /// Appends path segments to the base URL. Segments are percent-encoded,
    /// so a quote id can never escape its position in the path.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, PipelineError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PipelineError::Transport(format!("base URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: Response,
        credential: &Credential,
    ) -> Result<T, PipelineError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!("LaaS API returned {}", status);
            return Err(rejection(status, &body, credential));
        }

        serde_json::from_str(&body).map_err(|e| PipelineError::ApiRejection {
            status: status.as_u16(),
            message: format!("malformed response: {}", e),
        })
    }
}

fn rejection(status: StatusCode, body: &str, credential: &Credential) -> PipelineError {
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        redact_secrets(body.trim(), &[credential.bearer()])
    };
    PipelineError::ApiRejection {
        status: status.as_u16(),
        message: truncate(&message, MAX_ERROR_BODY_CHARS),
    }
}
