use async_trait::async_trait;
use chrono::Utc;
use quickpick_core::config::PlatformEndpoint;
use quickpick_core::domain::catalog::{DeliveryTerms, Item, PlatformId, ProductCandidate};
use quickpick_core::domain::order::{OrderConfirmation, OrderLine, PlatformOrderStatus};
use quickpick_core::platform::{PlatformClient, PlatformError, SessionTracker};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::storefront::{Storefront, StorefrontError};

const BODY_SNIPPET_CHARS: usize = 200;

/// [`PlatformClient`] over HTTP for any [`Storefront`].
pub struct StorefrontClient<S> {
    id: PlatformId,
    storefront: S,
    http: reqwest::Client,
    base_url: String,
    terms: DeliveryTerms,
    api_token: Option<SecretString>,
    sessions: SessionTracker,
}

impl<S: Storefront> StorefrontClient<S> {
    pub fn new(
        id: PlatformId,
        storefront: S,
        endpoint: &PlatformEndpoint,
        http: reqwest::Client,
    ) -> Self {
        Self {
            sessions: SessionTracker::new(id.clone()),
            id,
            storefront,
            http,
            base_url: endpoint.base_url.trim().to_owned(),
            terms: endpoint.delivery_terms(),
            api_token: endpoint.api_token.clone(),
        }
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> PlatformError {
        PlatformError::Unavailable { platform: self.id.clone(), reason: reason.into() }
    }

    fn storefront_error(&self, error: StorefrontError) -> PlatformError {
        self.unavailable(error.to_string())
    }

    fn placement_failed(&self, retryable: bool, reason: impl Into<String>) -> PlatformError {
        PlatformError::OrderPlacementFailed {
            platform: self.id.clone(),
            retryable,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl<S: Storefront> PlatformClient for StorefrontClient<S> {
    fn id(&self) -> &PlatformId {
        &self.id
    }

    fn delivery_terms(&self) -> DeliveryTerms {
        self.terms
    }

    async fn search(&self, item: &Item) -> Result<Vec<ProductCandidate>, PlatformError> {
        let _session = self.sessions.open("search");
        let url = self
            .storefront
            .search_url(&self.base_url, &item.name)
            .map_err(|error| self.storefront_error(error))?;

        let response = self
            .authorize(self.http.get(url.clone()))
            .send()
            .await
            .map_err(|error| self.unavailable(transport_reason(&error)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(self.unavailable(format!("search endpoint returned status {status}")));
        }

        let body = read_body(response).await.map_err(|error| self.unavailable(error))?;
        let candidates = self
            .storefront
            .parse_search(&self.id, &body)
            .map_err(|error| self.storefront_error(error))?;

        debug!(
            event_name = "platform.search_completed",
            platform = %self.id,
            item = %item,
            url = %url,
            candidates = candidates.len(),
            "storefront search completed"
        );
        Ok(candidates)
    }

    async fn place_order(
        &self,
        lines: &[OrderLine],
        user_id: &str,
    ) -> Result<OrderConfirmation, PlatformError> {
        let _session = self.sessions.open("place_order");
        let url = self
            .storefront
            .order_url(&self.base_url)
            .map_err(|error| self.placement_failed(false, error.to_string()))?;
        let request = self.storefront.order_request(lines, user_id);

        let response = self
            .authorize(self.http.post(url).json(&request))
            .send()
            .await
            .map_err(|error| {
                let retryable = error.is_timeout() || error.is_connect();
                self.placement_failed(retryable, transport_reason(&error))
            })?;

        let status = response.status();
        let body = read_body(response).await.map_err(|error| self.placement_failed(true, error))?;
        if !status.is_success() {
            return Err(self.placement_failed(
                is_transient(status),
                format!("order endpoint returned status {status}: {}", snippet(&body)),
            ));
        }

        let receipt = self
            .storefront
            .parse_receipt(&body)
            .map_err(|error| self.placement_failed(false, error.to_string()))?;
        let estimated_delivery = receipt.estimated_delivery.unwrap_or_else(|| {
            Utc::now() + chrono::Duration::minutes(i64::from(self.terms.eta_minutes))
        });
        let tracking_handle = match receipt.tracking_url {
            Some(url) => url,
            None => self
                .storefront
                .status_url(&self.base_url, &receipt.order_id)
                .map(|url| url.to_string())
                .map_err(|error| self.placement_failed(false, error.to_string()))?,
        };

        Ok(OrderConfirmation {
            platform_order_id: receipt.order_id,
            tracking_handle,
            estimated_delivery,
        })
    }

    async fn get_status(
        &self,
        platform_order_id: &str,
    ) -> Result<PlatformOrderStatus, PlatformError> {
        let _session = self.sessions.open("get_status");
        let url = self
            .storefront
            .status_url(&self.base_url, platform_order_id)
            .map_err(|error| self.storefront_error(error))?;

        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|error| self.unavailable(transport_reason(&error)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PlatformError::OrderNotFound {
                platform: self.id.clone(),
                order_id: platform_order_id.to_owned(),
            });
        }
        if !status.is_success() {
            return Err(self.unavailable(format!("status endpoint returned status {status}")));
        }

        let body = read_body(response).await.map_err(|error| self.unavailable(error))?;
        let report =
            self.storefront.parse_status(&body).map_err(|error| self.storefront_error(error))?;

        Ok(PlatformOrderStatus {
            state: report.state,
            estimated_delivery: report.estimated_delivery,
            delivery_person: report.delivery_person,
        })
    }
}

async fn read_body(response: Response) -> Result<String, String> {
    response.text().await.map_err(|error| format!("could not read response body: {error}"))
}

fn transport_reason(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_owned()
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        format!("request failed: {error}")
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn snippet(body: &str) -> String {
    body.trim().chars().take(BODY_SNIPPET_CHARS).collect()
}
