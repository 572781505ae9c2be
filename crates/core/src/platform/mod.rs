//! Capability boundary towards external delivery platforms.
//!
//! The rest of the core only ever talks to a platform through [`PlatformClient`].
//! Concrete clients live in `memory` (deterministic, scriptable) and in the
//! `quickpick-platforms` crate (HTTP storefronts).

pub mod memory;
pub mod session;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::catalog::{DeliveryTerms, Item, PlatformId, ProductCandidate};
use crate::domain::order::{OrderConfirmation, OrderLine, PlatformOrderStatus};
use crate::errors::ApplicationError;

pub use memory::{InMemoryPlatformClient, ScriptedPlacement};
pub use session::{SessionGuard, SessionTracker};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform `{platform}` unavailable: {reason}")]
    Unavailable { platform: PlatformId, reason: String },
    #[error("order placement on `{platform}` failed (retryable: {retryable}): {reason}")]
    OrderPlacementFailed { platform: PlatformId, retryable: bool, reason: String },
    #[error("platform `{platform}` has no order `{order_id}`")]
    OrderNotFound { platform: PlatformId, order_id: String },
}

impl PlatformError {
    pub fn platform(&self) -> &PlatformId {
        match self {
            Self::Unavailable { platform, .. }
            | Self::OrderPlacementFailed { platform, .. }
            | Self::OrderNotFound { platform, .. } => platform,
        }
    }

    /// Only placement failures flagged transient are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OrderPlacementFailed { retryable: true, .. })
    }
}

/// One delivery platform. Every call opens its own session and closes it on every
/// exit path, including cancellation of the returned future.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn id(&self) -> &PlatformId;

    fn delivery_terms(&self) -> DeliveryTerms;

    /// Candidates for one item. No match is an empty vector, not an error.
    async fn search(&self, item: &Item) -> Result<Vec<ProductCandidate>, PlatformError>;

    async fn place_order(
        &self,
        lines: &[OrderLine],
        user_id: &str,
    ) -> Result<OrderConfirmation, PlatformError>;

    async fn get_status(&self, platform_order_id: &str)
        -> Result<PlatformOrderStatus, PlatformError>;
}

/// Configured platforms in configuration order.
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    clients: Vec<Arc<dyn PlatformClient>>,
}

impl PlatformRegistry {
    pub fn new(clients: Vec<Arc<dyn PlatformClient>>) -> Result<Self, ApplicationError> {
        let mut seen = HashSet::new();
        for client in &clients {
            if !seen.insert(client.id().clone()) {
                return Err(ApplicationError::Configuration(format!(
                    "platform `{}` registered more than once",
                    client.id()
                )));
            }
        }
        Ok(Self { clients })
    }

    pub fn get(&self, platform: &PlatformId) -> Option<Arc<dyn PlatformClient>> {
        self.clients.iter().find(|client| client.id() == platform).cloned()
    }

    pub fn clients(&self) -> &[Arc<dyn PlatformClient>] {
        &self.clients
    }

    pub fn ids(&self) -> Vec<PlatformId> {
        self.clients.iter().map(|client| client.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformRegistry").field("platforms", &self.ids()).finish()
    }
}
