pub mod aggregator;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod optimizer;
pub mod orchestrator;
pub mod platform;

pub use aggregator::CatalogAggregator;
pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, PlatformDriver};
pub use domain::catalog::{DeliveryTerms, Item, PlatformId, ProductCandidate};
pub use domain::order::{Order, OrderId, OrderLine, OrderStatus};
pub use domain::preference::{DeliveryPriority, PreferencePolicy};
pub use domain::quote::{PlatformQuote, PlatformQuotes, QuoteIssue};
pub use domain::recommendation::{PlatformBreakdown, Recommendation};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use optimizer::DealOptimizer;
pub use orchestrator::{
    ApprovalOutcome, CompareOutcome, CompareRequest, OrderDecision, OrderOrchestrator,
    RetrySettings,
};
pub use platform::{PlatformClient, PlatformError, PlatformRegistry};
