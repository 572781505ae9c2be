//! Delivery platform clients for QuickPick.
//!
//! One [`Storefront`] per supported site, a shared HTTP [`StorefrontClient`],
//! a seeded simulated catalog and registry construction from [`AppConfig`].
//!
//! [`AppConfig`]: quickpick_core::config::AppConfig

pub mod bigbasket;
pub mod blinkit;
pub mod client;
pub mod instamart;
pub mod registry;
pub mod simulated;
pub mod storefront;
pub mod zepto;

pub use bigbasket::BigBasket;
pub use blinkit::Blinkit;
pub use client::StorefrontClient;
pub use instamart::SwiggyInstamart;
pub use registry::{build_registry, SUPPORTED_PLATFORMS};
pub use simulated::simulated_client;
pub use storefront::{Storefront, StorefrontError};
pub use zepto::Zepto;
