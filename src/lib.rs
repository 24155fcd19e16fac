/// Copymint - AI marketing copy backend
///
/// Backend service for a mobile copywriting assistant: quota-metered
/// AI content generation with provider failover, scenario catalogs,
/// order and payment handling, and layered content safety checks.

pub mod account;
pub mod analytics;
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod content;
pub mod context;
pub mod db;
pub mod error;
pub mod feedback;
pub mod jobs;
pub mod metrics;
pub mod moderation;
pub mod orders;
pub mod payment;
pub mod providers;
pub mod quota;
pub mod rate_limit;
pub mod scenario;
pub mod server;
