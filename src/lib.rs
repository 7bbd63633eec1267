//! LaaS Delivery Dispatch Library
//!
//! Turns rows of an order sheet into confirmed deliveries on the LaaS
//! logistics API. Clients are scheduled by delivery frequency; scheduled rows
//! are quoted, each quote is paired back with its client, and orders are
//! placed against the quotes.
//!
//! # Modules
//!
//! - `batch`: Rate-limited sequential submission.
//! - `cache_validator`: Checksum envelope for persisted values.
//! - `config`: Configuration management.
//! - `correlator`: Quote to client correlation.
//! - `eligibility`: Weekday/frequency schedule.
//! - `errors`: Error handling types.
//! - `laas_models`: LaaS API request and response bodies.
//! - `logistics_client`: LaaS quote and order client.
//! - `models`: Core data models and run summary.
//! - `order_submitter`: Order payloads, pickup codes and submission.
//! - `pipeline`: Run orchestration.
//! - `quote_builder`: Record validation and quote payloads.
//! - `record_source`: Order row sources.
//! - `result_sink`: Order log sinks.
//! - `token_cache`: Bearer credential cache.

pub mod batch;
pub mod cache_validator;
pub mod config;
pub mod correlator;
pub mod eligibility;
pub mod errors;
pub mod laas_models;
pub mod logistics_client;
pub mod models;
pub mod order_submitter;
pub mod pipeline;
pub mod quote_builder;
pub mod record_source;
pub mod result_sink;
pub mod token_cache;
