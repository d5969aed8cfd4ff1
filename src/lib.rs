//! Auto-Financing Application API Library
//!
//! This library provides the core functionality for the auto-financing
//! application service: the multi-step application wizard, bank portal,
//! admin lead assignment, document links and submission notifications.
//!
//! # Modules
//!
//! - `applications`: Financing application persistence.
//! - `auth`: Session extraction and role guards.
//! - `bank_handlers`: Bank portal and admin HTTP handlers.
//! - `bank_profiling`: Bank-profiling (recommended bank) storage.
//! - `banks`: Bank portal business logic.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `documents`: Document metadata and signed URLs.
//! - `errors`: Error handling types.
//! - `handlers`: Applicant-facing HTTP handlers and shared state.
//! - `models`: Core data models.
//! - `notifications`: Transactional email client and fanout.
//! - `profiles`: Profile storage and cache.
//! - `status`: Application and assignment status enums.
//! - `tracking`: Best-effort conversion tracking events.
//! - `validation`: Pure per-step form validation.
//! - `vehicles`: Inventory lookups.
//! - `wizard`: The application wizard state machine and controller.

pub mod applications;
pub mod auth;
pub mod bank_handlers;
pub mod bank_profiling;
pub mod banks;
pub mod config;
pub mod db;
pub mod documents;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod notifications;
pub mod profiles;
pub mod status;
pub mod tracking;
pub mod validation;
pub mod vehicles;
pub mod wizard;
