//! # qos-gateway
//!
//! Lifecycle core of the QR Ordering SaaS platform: restaurants buy a
//! service plan, pay through PayOS, and get a provisioned instance
//! (database, frontend, backend) whose health is monitored.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)            PayOS (webhooks)
//!     │                          │
//!     ├── REST Handlers (api/) ──┘
//!     │
//!     ├── Services (service/)
//!     │     subscriptions · payments · instances · health · reconciler
//!     ├── EventBus (domain/) ──► audit log task
//!     │
//!     ├── LifecycleStore (persistence/)
//!     │     in-memory │ PostgreSQL
//!     └── PaymentGateway (payment/) ──► PayOS API
//! ```
//!
//! Status changes are compare-and-swap writes against the store, so
//! duplicate webhooks and concurrent admin actions cannot skip states or
//! create a second instance for a subscription.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod payment;
pub mod persistence;
pub mod service;
