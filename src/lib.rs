#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # KCT Order Ops
//!
//! Order lifecycle, priority queue scoring, exception tracking and
//! fulfillment analytics for KCT Menswear operations.
//!
//! ## Overview
//!
//! Every order moves through an explicit state machine. Each status change is
//! written together with an append-only history entry; the history is the
//! input to per-order analytics. Orders that have been paid for are scored and
//! placed on a processing queue; anomalies are tracked as exceptions that can
//! halt the order and, for some types, resolve themselves in the background.
//!
//! ## Module Organization
//!
//! - [`models`] - Plain records for every persisted table
//! - [`database`] - Unit-of-work storage (Postgres and in-memory)
//! - [`state_machine`] - Order and exception lifecycle rules
//! - [`orchestration`] - Scoring, queue, exceptions, rules and the coordinator
//! - [`analytics`] - Per-order metrics and dashboard rollups
//! - [`messaging`] - Durable task queue for auto-resolution
//! - [`events`] - Post-commit customer notifications
//! - [`web`] - Axum HTTP surface
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use order_ops::config::OrderOpsConfig;
//! use order_ops::database::InMemoryStore;
//! use order_ops::models::NewOrder;
//! use order_ops::orchestration::OrderOpsSystem;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let system = OrderOpsSystem::new(OrderOpsConfig::default(), InMemoryStore::new());
//! let order = system
//!     .coordinator()
//!     .create_order(NewOrder {
//!         customer_id: "cust_42".to_string(),
//!         customer_tier: Default::default(),
//!         total_amount: 640.0,
//!         order_type: Default::default(),
//!         rush_order: false,
//!         group_order: false,
//!         party_size: 0,
//!         event_date: None,
//!     })
//!     .await?;
//! println!("created {} in {}", order.id, order.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests (in-memory store)
//! cargo test          # Unit, integration and HTTP tests
//! ```

#[macro_use]
mod macros;

pub mod analytics;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod web;

pub use config::{ConfigManager, OrderOpsConfig};
pub use error::{OrderOpsError, Result};
pub use models::{Order, OrderStatus};
pub use orchestration::{OrderOpsSystem, WorkflowCoordinator};
