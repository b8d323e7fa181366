// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kirimku Server - Courier Webhook Service
//!
//! Wires webhook ingestion to tenant-aware storage:
//!
//! ```text
//!  POST /webhooks/{carrier}
//!        │
//!        ▼
//!  WebhookDispatcher ──► TenantResolver ──► TrackingSink (run_in_tx)
//!                                                │
//!                                                ▼
//!                                       ConnectionManager
//!                                                ▲
//!  GET /health ◄── HealthChecker ────────────────┘
//! ```

pub mod config;
pub mod http;
pub mod sink;

pub use config::ServerConfig;
pub use http::{AppState, router};
pub use sink::{MemorySink, PgTrackingSink, TrackingSink};
