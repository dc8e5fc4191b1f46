//! # sync-server
//!
//! HTTP server exposing delta-synced REST collections.
//!
//! This crate wires the sync pipeline from `sync-core` to a real store
//! and a real router:
//! - SQLite storage for the `notes` resource (sqlx, WAL mode)
//! - axum endpoints for index/show/create/update/destroy
//! - TOML configuration for the bind address, database, token codec and
//!   view allow-lists
//!
//! ## Architecture
//!
//! ```text
//! client ── GET /notes?s=<token>&start=..&length=.. ──┐
//!                                                     │
//!        ┌────────────────────────────────────────────┴───┐
//!        │  http (axum)  →  Composer  →  ResponseStrategy │
//!        │                     │                          │
//!        │              SqliteStorage (Collection)        │
//!        └────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod http;
pub mod notes;
pub mod server;
pub mod storage;
