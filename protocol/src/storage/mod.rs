//! # Storage Module
//!
//! Durable storage for Waypoint, on sled.
//!
//! A device persists exactly one record: its
//! [`BridgedIdentity`](crate::session::BridgedIdentity). The backend persists its user
//! registry. Both live in a [`WaypointDb`]; see `db.rs` for the tree layout.

pub mod db;

pub use db::{DbError, DbResult, UserRecord, WaypointDb};
