//! SCDB: an embedded, single-process relational storage engine exposed as
//! a single-file container with secondary indexes, crash-safe durability
//! via write-ahead logging, and a compiled-plan query executor contract.
//! SQL text parsing, DDL surfaces, and cross-process networking are
//! explicitly out of scope; this crate is consumed by a layer that
//! produces plans, not by callers who hand it query strings.

pub mod catalog;
pub mod collation;
pub mod common;
pub mod config;
pub mod container;
pub mod database;
pub mod error;
pub mod executor;
pub mod index;
pub mod maintenance;
pub mod platform;
pub mod storage;
pub mod transaction;
pub mod wal;

pub use common::Value;
pub use config::EngineConfig;
pub use database::Database;
pub use error::{DbError, Result};
