//! hivekeeper-state: embedded state store for hivekeeper.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state management for areas, hives, rules, nodes, actuator records and
//! sensor measurements.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Hive-owned tables use numeric keys; measurements use the composite key
//! `{node_id}/{kind}/{timestamp}` so the latest reading of a kind is the
//! last entry of a range scan.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. The scheduler and dispatcher only
//! see it through the [`HiveRepository`] trait.

pub mod error;
pub mod repository;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use repository::HiveRepository;
pub use store::StateStore;
pub use types::*;
