//! redb table definitions for the hivekeeper state store.
//!
//! Values are JSON-serialized domain types. Hive-owned tables are keyed by
//! the numeric hive id; node-owned tables by the node id string.

use redb::TableDefinition;

/// Areas keyed by name.
pub const AREAS: TableDefinition<&str, &[u8]> = TableDefinition::new("areas");

/// Hives keyed by id. Ids come from the `next_hive_id` counter in [`META`]
/// and are never reused.
pub const HIVES: TableDefinition<u32, &[u8]> = TableDefinition::new("hives");

/// Rules keyed by owning hive id.
pub const RULES: TableDefinition<u32, &[u8]> = TableDefinition::new("rules");

/// Nodes keyed by node id.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Actuator records keyed by node id.
pub const ACTUATORS: TableDefinition<&str, &[u8]> = TableDefinition::new("actuators");

/// Measurements keyed by `{node_id}/{kind}/{timestamp:020}`.
pub const MEASUREMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("measurements");

/// Store-wide counters keyed by name.
pub const META: TableDefinition<&str, u32> = TableDefinition::new("meta");

/// Key of the hive id counter in [`META`].
pub const NEXT_HIVE_ID: &str = "next_hive_id";
