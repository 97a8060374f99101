//! StateStore: redb-backed state persistence for hivekeeper.
//!
//! Provides typed CRUD operations over areas, hives, rules, nodes,
//! actuator records and measurements. All values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).
//!
//! Cascading deletes (area → hives → rule + node links, node →
//! measurements + actuator record) run inside a single write transaction.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Half-open key range covering every measurement of `node_id`, optionally
/// narrowed to one kind. `'0'` is the byte right after `'/'`.
fn measurement_range(node_id: &str, kind: Option<MeasurementKind>) -> (String, String) {
    let prefix = match kind {
        Some(kind) => format!("{node_id}/{}", kind.as_str()),
        None => node_id.to_string(),
    };
    (format!("{prefix}/"), format!("{prefix}0"))
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(AREAS).map_err(map_err!(Table))?;
        txn.open_table(HIVES).map_err(map_err!(Table))?;
        txn.open_table(RULES).map_err(map_err!(Table))?;
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(ACTUATORS).map_err(map_err!(Table))?;
        txn.open_table(MEASUREMENTS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Areas ──────────────────────────────────────────────────────

    /// Insert or update an area.
    pub fn put_area(&self, area: &Area) -> StateResult<()> {
        let value = encode(area)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(AREAS).map_err(map_err!(Table))?;
            table
                .insert(area.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(area = %area.name, "area stored");
        Ok(())
    }

    pub fn get_area(&self, name: &str) -> StateResult<Option<Area>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AREAS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn list_areas(&self) -> StateResult<Vec<Area>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AREAS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// Delete an area together with every hive it owns.
    ///
    /// Returns the ids of the removed hives so the caller can drop their
    /// scheduled events.
    pub fn delete_area(&self, name: &str) -> StateResult<Vec<HiveId>> {
        let owned: Vec<HiveId> = self
            .list_hives()?
            .into_iter()
            .filter(|hive| hive.area == name)
            .map(|hive| hive.id)
            .collect();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        for &hive_id in &owned {
            remove_hive_in(&txn, hive_id)?;
        }
        {
            let mut table = txn.open_table(AREAS).map_err(map_err!(Table))?;
            table.remove(name).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(area = %name, hives = owned.len(), "area deleted");
        Ok(owned)
    }

    // ── Hives ──────────────────────────────────────────────────────

    /// Create a hive in `area`, allocating a fresh id, and persist an inert
    /// rule carrying `polling_interval`. Ids of deleted hives are not reused.
    pub fn create_hive(&self, area: &str, polling_interval: u32) -> StateResult<Hive> {
        if polling_interval == 0 {
            return Err(StateError::Write(format!(
                "area {area}: polling interval must be positive"
            )));
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let hive;
        {
            let areas = txn.open_table(AREAS).map_err(map_err!(Table))?;
            if areas.get(area).map_err(map_err!(Read))?.is_none() {
                return Err(StateError::NotFound(format!("area {area}")));
            }

            let mut hives = txn.open_table(HIVES).map_err(map_err!(Table))?;
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            let counter = meta
                .get(NEXT_HIVE_ID)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(1);
            let after_last = match hives.last().map_err(map_err!(Read))? {
                Some((key, _)) => key.value() + 1,
                None => 1,
            };
            let next_id = counter.max(after_last);
            meta.insert(NEXT_HIVE_ID, next_id + 1).map_err(map_err!(Write))?;
            hive = Hive {
                id: next_id,
                area: area.to_string(),
            };
            hives
                .insert(next_id, encode(&hive)?.as_slice())
                .map_err(map_err!(Write))?;

            let mut rules = txn.open_table(RULES).map_err(map_err!(Table))?;
            let rule = Rule::inert(next_id, polling_interval);
            rules
                .insert(next_id, encode(&rule)?.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(hive_id = hive.id, %area, polling_interval, "hive created");
        Ok(hive)
    }

    pub fn get_hive(&self, hive_id: HiveId) -> StateResult<Option<Hive>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HIVES).map_err(map_err!(Table))?;
        match table.get(hive_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn list_hives(&self) -> StateResult<Vec<Hive>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HIVES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// Delete a hive: unlink its nodes, drop its rule, drop the hive.
    /// Returns true if the hive existed.
    pub fn delete_hive(&self, hive_id: HiveId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed = remove_hive_in(&txn, hive_id)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(hive_id, existed, "hive deleted");
        Ok(existed)
    }

    // ── Rules ──────────────────────────────────────────────────────

    /// Insert or replace the rule of an existing hive.
    pub fn put_rule(&self, rule: &Rule) -> StateResult<()> {
        if rule.polling_interval == 0 {
            return Err(StateError::Write(format!(
                "hive {}: polling interval must be positive",
                rule.hive_id
            )));
        }
        let value = encode(rule)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let hives = txn.open_table(HIVES).map_err(map_err!(Table))?;
            if hives.get(rule.hive_id).map_err(map_err!(Read))?.is_none() {
                return Err(StateError::NotFound(format!("hive {}", rule.hive_id)));
            }
            let mut table = txn.open_table(RULES).map_err(map_err!(Table))?;
            table
                .insert(rule.hive_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(hive_id = rule.hive_id, inert = rule.is_inert(), "rule stored");
        Ok(())
    }

    pub fn get_rule(&self, hive_id: HiveId) -> StateResult<Option<Rule>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RULES).map_err(map_err!(Table))?;
        match table.get(hive_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn list_rules(&self) -> StateResult<Vec<Rule>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RULES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node.
    pub fn put_node(&self, node: &Node) -> StateResult<()> {
        let value = encode(node)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            table
                .insert(node.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node_id = %node.id, kind = ?node.kind, "node stored");
        Ok(())
    }

    pub fn get_node(&self, node_id: &str) -> StateResult<Option<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(node_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn list_nodes(&self) -> StateResult<Vec<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// Nodes linked to `hive_id`.
    pub fn list_nodes_for_hive(&self, hive_id: HiveId) -> StateResult<Vec<Node>> {
        Ok(self
            .list_nodes()?
            .into_iter()
            .filter(|node| node.hive_id == Some(hive_id))
            .collect())
    }

    /// Nodes not linked to any hive.
    pub fn list_unlinked_nodes(&self) -> StateResult<Vec<Node>> {
        Ok(self
            .list_nodes()?
            .into_iter()
            .filter(|node| node.hive_id.is_none())
            .collect())
    }

    /// Attach a node to a hive. Both must exist.
    pub fn link_node(&self, node_id: &str, hive_id: HiveId) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let hives = txn.open_table(HIVES).map_err(map_err!(Table))?;
            if hives.get(hive_id).map_err(map_err!(Read))?.is_none() {
                return Err(StateError::NotFound(format!("hive {hive_id}")));
            }
            let mut nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
            let mut node: Node = match nodes.get(node_id).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(format!("node {node_id}"))),
            };
            node.hive_id = Some(hive_id);
            nodes
                .insert(node_id, encode(&node)?.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%node_id, hive_id, "node linked");
        Ok(())
    }

    /// Detach a node from its hive. Returns false if the node is unknown.
    pub fn unlink_node(&self, node_id: &str) -> StateResult<bool> {
        self.modify_node(node_id, |node| node.hive_id = None)
    }

    /// Record a message from the node at `timestamp` (unix seconds).
    pub fn touch_node(&self, node_id: &str, timestamp: u64) -> StateResult<bool> {
        self.modify_node(node_id, |node| node.last_seen = timestamp)
    }

    fn modify_node(&self, node_id: &str, f: impl FnOnce(&mut Node)) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let found;
        {
            let mut nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
            let node: Option<Node> = match nodes.get(node_id).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            found = node.is_some();
            if let Some(mut node) = node {
                f(&mut node);
                nodes
                    .insert(node_id, encode(&node)?.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(found)
    }

    /// Delete a node with its measurements and actuator record.
    /// Returns true if the node existed.
    pub fn delete_node(&self, node_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        let purged;
        {
            let mut nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
            existed = nodes.remove(node_id).map_err(map_err!(Write))?.is_some();

            let mut actuators = txn.open_table(ACTUATORS).map_err(map_err!(Table))?;
            actuators.remove(node_id).map_err(map_err!(Write))?;

            let mut measurements = txn.open_table(MEASUREMENTS).map_err(map_err!(Table))?;
            let (lo, hi) = measurement_range(node_id, None);
            let keys: Vec<String> = measurements
                .range(lo.as_str()..hi.as_str())
                .map_err(map_err!(Read))?
                .map(|entry| entry.map(|(key, _)| key.value().to_string()))
                .collect::<Result<_, _>>()
                .map_err(map_err!(Read))?;
            for key in &keys {
                measurements.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            purged = keys.len();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%node_id, existed, measurements = purged, "node deleted");
        Ok(existed)
    }

    // ── Actuators ──────────────────────────────────────────────────

    /// Insert or update an actuator record.
    pub fn put_actuator(&self, record: &ActuatorRecord) -> StateResult<()> {
        let value = encode(record)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ACTUATORS).map_err(map_err!(Table))?;
            table
                .insert(record.node_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn get_actuator(&self, node_id: &str) -> StateResult<Option<ActuatorRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACTUATORS).map_err(map_err!(Table))?;
        match table.get(node_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Overwrite the last-known state of an actuator.
    pub fn set_actuator_state(&self, node_id: &str, state: ActuatorState) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ACTUATORS).map_err(map_err!(Table))?;
            let mut record: ActuatorRecord = match table.get(node_id).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(format!("actuator {node_id}"))),
            };
            record.state = state;
            table
                .insert(node_id, encode(&record)?.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%node_id, state, "actuator state stored");
        Ok(())
    }

    // ── Measurements ───────────────────────────────────────────────

    /// Insert a batch of measurements in one transaction.
    pub fn put_measurements(&self, batch: &[Measurement]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(MEASUREMENTS).map_err(map_err!(Table))?;
            for measurement in batch {
                let key = measurement.table_key();
                table
                    .insert(key.as_str(), encode(measurement)?.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Most recent measurement of one kind for a node.
    pub fn latest_measurement(
        &self,
        node_id: &str,
        kind: MeasurementKind,
    ) -> StateResult<Option<Measurement>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MEASUREMENTS).map_err(map_err!(Table))?;
        let (lo, hi) = measurement_range(node_id, Some(kind));
        let mut range = table
            .range(lo.as_str()..hi.as_str())
            .map_err(map_err!(Read))?;
        match range.next_back() {
            Some(entry) => {
                let (_, value) = entry.map_err(map_err!(Read))?;
                Ok(Some(decode(value.value())?))
            }
            None => Ok(None),
        }
    }

    /// Most recent measurement of each requested kind; kinds without any
    /// measurement are omitted.
    pub fn latest_measurements(
        &self,
        node_id: &str,
        kinds: &[MeasurementKind],
    ) -> StateResult<Vec<Measurement>> {
        let mut results = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            if let Some(measurement) = self.latest_measurement(node_id, kind)? {
                results.push(measurement);
            }
        }
        Ok(results)
    }
}

/// Remove a hive inside an open write transaction: unlink its nodes, drop
/// its rule, drop the hive.
fn remove_hive_in(txn: &WriteTransaction, hive_id: HiveId) -> StateResult<bool> {
    let mut nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
    let mut linked = Vec::new();
    for entry in nodes.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let node: Node = decode(value.value())?;
        if node.hive_id == Some(hive_id) {
            linked.push(node);
        }
    }
    for mut node in linked {
        node.hive_id = None;
        nodes
            .insert(node.id.as_str(), encode(&node)?.as_slice())
            .map_err(map_err!(Write))?;
    }

    let mut rules = txn.open_table(RULES).map_err(map_err!(Table))?;
    rules.remove(hive_id).map_err(map_err!(Write))?;

    let mut hives = txn.open_table(HIVES).map_err(map_err!(Table))?;
    let existed = hives.remove(hive_id).map_err(map_err!(Write))?.is_some();
    Ok(existed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_area(name: &str) -> Area {
        Area {
            name: name.to_string(),
            city: "Bologna".to_string(),
            region: "Emilia-Romagna".to_string(),
        }
    }

    fn test_node(id: &str, kind: NodeKind) -> Node {
        Node {
            id: id.to_string(),
            kind,
            keep_alive_secs: 10,
            last_seen: 1000,
            hive_id: None,
        }
    }

    fn reading(node_id: &str, kind: MeasurementKind, value: i32, timestamp: u64) -> Measurement {
        Measurement {
            node_id: node_id.to_string(),
            kind,
            value,
            timestamp,
        }
    }

    fn store_with_hive() -> (StateStore, Hive) {
        let store = StateStore::open_in_memory().unwrap();
        store.put_area(&test_area("north")).unwrap();
        let hive = store.create_hive("north", 5).unwrap();
        (store, hive)
    }

    // ── Areas / hives ──────────────────────────────────────────────

    #[test]
    fn area_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_area(&test_area("north")).unwrap();

        assert_eq!(store.get_area("north").unwrap(), Some(test_area("north")));
        assert!(store.get_area("south").unwrap().is_none());
        assert_eq!(store.list_areas().unwrap().len(), 1);
    }

    #[test]
    fn create_hive_requires_existing_area() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.create_hive("nowhere", 5).unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn create_hive_rejects_zero_interval() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_area(&test_area("north")).unwrap();

        let err = store.create_hive("north", 0).unwrap_err();
        assert!(matches!(err, StateError::Write(_)));
        assert!(store.list_hives().unwrap().is_empty());
        assert!(store.list_rules().unwrap().is_empty());
    }

    #[test]
    fn hive_ids_are_not_reused_after_delete() {
        let (store, first) = store_with_hive();
        let second = store.create_hive("north", 5).unwrap();
        assert!(store.delete_hive(second.id).unwrap());

        let third = store.create_hive("north", 5).unwrap();
        assert_eq!(third.id, second.id + 1);

        assert!(store.delete_hive(first.id).unwrap());
        assert!(store.delete_hive(third.id).unwrap());
        assert_eq!(store.create_hive("north", 5).unwrap().id, third.id + 1);
    }

    #[test]
    fn create_hive_allocates_sequential_ids_and_inert_rule() {
        let (store, first) = store_with_hive();
        let second = store.create_hive("north", 7).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        let rule = store.get_rule(second.id).unwrap().unwrap();
        assert!(rule.is_inert());
        assert_eq!(rule.polling_interval, 7);
        assert_eq!(store.list_hives().unwrap().len(), 2);
    }

    #[test]
    fn delete_hive_unlinks_nodes_and_drops_rule() {
        let (store, hive) = store_with_hive();
        store.put_node(&test_node("thc-1", NodeKind::ClimateSensor)).unwrap();
        store.link_node("thc-1", hive.id).unwrap();

        assert!(store.delete_hive(hive.id).unwrap());
        assert!(!store.delete_hive(hive.id).unwrap());

        assert!(store.get_hive(hive.id).unwrap().is_none());
        assert!(store.get_rule(hive.id).unwrap().is_none());
        let node = store.get_node("thc-1").unwrap().unwrap();
        assert_eq!(node.hive_id, None);
    }

    #[test]
    fn delete_area_cascades_to_hives() {
        let (store, hive) = store_with_hive();
        store.put_area(&test_area("south")).unwrap();
        let other = store.create_hive("south", 3).unwrap();

        let removed = store.delete_area("north").unwrap();
        assert_eq!(removed, vec![hive.id]);
        assert!(store.get_area("north").unwrap().is_none());
        assert!(store.get_hive(hive.id).unwrap().is_none());
        assert!(store.get_hive(other.id).unwrap().is_some());
    }

    // ── Rules ──────────────────────────────────────────────────────

    #[test]
    fn rule_update_in_place() {
        let (store, hive) = store_with_hive();
        let mut rule = store.get_rule(hive.id).unwrap().unwrap();
        rule.temperature = Some(TemperatureRule {
            min_threshold: 30,
            target: 33,
        });
        rule.polling_interval = 2;
        store.put_rule(&rule).unwrap();

        let stored = store.get_rule(hive.id).unwrap().unwrap();
        assert_eq!(stored, rule);
        assert!(!stored.is_inert());
        assert_eq!(store.list_rules().unwrap().len(), 1);
    }

    #[test]
    fn rule_for_unknown_hive_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.put_rule(&Rule::inert(42, 5)).unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn rule_with_zero_interval_is_rejected() {
        let (store, hive) = store_with_hive();
        let err = store.put_rule(&Rule::inert(hive.id, 0)).unwrap_err();
        assert!(matches!(err, StateError::Write(_)));
    }

    // ── Nodes ──────────────────────────────────────────────────────

    #[test]
    fn link_and_unlink_node() {
        let (store, hive) = store_with_hive();
        store.put_node(&test_node("ta-1", NodeKind::TemperatureActuator)).unwrap();
        store.put_node(&test_node("w-1", NodeKind::WeightSensor)).unwrap();

        store.link_node("ta-1", hive.id).unwrap();
        assert_eq!(store.list_nodes_for_hive(hive.id).unwrap().len(), 1);
        assert_eq!(store.list_unlinked_nodes().unwrap()[0].id, "w-1");

        assert!(store.unlink_node("ta-1").unwrap());
        assert!(store.list_nodes_for_hive(hive.id).unwrap().is_empty());
        assert!(!store.unlink_node("ghost").unwrap());
    }

    #[test]
    fn link_node_requires_both_ends() {
        let (store, hive) = store_with_hive();
        assert!(matches!(
            store.link_node("ghost", hive.id).unwrap_err(),
            StateError::NotFound(_)
        ));
        store.put_node(&test_node("c-1", NodeKind::CounterSensor)).unwrap();
        assert!(matches!(
            store.link_node("c-1", 99).unwrap_err(),
            StateError::NotFound(_)
        ));
    }

    #[test]
    fn touch_node_updates_last_seen() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("fn-1", NodeKind::SoundSensor)).unwrap();

        assert!(store.touch_node("fn-1", 2000).unwrap());
        assert_eq!(store.get_node("fn-1").unwrap().unwrap().last_seen, 2000);
        assert!(!store.touch_node("ghost", 2000).unwrap());
    }

    #[test]
    fn delete_node_purges_measurements_and_actuator() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("va-1", NodeKind::VentilationActuator)).unwrap();
        store.put_node(&test_node("va-10", NodeKind::VentilationActuator)).unwrap();
        store
            .put_actuator(&ActuatorRecord {
                node_id: "va-1".into(),
                address: "10.0.0.5".into(),
                state: 1,
            })
            .unwrap();
        store
            .put_measurements(&[
                reading("va-1", MeasurementKind::Temperature, 20, 1),
                reading("va-10", MeasurementKind::Temperature, 21, 1),
            ])
            .unwrap();

        assert!(store.delete_node("va-1").unwrap());
        assert!(store.get_node("va-1").unwrap().is_none());
        assert!(store.get_actuator("va-1").unwrap().is_none());
        assert!(store
            .latest_measurement("va-1", MeasurementKind::Temperature)
            .unwrap()
            .is_none());
        // Sibling with a shared id prefix is untouched.
        assert!(store
            .latest_measurement("va-10", MeasurementKind::Temperature)
            .unwrap()
            .is_some());
    }

    // ── Actuators ──────────────────────────────────────────────────

    #[test]
    fn set_actuator_state_overwrites_level() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_actuator(&ActuatorRecord {
                node_id: "ta-1".into(),
                address: "10.0.0.7".into(),
                state: 1,
            })
            .unwrap();

        store.set_actuator_state("ta-1", 33).unwrap();
        let record = store.get_actuator("ta-1").unwrap().unwrap();
        assert_eq!(record.state, 33);
        assert_eq!(record.address, "10.0.0.7");

        assert!(matches!(
            store.set_actuator_state("ghost", 1).unwrap_err(),
            StateError::NotFound(_)
        ));
    }

    // ── Measurements ───────────────────────────────────────────────

    #[test]
    fn latest_measurement_per_kind() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_measurements(&[
                reading("thc-1", MeasurementKind::Co2, 400, 100),
                reading("thc-1", MeasurementKind::Co2, 650, 300),
                reading("thc-1", MeasurementKind::Co2, 500, 200),
                reading("thc-1", MeasurementKind::Humidity, 55, 50),
            ])
            .unwrap();

        let co2 = store
            .latest_measurement("thc-1", MeasurementKind::Co2)
            .unwrap()
            .unwrap();
        assert_eq!(co2.value, 650);

        let latest = store
            .latest_measurements(
                "thc-1",
                &[
                    MeasurementKind::Temperature,
                    MeasurementKind::Humidity,
                    MeasurementKind::Co2,
                ],
            )
            .unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].kind, MeasurementKind::Humidity);
        assert_eq!(latest[1].value, 650);
    }

    #[test]
    fn counter_kinds_do_not_overlap() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_measurements(&[
                reading("c-1", MeasurementKind::CounterIn, 12, 10),
                reading("c-1", MeasurementKind::CounterOut, 7, 20),
            ])
            .unwrap();

        let inbound = store
            .latest_measurement("c-1", MeasurementKind::CounterIn)
            .unwrap()
            .unwrap();
        assert_eq!(inbound.value, 12);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_area(&test_area("north")).unwrap();
            store.create_hive("north", 5).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        let rule = store.get_rule(1).unwrap();
        assert!(rule.is_some());
        assert_eq!(store.create_hive("north", 5).unwrap().id, 2);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_areas().unwrap().is_empty());
        assert!(store.list_hives().unwrap().is_empty());
        assert!(store.list_rules().unwrap().is_empty());
        assert!(store.list_nodes().unwrap().is_empty());
        assert!(!store.delete_hive(1).unwrap());
        assert!(!store.delete_node("nope").unwrap());
        assert!(store.delete_area("nope").unwrap().is_empty());
    }
}
