//! Persistence contract consumed by the scheduler and the dispatcher.
//!
//! The core never talks to redb directly; it sees hives, rules, nodes and
//! actuators through [`HiveRepository`], which [`StateStore`] implements.
//! Tests substitute wrappers that inject failures.

use crate::error::StateResult;
use crate::store::StateStore;
use crate::types::*;

pub trait HiveRepository: Send + Sync + 'static {
    fn get_rule(&self, hive_id: HiveId) -> StateResult<Option<Rule>>;

    /// Every persisted rule, inert ones included.
    fn get_rules(&self) -> StateResult<Vec<Rule>>;

    fn update_rule(&self, rule: &Rule) -> StateResult<()>;

    /// Nodes linked to the hive.
    fn get_nodes(&self, hive_id: HiveId) -> StateResult<Vec<Node>>;

    fn get_node(&self, node_id: &str) -> StateResult<Option<Node>>;

    /// Latest measurement of each requested kind; missing kinds are omitted.
    fn get_latest_measurements(
        &self,
        node_id: &str,
        kinds: &[MeasurementKind],
    ) -> StateResult<Vec<Measurement>>;

    fn get_actuator_record(&self, node_id: &str) -> StateResult<Option<ActuatorRecord>>;

    fn set_actuator_state(&self, node_id: &str, state: ActuatorState) -> StateResult<()>;
}

impl HiveRepository for StateStore {
    fn get_rule(&self, hive_id: HiveId) -> StateResult<Option<Rule>> {
        StateStore::get_rule(self, hive_id)
    }

    fn get_rules(&self) -> StateResult<Vec<Rule>> {
        self.list_rules()
    }

    fn update_rule(&self, rule: &Rule) -> StateResult<()> {
        self.put_rule(rule)
    }

    fn get_nodes(&self, hive_id: HiveId) -> StateResult<Vec<Node>> {
        self.list_nodes_for_hive(hive_id)
    }

    fn get_node(&self, node_id: &str) -> StateResult<Option<Node>> {
        StateStore::get_node(self, node_id)
    }

    fn get_latest_measurements(
        &self,
        node_id: &str,
        kinds: &[MeasurementKind],
    ) -> StateResult<Vec<Measurement>> {
        self.latest_measurements(node_id, kinds)
    }

    fn get_actuator_record(&self, node_id: &str) -> StateResult<Option<ActuatorRecord>> {
        self.get_actuator(node_id)
    }

    fn set_actuator_state(&self, node_id: &str, state: ActuatorState) -> StateResult<()> {
        StateStore::set_actuator_state(self, node_id, state)
    }
}
