//! End-to-end polling tests.
//!
//! Drives the controller on tokio's paused clock against an in-memory
//! store: timer fires, rule evaluation, command hand-off to the dispatcher
//! and the dispatcher's write-back of actuator state.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use hivekeeper_dispatch::{
    ActuatorResource, ActuatorTransport, CommandDispatcher, CommandReceiver, ReplyStatus,
    TransportResult, command_channel,
};
use hivekeeper_scheduler::Controller;
use hivekeeper_state::*;

const UNIT: Duration = Duration::from_secs(1);

fn test_store() -> StateStore {
    let store = StateStore::open_in_memory().unwrap();
    store
        .put_area(&Area {
            name: "apiary".into(),
            city: "Feltre".into(),
            region: "Veneto".into(),
        })
        .unwrap();
    store
}

fn heating_rule(hive: HiveId, polling_interval: u32) -> Rule {
    let mut rule = Rule::inert(hive, polling_interval);
    rule.temperature = Some(TemperatureRule {
        min_threshold: 30,
        target: 34,
    });
    rule
}

fn record_temperature(store: &StateStore, tag: &str, value: i32, timestamp: u64) {
    store
        .put_measurements(&[Measurement {
            node_id: format!("thc-{tag}"),
            kind: MeasurementKind::Temperature,
            value,
            timestamp,
        }])
        .unwrap();
}

/// A hive with a climate sensor reading `temperature`, a heater at state 1
/// and an active heating rule.
fn add_hive(store: &StateStore, tag: &str, interval: u32, temperature: i32) -> HiveId {
    let hive = store.create_hive("apiary", interval).unwrap();
    let sensor = format!("thc-{tag}");
    let heater = format!("ta-{tag}");
    for (id, kind) in [
        (&sensor, NodeKind::ClimateSensor),
        (&heater, NodeKind::TemperatureActuator),
    ] {
        store
            .put_node(&Node {
                id: id.clone(),
                kind,
                keep_alive_secs: 10,
                last_seen: 0,
                hive_id: None,
            })
            .unwrap();
        store.link_node(id, hive.id).unwrap();
    }
    store
        .put_actuator(&ActuatorRecord {
            node_id: heater,
            address: format!("10.0.0.{}", hive.id),
            state: STATE_OFF,
        })
        .unwrap();
    record_temperature(store, tag, temperature, 1);
    store.put_rule(&heating_rule(hive.id, interval)).unwrap();
    hive.id
}

/// Collect `n` commands as (actuator, seconds since `start`).
async fn collect(rx: &mut CommandReceiver, start: Instant, n: usize) -> Vec<(String, u64)> {
    let mut seen = Vec::with_capacity(n);
    for _ in 0..n {
        let command = rx.recv().await.unwrap();
        seen.push((command.actuator, start.elapsed().as_secs()));
    }
    seen
}

fn fired(pairs: &[(&str, u64)]) -> Vec<(String, u64)> {
    pairs.iter().map(|(a, t)| (a.to_string(), *t)).collect()
}

/// Accepts every request.
#[derive(Clone, Default)]
struct AcceptingTransport {
    calls: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl ActuatorTransport for AcceptingTransport {
    fn put(
        &self,
        address: &str,
        _resource: ActuatorResource,
        body: Vec<u8>,
    ) -> impl Future<Output = TransportResult<ReplyStatus>> + Send {
        self.calls.lock().unwrap().push((address.to_string(), body));
        async { Ok(ReplyStatus::Changed) }
    }
}

/// Store whose node lookups fail for one hive.
struct FlakyStore {
    inner: StateStore,
    broken_hive: HiveId,
}

impl HiveRepository for FlakyStore {
    fn get_rule(&self, hive_id: HiveId) -> StateResult<Option<Rule>> {
        HiveRepository::get_rule(&self.inner, hive_id)
    }

    fn get_rules(&self) -> StateResult<Vec<Rule>> {
        self.inner.get_rules()
    }

    fn update_rule(&self, rule: &Rule) -> StateResult<()> {
        self.inner.update_rule(rule)
    }

    fn get_nodes(&self, hive_id: HiveId) -> StateResult<Vec<Node>> {
        if hive_id == self.broken_hive {
            return Err(StateError::Read("injected failure".into()));
        }
        self.inner.get_nodes(hive_id)
    }

    fn get_node(&self, node_id: &str) -> StateResult<Option<Node>> {
        HiveRepository::get_node(&self.inner, node_id)
    }

    fn get_latest_measurements(
        &self,
        node_id: &str,
        kinds: &[MeasurementKind],
    ) -> StateResult<Vec<Measurement>> {
        self.inner.get_latest_measurements(node_id, kinds)
    }

    fn get_actuator_record(&self, node_id: &str) -> StateResult<Option<ActuatorRecord>> {
        self.inner.get_actuator_record(node_id)
    }

    fn set_actuator_state(&self, node_id: &str, state: ActuatorState) -> StateResult<()> {
        HiveRepository::set_actuator_state(&self.inner, node_id, state)
    }
}

#[tokio::test(start_paused = true)]
async fn hives_fire_on_their_own_intervals() {
    let store = test_store();
    add_hive(&store, "a", 5, 20);
    add_hive(&store, "b", 8, 20);
    let (commands, mut rx) = command_channel();
    let controller = Controller::new(Arc::new(store), commands, UNIT);

    let start = Instant::now();
    controller.start().await.unwrap();

    // Nothing consumes the commands, so the heaters stay off and every
    // poll asks for them again.
    let seen = collect(&mut rx, start, 5).await;
    assert_eq!(
        seen,
        fired(&[("ta-a", 5), ("ta-b", 8), ("ta-a", 10), ("ta-a", 15), ("ta-b", 16)])
    );
    assert!(controller.is_armed().await);
}

#[tokio::test(start_paused = true)]
async fn dispatched_state_suppresses_repeat_commands() {
    let store = test_store();
    let hive = add_hive(&store, "a", 5, 20);
    let (commands, rx) = command_channel();
    let controller = Controller::new(Arc::new(store.clone()), commands, UNIT);

    let transport = AcceptingTransport::default();
    let calls = transport.calls.clone();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = CommandDispatcher::new(Arc::new(store.clone()), transport);
    let worker = tokio::spawn(dispatcher.run(rx, shutdown_rx));

    controller.start().await.unwrap();

    // t=5 heats, t=10 finds the heater already at target.
    tokio::time::sleep(UNIT * 12).await;
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(store.get_actuator("ta-a").unwrap().unwrap().state, 34);
    assert_eq!(calls.lock().unwrap()[0].1, br#"{"t":34}"#);

    // Warm enough now: t=15 switches it off.
    record_temperature(&store, "a", 36, 2);
    tokio::time::sleep(UNIT * 5).await;
    assert_eq!(calls.lock().unwrap().len(), 2);
    assert_eq!(store.get_actuator("ta-a").unwrap().unwrap().state, STATE_OFF);
    assert_eq!(controller.scheduled().await, vec![(hive, UNIT * 3)]);

    controller.stop().await;
    shutdown_tx.send(true).unwrap();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failing_hive_does_not_block_others() {
    let store = test_store();
    let broken = add_hive(&store, "a", 5, 20);
    let healthy = add_hive(&store, "b", 5, 20);
    let flaky = FlakyStore {
        inner: store,
        broken_hive: broken,
    };
    let (commands, mut rx) = command_channel();
    let controller = Controller::new(Arc::new(flaky), commands, UNIT);

    let start = Instant::now();
    controller.start().await.unwrap();

    let seen = collect(&mut rx, start, 2).await;
    assert_eq!(seen, fired(&[("ta-b", 5), ("ta-b", 10)]));

    // The broken hive keeps its slot.
    let scheduled: Vec<HiveId> = controller
        .scheduled()
        .await
        .into_iter()
        .map(|(hive, _)| hive)
        .collect();
    assert_eq!(scheduled, vec![broken, healthy]);
}

#[tokio::test(start_paused = true)]
async fn reconfigure_mid_interval_restarts_that_hive_only() {
    let store = test_store();
    let a = add_hive(&store, "a", 5, 20);
    add_hive(&store, "b", 8, 20);
    let (commands, mut rx) = command_channel();
    let controller = Controller::new(Arc::new(store), commands, UNIT);

    let start = Instant::now();
    controller.start().await.unwrap();

    tokio::time::sleep(UNIT * 3).await;
    controller
        .reconfigure(a, Some(heating_rule(a, 2)))
        .await
        .unwrap();

    let seen = collect(&mut rx, start, 3).await;
    assert_eq!(seen, fired(&[("ta-a", 5), ("ta-a", 7), ("ta-b", 8)]));
}

#[tokio::test(start_paused = true)]
async fn removed_hive_stops_polling() {
    let store = test_store();
    let a = add_hive(&store, "a", 5, 20);
    add_hive(&store, "b", 8, 20);
    let (commands, mut rx) = command_channel();
    let controller = Controller::new(Arc::new(store), commands, UNIT);

    let start = Instant::now();
    controller.start().await.unwrap();

    tokio::time::sleep(UNIT * 2).await;
    controller.remove(&[a]).await;

    let seen = collect(&mut rx, start, 2).await;
    assert_eq!(seen, fired(&[("ta-b", 8), ("ta-b", 16)]));
}

#[tokio::test(start_paused = true)]
async fn disabling_last_rule_idles_the_clock() {
    let store = test_store();
    let a = add_hive(&store, "a", 5, 20);
    let (commands, mut rx) = command_channel();
    let controller = Controller::new(Arc::new(store), commands, UNIT);
    controller.start().await.unwrap();

    controller.reconfigure(a, None).await.unwrap();
    assert!(!controller.is_armed().await);

    tokio::time::sleep(UNIT * 30).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn many_edits_keep_a_single_consistent_schedule() {
    let store = test_store();
    let hives: Vec<HiveId> = (0..6)
        .map(|i| add_hive(&store, &format!("h{i}"), 3 + i, 20))
        .collect();
    let (commands, _rx) = command_channel();
    let controller = Controller::new(Arc::new(store), commands, UNIT);
    controller.start().await.unwrap();

    for (step, &hive) in hives.iter().enumerate().cycle().take(24) {
        tokio::time::sleep(Duration::from_millis(700)).await;
        if step % 3 == 0 {
            controller.remove(&[hive]).await;
        } else {
            controller
                .reconfigure(hive, Some(heating_rule(hive, 2 + step as u32)))
                .await
                .unwrap();
        }
    }

    let scheduled = controller.scheduled().await;
    let mut ids: Vec<HiveId> = scheduled.iter().map(|(hive, _)| *hive).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), scheduled.len());
    assert_eq!(controller.is_armed().await, !scheduled.is_empty());
}
