//! Controller: owns the delta queue and the polling clock.
//!
//! Every queue mutation runs under one async mutex: operator edits
//! (`reconfigure`, `remove`) and timer fires (`on_fire`) each pause or
//! claim the clock, advance the queue, evaluate whatever expired and
//! re-arm for the new minimum before releasing it. An operator edit
//! therefore lands entirely before or entirely after a fire's pass.
//!
//! `reconfigure` writes the rule before taking the mutex; a fire landing in
//! between reads the new rule against the old queue slot, which the edit
//! then replaces.
//!
//! The timer task only holds a `Weak` reference back to the controller, so
//! dropping the last `Controller` handle tears the schedule down.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use hivekeeper_dispatch::{ActuatorCommand, ActuatorResource, CommandSender};
use hivekeeper_state::{ActuatorRecord, HiveId, HiveRepository, NodeKind, Rule, StateResult};

use crate::clock::{PollingClock, Tick};
use crate::error::{SchedulerError, SchedulerResult};
use crate::queue::DeltaQueue;
use crate::rules::{ActuatorStates, CLIMATE_KINDS, Readings, evaluate};

struct Schedule {
    queue: DeltaQueue,
    clock: PollingClock,
    /// Last polling interval seen per scheduled hive, used when its rule
    /// cannot be read.
    intervals: HashMap<HiveId, u32>,
    running: bool,
}

struct Inner {
    schedule: Mutex<Schedule>,
    store: Arc<dyn HiveRepository>,
    commands: CommandSender,
    interval_unit: Duration,
}

/// Cloneable handle to the hive polling scheduler.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    /// `interval_unit` is the wall-clock length of one polling-interval step.
    pub fn new(
        store: Arc<dyn HiveRepository>,
        commands: CommandSender,
        interval_unit: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                schedule: Mutex::new(Schedule {
                    queue: DeltaQueue::new(),
                    clock: PollingClock::new(),
                    intervals: HashMap::new(),
                    running: false,
                }),
                store,
                commands,
                interval_unit,
            }),
        }
    }

    /// Schedule every hive with a non-inert rule and arm the clock.
    pub async fn start(&self) -> SchedulerResult<()> {
        let rules = self.inner.store.get_rules()?;

        let mut schedule = self.inner.schedule.lock().await;
        schedule.clock.cancel();
        schedule.queue.clear();
        schedule.intervals.clear();
        for rule in rules.iter().filter(|rule| !rule.is_inert()) {
            schedule
                .queue
                .update(rule.hive_id, self.inner.interval(rule.polling_interval));
            schedule.intervals.insert(rule.hive_id, rule.polling_interval);
        }
        schedule.running = true;
        self.inner.rearm(&mut schedule);

        info!(
            hives = schedule.queue.len(),
            interval_unit_ms = self.inner.interval_unit.as_millis() as u64,
            "controller started"
        );
        Ok(())
    }

    /// Cancel the clock and drop the schedule. Commands already handed to
    /// the dispatcher are unaffected.
    pub async fn stop(&self) {
        let mut schedule = self.inner.schedule.lock().await;
        schedule.clock.cancel();
        schedule.queue.clear();
        schedule.intervals.clear();
        schedule.running = false;
        info!("controller stopped");
    }

    /// Persist a new rule for `hive` (or make its rule inert with `None`)
    /// and reschedule it.
    ///
    /// If the rule cannot be persisted the schedule is left as it was and
    /// the store error is returned.
    pub async fn reconfigure(&self, hive: HiveId, rule: Option<Rule>) -> SchedulerResult<()> {
        let persisted = match self.persist(hive, rule) {
            Ok(rule) => rule,
            Err(e) => {
                error!(hive_id = hive, error = %e, "failed to persist rule");
                return Err(e);
            }
        };

        let mut schedule = self.inner.schedule.lock().await;
        if !schedule.running {
            debug!(hive_id = hive, "controller not running, rule stored only");
            return Ok(());
        }

        let elapsed = schedule.clock.pause();
        schedule.queue.remove(hive);
        if let Some(elapsed) = elapsed {
            let expired = schedule.queue.advance(elapsed);
            self.inner.process_expired(&mut schedule, expired);
        }

        match persisted {
            Some(rule) if !rule.is_inert() => {
                schedule
                    .queue
                    .update(hive, self.inner.interval(rule.polling_interval));
                schedule.intervals.insert(hive, rule.polling_interval);
                info!(hive_id = hive, polling_interval = rule.polling_interval, "hive scheduled");
            }
            _ => {
                schedule.intervals.remove(&hive);
                info!(hive_id = hive, "hive unscheduled");
            }
        }

        self.inner.rearm(&mut schedule);
        Ok(())
    }

    /// Drop the scheduled events of `hives`.
    pub async fn remove(&self, hives: &[HiveId]) {
        let mut schedule = self.inner.schedule.lock().await;
        if !schedule.running {
            return;
        }

        let elapsed = schedule.clock.pause();
        for &hive in hives {
            schedule.queue.remove(hive);
            schedule.intervals.remove(&hive);
        }
        if schedule.queue.is_empty() {
            debug!(removed = hives.len(), "schedule empty, clock idle");
            return;
        }

        if let Some(elapsed) = elapsed {
            let expired = schedule.queue.advance(elapsed);
            self.inner.process_expired(&mut schedule, expired);
        }
        self.inner.rearm(&mut schedule);
        debug!(removed = hives.len(), remaining = schedule.queue.len(), "hives removed");
    }

    /// Scheduled hives with their time to next poll, soonest first.
    pub async fn scheduled(&self) -> Vec<(HiveId, Duration)> {
        let schedule = self.inner.schedule.lock().await;
        let elapsed = schedule.clock.elapsed().unwrap_or_default();
        schedule
            .queue
            .hives()
            .into_iter()
            .map(|(hive, remaining)| (hive, remaining.saturating_sub(elapsed)))
            .collect()
    }

    pub async fn is_armed(&self) -> bool {
        self.inner.schedule.lock().await.clock.is_armed()
    }

    fn persist(&self, hive: HiveId, rule: Option<Rule>) -> SchedulerResult<Option<Rule>> {
        let store = &self.inner.store;
        match rule {
            Some(rule) => {
                if rule.hive_id != hive {
                    return Err(SchedulerError::RuleMismatch {
                        hive,
                        rule: rule.hive_id,
                    });
                }
                store.update_rule(&rule)?;
                Ok(Some(rule))
            }
            None => match store.get_rule(hive)? {
                Some(mut rule) => {
                    rule.clear();
                    store.update_rule(&rule)?;
                    Ok(Some(rule))
                }
                None => Ok(None),
            },
        }
    }
}

impl Inner {
    fn interval(&self, polling_interval: u32) -> Duration {
        self.interval_unit * polling_interval
    }

    /// Arm the clock for the queue minimum; leave it idle on an empty queue.
    fn rearm(self: &Arc<Self>, schedule: &mut Schedule) {
        let Ok(next) = schedule.queue.peek_min() else {
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(self);
        schedule.clock.arm(next, move |tick| async move {
            if let Some(inner) = weak.upgrade() {
                inner.on_fire(tick).await;
            }
        });
    }

    async fn on_fire(self: Arc<Self>, tick: Tick) {
        let mut schedule = self.schedule.lock().await;
        if !schedule.clock.claim(tick) {
            debug!(generation = tick.generation, "stale tick dropped");
            return;
        }

        let expired = schedule.queue.advance(tick.duration);
        debug!(
            generation = tick.generation,
            expired = expired.len(),
            "polling clock fired"
        );
        self.process_expired(&mut schedule, expired);
        self.rearm(&mut schedule);
    }

    /// Evaluate each expired hive and put it back with its interval.
    ///
    /// Failures are isolated per hive: a hive whose rule cannot be read is
    /// rescheduled with its last known interval, and evaluation errors only
    /// skip this cycle's commands.
    fn process_expired(&self, schedule: &mut Schedule, expired: Vec<HiveId>) {
        for hive in expired {
            let rule = match self.store.get_rule(hive) {
                Ok(Some(rule)) if !rule.is_inert() => rule,
                Ok(_) => {
                    debug!(hive_id = hive, "hive has no active rule, dropped from schedule");
                    schedule.intervals.remove(&hive);
                    continue;
                }
                Err(e) => {
                    error!(hive_id = hive, error = %e, "failed to read rule");
                    match schedule.intervals.get(&hive) {
                        Some(&interval) => schedule.queue.update(hive, self.interval(interval)),
                        None => warn!(hive_id = hive, "no known interval, hive not rescheduled"),
                    }
                    continue;
                }
            };

            if let Err(e) = self.poll_hive(&rule) {
                error!(hive_id = hive, error = %e, "failed to evaluate hive");
            }
            schedule.intervals.insert(hive, rule.polling_interval);
            schedule
                .queue
                .update(hive, self.interval(rule.polling_interval));
        }
    }

    /// Read the hive's sensors and actuators, evaluate its rule and push a
    /// command for every actuator that must change.
    fn poll_hive(&self, rule: &Rule) -> StateResult<()> {
        let hive = rule.hive_id;
        let nodes = self.store.get_nodes(hive)?;

        let readings = match nodes.iter().find(|n| n.kind == NodeKind::ClimateSensor) {
            Some(sensor) => Readings::from_measurements(
                &self.store.get_latest_measurements(&sensor.id, &CLIMATE_KINDS)?,
            ),
            None => Readings::default(),
        };

        let mut states = ActuatorStates::default();
        let mut actuators: Vec<(ActuatorResource, ActuatorRecord)> = Vec::new();
        for node in &nodes {
            let Some(resource) = ActuatorResource::for_kind(node.kind) else {
                continue;
            };
            if actuators.iter().any(|(r, _)| *r == resource) {
                continue;
            }
            let Some(record) = self.store.get_actuator_record(&node.id)? else {
                continue;
            };
            match resource {
                ActuatorResource::Temperature => states.temperature = Some(record.state),
                ActuatorResource::Ventilation => states.ventilation = Some(record.state),
            }
            actuators.push((resource, record));
        }

        let decisions = evaluate(rule, &readings, &states);
        debug!(hive_id = hive, ?readings, decisions = decisions.len(), "hive evaluated");

        for decision in decisions {
            let Some((_, record)) = actuators.iter().find(|(r, _)| *r == decision.resource) else {
                continue;
            };
            info!(
                hive_id = hive,
                actuator = %record.node_id,
                path = decision.resource.path(),
                from = record.state,
                to = decision.state,
                "actuator change queued"
            );
            self.commands.push(ActuatorCommand::new(
                record.node_id.clone(),
                record.address.clone(),
                decision.resource,
                decision.state,
            ));
        }
        Ok(())
    }
}
