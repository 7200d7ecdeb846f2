use std::{sync::Arc, time::Duration};

use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::{JoinHandle, JoinSet},
    time::{self, Instant, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{
    api::RollCallApi,
    error::RollCallError,
    models::{Candidate, Class, Group, HistoryRecord, NewRollCall, PersistedRollCall, Student},
    selection::{RollCallStats, TicketSampler},
};

use super::{RollCallState, RollStatus};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RollCallSnapshot {
    pub state: RollCallState,
    pub stats: RollCallStats,
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RollEvent {
    StateChanged(RollCallSnapshot),
    Tick { current: Candidate },
    SelectionCommitted(HistoryRecord),
    PersistenceFailed { record_id: i64, message: String },
}

pub type SaveResult = Result<PersistedRollCall, RollCallError>;

/// Holds the one draw task a controller may own. Aborts it when dropped.
#[derive(Default)]
struct Ticker {
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    fn replace(&mut self, handle: JoinHandle<()>) {
        self.cancel();
        self.handle = Some(handle);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Clone)]
pub struct RollCallController {
    state: Arc<Mutex<RollCallState>>,
    roster: Arc<Mutex<Vec<Class>>>,
    api: Arc<dyn RollCallApi>,
    // Lock order: ticker before state.
    ticker: Arc<Mutex<Ticker>>,
    rng: Arc<Mutex<StdRng>>,
    // Saves issued by `stop` that nobody has awaited yet.
    pending: Arc<Mutex<JoinSet<SaveResult>>>,
    events: broadcast::Sender<RollEvent>,
}

impl RollCallController {
    pub fn new(api: Arc<dyn RollCallApi>, initial: RollCallState) -> Self {
        Self::with_rng(api, initial, StdRng::from_entropy())
    }

    pub fn with_rng(api: Arc<dyn RollCallApi>, initial: RollCallState, rng: StdRng) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(initial)),
            roster: Arc::new(Mutex::new(Vec::new())),
            api,
            ticker: Arc::new(Mutex::new(Ticker::default())),
            rng: Arc::new(Mutex::new(rng)),
            pending: Arc::new(Mutex::new(JoinSet::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RollEvent> {
        self.events.subscribe()
    }

    pub async fn get_state(&self) -> RollCallState {
        self.state.lock().await.clone()
    }

    pub async fn get_snapshot(&self) -> RollCallSnapshot {
        let guard = self.state.lock().await;
        snapshot_of(&guard)
    }

    pub async fn candidates(&self) -> Vec<Candidate> {
        self.state.lock().await.candidates()
    }

    pub async fn recent(&self, n: usize) -> Vec<HistoryRecord> {
        self.state.lock().await.history.recent(n)
    }

    /// Begins a roll: resolves the pool, builds the ticket sequence, draws
    /// once immediately and then once per `roll_speed_ms`.
    pub async fn start(&self) -> Result<RollCallSnapshot, RollCallError> {
        let mut ticker = self.ticker.lock().await;

        let (roll_id, sampler, speed_ms, task_rng) = {
            let mut state = self.state.lock().await;
            if state.is_rolling() {
                return Err(RollCallError::AlreadyRolling);
            }

            let candidates = state.candidates();
            let mut rng = self.rng.lock().await;
            let sampler = match TicketSampler::new(candidates, &mut *rng) {
                Ok(sampler) => sampler,
                Err(err) => {
                    state.last_error = Some(err.to_string());
                    drop(state);
                    self.emit_state_changed().await;
                    return Err(err);
                }
            };

            let roll_id = Uuid::new_v4().to_string();
            let first = sampler.draw(&mut *rng).clone();
            state.begin_roll(roll_id.clone(), first, Utc::now())?;
            let task_rng = StdRng::seed_from_u64(rng.gen());

            log_info!(
                "Roll {} started with {} candidates / {} tickets",
                roll_id,
                sampler.candidates().len(),
                sampler.ticket_count()
            );
            (roll_id, sampler, state.roll_speed_ms, task_rng)
        };

        ticker.replace(self.spawn_ticker(roll_id, sampler, speed_ms, task_rng));
        drop(ticker);

        self.emit_state_changed().await;
        Ok(self.get_snapshot().await)
    }

    /// Ends the roll and commits whatever `current` holds. The save runs in
    /// the background (see `flush_pending`); a failure is reported but the
    /// local record stays.
    pub async fn stop(&self) -> Result<Option<HistoryRecord>, RollCallError> {
        let mut ticker = self.ticker.lock().await;

        let (record, class_id, session) = {
            let mut state = self.state.lock().await;
            let record = state.finish_roll(Utc::now())?;
            (
                record,
                state.selected_class.as_ref().map(|class| class.id),
                state.session,
            )
        };
        ticker.cancel();
        drop(ticker);

        match (&record, class_id) {
            (Some(record), Some(class_id)) => {
                log_info!(
                    "Selected {} ({}) from {}",
                    record.student.name,
                    record.student.group_name,
                    record.class_name
                );
                let _ = self.events.send(RollEvent::SelectionCommitted(record.clone()));
                self.spawn_persistence(record.clone(), class_id, session)
                    .await;
            }
            _ => log_warn!("Roll stopped without a selection to commit"),
        }

        self.emit_state_changed().await;
        Ok(record)
    }

    /// Waits for every save issued so far and returns their outcomes.
    pub async fn flush_pending(&self) -> Vec<SaveResult> {
        let mut pending = std::mem::take(&mut *self.pending.lock().await);
        let mut results = Vec::new();
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => log_error!("Roll call save task ended early: {}", err),
            }
        }
        results
    }

    pub async fn reset(&self) -> RollCallSnapshot {
        let mut ticker = self.ticker.lock().await;
        self.state.lock().await.reset();
        ticker.cancel();
        drop(ticker);

        self.emit_state_changed().await;
        self.get_snapshot().await
    }

    pub async fn select_class(&self, class: Option<Class>) -> RollCallSnapshot {
        let mut ticker = self.ticker.lock().await;
        self.state.lock().await.select_class(class);
        ticker.cancel();
        drop(ticker);

        self.emit_state_changed().await;
        self.get_snapshot().await
    }

    pub async fn toggle_group(&self, group_id: i64) -> Result<bool, RollCallError> {
        let selected = self.state.lock().await.toggle_group(group_id)?;
        self.emit_state_changed().await;
        Ok(selected)
    }

    pub async fn toggle_repeat(&self) -> Result<bool, RollCallError> {
        let allow = self.state.lock().await.toggle_repeat()?;
        self.emit_state_changed().await;
        Ok(allow)
    }

    pub async fn set_roll_speed(&self, ms: u64) -> u64 {
        let applied = self.state.lock().await.set_roll_speed(ms);
        if applied != ms {
            log_warn!("Roll speed {}ms clamped to {}ms", ms, applied);
        }
        applied
    }

    pub async fn delete_history(&self, id: i64) -> Result<HistoryRecord, RollCallError> {
        let removed = self.state.lock().await.remove_history(id)?;
        self.emit_state_changed().await;
        Ok(removed)
    }

    pub async fn dismiss_error(&self) {
        self.state.lock().await.last_error = None;
        self.emit_state_changed().await;
    }

    /// Reloads the roster. Selects the first class when none is selected yet.
    pub async fn refresh_classes(&self) -> Result<Vec<Class>, RollCallError> {
        let classes = self
            .api
            .list_classes()
            .await
            .map_err(RollCallError::Api)?;
        *self.roster.lock().await = classes.clone();

        let needs_selection = self.state.lock().await.selected_class.is_none();
        if needs_selection {
            if let Some(first) = classes.first() {
                self.select_class(Some(first.clone())).await;
            }
        }
        Ok(classes)
    }

    pub async fn classes(&self) -> Vec<Class> {
        self.roster.lock().await.clone()
    }

    pub async fn select_class_by_id(&self, class_id: i64) -> Result<RollCallSnapshot, RollCallError> {
        let class = self
            .roster
            .lock()
            .await
            .iter()
            .find(|class| class.id == class_id)
            .cloned()
            .ok_or(RollCallError::ClassNotFound(class_id))?;
        Ok(self.select_class(Some(class)).await)
    }

    pub async fn groups_for_class(&self, class_id: i64) -> Result<Vec<Group>, RollCallError> {
        self.api
            .list_groups(class_id)
            .await
            .map_err(RollCallError::Api)
    }

    pub async fn students_for_group(&self, group_id: i64) -> Result<Vec<Student>, RollCallError> {
        self.api
            .list_students(group_id)
            .await
            .map_err(RollCallError::Api)
    }

    pub async fn remote_history(&self) -> Result<Vec<PersistedRollCall>, RollCallError> {
        self.api
            .roll_call_history()
            .await
            .map_err(RollCallError::Api)
    }

    /// Stops any draw task. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.ticker.lock().await.cancel();
        let mut state = self.state.lock().await;
        if state.status == RollStatus::Rolling {
            state.status = RollStatus::Idle;
            state.roll_id = None;
            state.rolling_since = None;
        }
    }

    fn spawn_ticker(
        &self,
        roll_id: String,
        sampler: TicketSampler,
        speed_ms: u64,
        mut rng: StdRng,
    ) -> JoinHandle<()> {
        let state = self.state.clone();
        let events = self.events.clone();
        let period = Duration::from_millis(speed_ms);

        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let drawn = sampler.draw(&mut rng).clone();

                {
                    let mut guard = state.lock().await;
                    if !guard.record_tick(&roll_id, drawn.clone()) {
                        break;
                    }
                }

                let _ = events.send(RollEvent::Tick { current: drawn });
            }
        })
    }

    async fn spawn_persistence(&self, record: HistoryRecord, class_id: i64, session: u64) {
        let api = self.api.clone();
        let state = self.state.clone();
        let events = self.events.clone();

        self.pending.lock().await.spawn(async move {
            let request = NewRollCall {
                student_id: record.student.id,
                class_id,
            };

            match api.create_roll_call(request).await {
                Ok(saved) => {
                    log_info!("Roll call record {} saved as {}", record.id, saved.id);
                    Ok(saved)
                }
                Err(err) => {
                    let err = RollCallError::Persistence(err);
                    let message = err.to_string();
                    log_error!("Roll call record {} not saved: {}", record.id, message);

                    let snapshot = {
                        let mut guard = state.lock().await;
                        // A reset or class switch since the stop owns the error slot now.
                        if guard.session == session {
                            guard.last_error = Some(message.clone());
                            Some(snapshot_of(&guard))
                        } else {
                            None
                        }
                    };
                    let _ = events.send(RollEvent::PersistenceFailed {
                        record_id: record.id,
                        message,
                    });
                    if let Some(snapshot) = snapshot {
                        let _ = events.send(RollEvent::StateChanged(snapshot));
                    }
                    Err(err)
                }
            }
        });
    }

    async fn emit_state_changed(&self) {
        let snapshot = self.get_snapshot().await;
        let _ = self.events.send(RollEvent::StateChanged(snapshot));
    }
}

fn snapshot_of(state: &RollCallState) -> RollCallSnapshot {
    RollCallSnapshot {
        stats: state.statistics(Utc::now()),
        state: state.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollcall::testing::{class, one_a, student, FakeApi};

    fn controller_with(api: Arc<FakeApi>) -> RollCallController {
        RollCallController::with_rng(api, RollCallState::new(), StdRng::seed_from_u64(7))
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_replace_current_until_stopped() {
        let api = Arc::new(FakeApi::default());
        let controller = controller_with(api.clone());
        controller.select_class(Some(one_a())).await;
        let mut events = controller.subscribe();

        let snapshot = controller.start().await.unwrap();
        assert_eq!(snapshot.state.status, RollStatus::Rolling);
        assert!(snapshot.state.current.is_some());

        time::sleep(Duration::from_millis(80 * 5 + 10)).await;

        let mut ticks = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, RollEvent::Tick { .. }) {
                ticks += 1;
            }
        }
        assert!(ticks >= 4, "expected roughly five ticks, saw {ticks}");

        let before_stop = controller.get_state().await.current.clone();
        let record = controller.stop().await.unwrap().unwrap();
        assert_eq!(Some(record.student.clone()), before_stop);

        let mut saves = controller.flush_pending().await;
        assert_eq!(saves.len(), 1);
        let saved = saves.remove(0).unwrap();
        assert_eq!(saved.student_id, record.student.id);
        assert_eq!(api.saved.lock().unwrap()[0].class_id, 1);

        // No draws after stop.
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(controller.get_state().await.current, before_stop);
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, RollEvent::Tick { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_immediately_after_start_commits_first_draw() {
        let controller = controller_with(Arc::new(FakeApi::default()));
        controller.select_class(Some(one_a())).await;

        let started = controller.start().await.unwrap();
        let record = controller.stop().await.unwrap();
        assert_eq!(
            record.map(|record| record.student),
            started.state.current
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_repeat_scenario_calls_each_student_once() {
        let controller = controller_with(Arc::new(FakeApi::default()));
        controller.select_class(Some(one_a())).await;

        let mut called = Vec::new();
        for _ in 0..2 {
            controller.start().await.unwrap();
            time::sleep(Duration::from_millis(250)).await;
            let record = controller.stop().await.unwrap();
            called.push(record.unwrap().student.id);
        }
        called.sort();
        assert_eq!(called, vec![1, 2]);

        let snapshot = controller.get_snapshot().await;
        assert_eq!(snapshot.state.history.len(), 2);
        assert_eq!(snapshot.stats.remaining_students, 0);

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, RollCallError::NoCandidates));
        let state = controller.get_state().await;
        assert!(!state.is_rolling());
        assert_eq!(state.last_error.as_deref(), Some("no students available to call"));
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_mode_keeps_called_students_eligible() {
        let controller = controller_with(Arc::new(FakeApi::default()));
        controller
            .select_class(Some(class(2, "2-B", vec![student(5, "Solo", 1)])))
            .await;
        controller.toggle_repeat().await.unwrap();

        for _ in 0..3 {
            controller.start().await.unwrap();
            let record = controller.stop().await.unwrap();
            assert_eq!(record.unwrap().student.id, 5);
        }
        let snapshot = controller.get_snapshot().await;
        assert_eq!(snapshot.stats.called_count, 3);
        assert_eq!(snapshot.stats.called_students, 1);
        assert_eq!(snapshot.stats.remaining_students, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pool_refuses_to_start() {
        let controller = controller_with(Arc::new(FakeApi::default()));
        assert!(matches!(
            controller.start().await,
            Err(RollCallError::NoCandidates)
        ));

        controller.select_class(Some(class(3, "3-C", Vec::new()))).await;
        assert!(matches!(
            controller.start().await,
            Err(RollCallError::NoCandidates)
        ));
        assert!(!controller.get_state().await.is_rolling());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_weight_sole_candidate_is_selected() {
        let controller = controller_with(Arc::new(FakeApi::default()));
        controller
            .select_class(Some(class(4, "4-D", vec![student(9, "Zero", 0)])))
            .await;

        controller.start().await.unwrap();
        time::sleep(Duration::from_millis(200)).await;
        let record = controller.stop().await.unwrap();
        assert_eq!(record.unwrap().student.id, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_keeps_local_record() {
        let api = Arc::new(FakeApi::default());
        api.fail_saves();
        let controller = controller_with(api);
        controller.select_class(Some(one_a())).await;
        let mut events = controller.subscribe();

        controller.start().await.unwrap();
        let record = controller.stop().await.unwrap().unwrap();
        assert!(!controller.get_state().await.is_rolling());

        let results = controller.flush_pending().await;
        assert!(matches!(results[..], [Err(RollCallError::Persistence(_))]));

        let state = controller.get_state().await;
        assert_eq!(state.history.len(), 1);
        assert!(state
            .last_error
            .as_deref()
            .unwrap()
            .contains("database unavailable"));

        let mut reported = None;
        while let Ok(event) = events.try_recv() {
            if let RollEvent::PersistenceFailed { record_id, .. } = event {
                reported = Some(record_id);
            }
        }
        assert_eq!(reported, Some(record.id));

        controller.dismiss_error().await;
        assert!(controller.get_state().await.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cancels_rolling_and_clears_history() {
        let controller = controller_with(Arc::new(FakeApi::default()));
        controller.select_class(Some(one_a())).await;

        controller.start().await.unwrap();
        controller.stop().await.unwrap();
        controller.start().await.unwrap();
        time::sleep(Duration::from_millis(100)).await;

        let snapshot = controller.reset().await;
        assert!(snapshot.state.history.is_empty());
        assert!(snapshot.state.current.is_none());
        assert!(!snapshot.state.is_rolling());

        time::sleep(Duration::from_millis(500)).await;
        assert!(controller.get_state().await.current.is_none());
        assert!(matches!(
            controller.stop().await,
            Err(RollCallError::NotRolling)
        ));

        // Idempotent.
        controller.reset().await;
    }

    #[tokio::test(start_paused = true)]
    async fn switching_class_mid_roll_stops_the_ticker() {
        let controller = controller_with(Arc::new(FakeApi::default()));
        controller.select_class(Some(one_a())).await;
        controller.start().await.unwrap();

        let other = class(2, "2-B", vec![student(5, "Solo", 1)]);
        let snapshot = controller.select_class(Some(other)).await;
        assert!(!snapshot.state.is_rolling());
        assert!(snapshot.state.current.is_none());

        time::sleep(Duration::from_millis(500)).await;
        assert!(controller.get_state().await.current.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn toggles_are_rejected_while_rolling() {
        let controller = controller_with(Arc::new(FakeApi::default()));
        controller.select_class(Some(one_a())).await;
        controller.start().await.unwrap();

        assert!(matches!(
            controller.toggle_group(10).await,
            Err(RollCallError::LockedWhileRolling(_))
        ));
        assert!(matches!(
            controller.toggle_repeat().await,
            Err(RollCallError::LockedWhileRolling(_))
        ));
        assert!(matches!(
            controller.start().await,
            Err(RollCallError::AlreadyRolling)
        ));
        controller.stop().await.unwrap();
        assert!(controller.toggle_group(10).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_selects_first_class_and_lookup_by_id() {
        let api = Arc::new(FakeApi::with_classes(vec![
            one_a(),
            class(2, "2-B", vec![student(5, "Solo", 1)]),
        ]));
        let controller = controller_with(api);

        let classes = controller.refresh_classes().await.unwrap();
        assert_eq!(classes.len(), 2);
        let state = controller.get_state().await;
        assert_eq!(state.selected_class.map(|class| class.id), Some(1));

        let snapshot = controller.select_class_by_id(2).await.unwrap();
        assert_eq!(snapshot.stats.total_students, 1);
        assert!(matches!(
            controller.select_class_by_id(42).await,
            Err(RollCallError::ClassNotFound(42))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn undo_restores_eligibility() {
        let controller = controller_with(Arc::new(FakeApi::default()));
        controller
            .select_class(Some(class(2, "2-B", vec![student(5, "Solo", 1)])))
            .await;

        controller.start().await.unwrap();
        let record = controller.stop().await.unwrap().unwrap();
        assert!(controller.candidates().await.is_empty());

        controller.delete_history(record.id).await.unwrap();
        assert_eq!(controller.candidates().await.len(), 1);
        assert!(controller.recent(5).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_draws() {
        let controller = controller_with(Arc::new(FakeApi::default()));
        controller.select_class(Some(one_a())).await;
        controller.start().await.unwrap();

        controller.shutdown().await;
        controller.shutdown().await;
        let frozen = controller.get_state().await.current.clone();
        time::sleep(Duration::from_millis(500)).await;
        let state = controller.get_state().await;
        assert!(!state.is_rolling());
        assert_eq!(state.current, frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_waits_for_slow_saves() {
        let api = Arc::new(FakeApi {
            save_delay: Some(Duration::from_millis(50)),
            ..FakeApi::default()
        });
        let controller = controller_with(api.clone());
        controller.select_class(Some(one_a())).await;

        controller.start().await.unwrap();
        controller.stop().await.unwrap();
        controller.shutdown().await;
        assert_eq!(api.saved_count(), 0);

        let results = controller.flush_pending().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(api.saved_count(), 1);

        assert!(controller.flush_pending().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_save_failure_does_not_leak_into_new_session() {
        let api = Arc::new(FakeApi {
            save_delay: Some(Duration::from_millis(50)),
            ..FakeApi::default()
        });
        api.fail_saves();
        let controller = controller_with(api);
        controller.select_class(Some(one_a())).await;
        let mut events = controller.subscribe();

        controller.start().await.unwrap();
        let record = controller.stop().await.unwrap().unwrap();
        controller
            .select_class(Some(class(2, "2-B", vec![student(5, "Solo", 1)])))
            .await;

        let results = controller.flush_pending().await;
        assert!(matches!(results[..], [Err(RollCallError::Persistence(_))]));
        assert!(controller.get_state().await.last_error.is_none());

        // Still reported to listeners.
        let mut reported = None;
        while let Ok(event) = events.try_recv() {
            if let RollEvent::PersistenceFailed { record_id, .. } = event {
                reported = Some(record_id);
            }
        }
        assert_eq!(reported, Some(record.id));
    }
}
