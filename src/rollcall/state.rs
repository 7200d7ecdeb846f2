use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::RollCallError,
    models::{Candidate, Class, HistoryRecord},
    selection::{project, resolve_candidates, scope_size, HistoryLedger, RollCallStats},
};

pub const DEFAULT_ROLL_SPEED_MS: u64 = 80;
pub const MIN_ROLL_SPEED_MS: u64 = 30;
pub const MAX_ROLL_SPEED_MS: u64 = 150;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RollStatus {
    #[default]
    Idle,
    Rolling,
}

/// Mutable session state for one roll-call view.
///
/// Transitions live here so they can be exercised without a runtime; the
/// controller adds the ticker and persistence around them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollCallState {
    pub status: RollStatus,
    /// Identifies the roll in flight; a ticker only writes while its id matches.
    pub roll_id: Option<String>,
    pub selected_class: Option<Class>,
    /// Empty means every group of the selected class.
    pub selected_groups: BTreeSet<i64>,
    pub allow_repeat: bool,
    pub current: Option<Candidate>,
    pub roll_speed_ms: u64,
    pub rolling_since: Option<DateTime<Utc>>,
    pub history: HistoryLedger,
    pub last_error: Option<String>,
    /// Bumped by every reset or class switch.
    #[serde(skip)]
    pub session: u64,
}

impl Default for RollCallState {
    fn default() -> Self {
        Self {
            status: RollStatus::Idle,
            roll_id: None,
            selected_class: None,
            selected_groups: BTreeSet::new(),
            allow_repeat: false,
            current: None,
            roll_speed_ms: DEFAULT_ROLL_SPEED_MS,
            rolling_since: None,
            history: HistoryLedger::new(),
            last_error: None,
            session: 0,
        }
    }
}

pub fn clamp_roll_speed(ms: u64) -> u64 {
    ms.clamp(MIN_ROLL_SPEED_MS, MAX_ROLL_SPEED_MS)
}

impl RollCallState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preferences(roll_speed_ms: u64, allow_repeat: bool) -> Self {
        Self {
            roll_speed_ms: clamp_roll_speed(roll_speed_ms),
            allow_repeat,
            ..Self::default()
        }
    }

    pub fn is_rolling(&self) -> bool {
        self.status == RollStatus::Rolling
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        resolve_candidates(
            self.selected_class.as_ref(),
            &self.selected_groups,
            self.history.records(),
            self.allow_repeat,
        )
    }

    pub fn statistics(&self, now: DateTime<Utc>) -> RollCallStats {
        project(
            scope_size(self.selected_class.as_ref(), &self.selected_groups),
            self.candidates().len(),
            self.history.records(),
            self.allow_repeat,
            now,
        )
    }

    pub fn begin_roll(
        &mut self,
        roll_id: String,
        first: Candidate,
        now: DateTime<Utc>,
    ) -> Result<(), RollCallError> {
        if self.is_rolling() {
            return Err(RollCallError::AlreadyRolling);
        }
        self.status = RollStatus::Rolling;
        self.roll_id = Some(roll_id);
        self.current = Some(first);
        self.rolling_since = Some(now);
        self.last_error = None;
        Ok(())
    }

    /// Overwrites `current` with a tick's draw. Ignored unless `roll_id`
    /// still names the roll in flight.
    pub fn record_tick(&mut self, roll_id: &str, drawn: Candidate) -> bool {
        if !self.is_rolling() || self.roll_id.as_deref() != Some(roll_id) {
            return false;
        }
        self.current = Some(drawn);
        true
    }

    /// Freezes `current` and commits it to history when a class is selected.
    pub fn finish_roll(&mut self, now: DateTime<Utc>) -> Result<Option<HistoryRecord>, RollCallError> {
        if !self.is_rolling() {
            return Err(RollCallError::NotRolling);
        }
        self.status = RollStatus::Idle;
        self.roll_id = None;
        self.rolling_since = None;

        let (Some(current), Some(class)) = (self.current.clone(), self.selected_class.as_ref())
        else {
            return Ok(None);
        };
        let record = self.history.append(current, class.name.clone(), now).clone();
        Ok(Some(record))
    }

    fn halt(&mut self) {
        self.status = RollStatus::Idle;
        self.roll_id = None;
        self.rolling_since = None;
        self.current = None;
        self.history.clear();
        self.last_error = None;
        self.session += 1;
    }

    pub fn reset(&mut self) {
        self.halt();
    }

    pub fn select_class(&mut self, class: Option<Class>) {
        self.halt();
        self.selected_class = class;
        self.selected_groups.clear();
    }

    /// Returns whether the group is selected afterwards.
    pub fn toggle_group(&mut self, group_id: i64) -> Result<bool, RollCallError> {
        if self.is_rolling() {
            return Err(RollCallError::LockedWhileRolling("group selection"));
        }
        let class = self
            .selected_class
            .as_ref()
            .ok_or(RollCallError::NoClassSelected)?;
        if class.group(group_id).is_none() {
            return Err(RollCallError::UnknownGroup(group_id));
        }

        if self.selected_groups.remove(&group_id) {
            Ok(false)
        } else {
            self.selected_groups.insert(group_id);
            Ok(true)
        }
    }

    pub fn toggle_repeat(&mut self) -> Result<bool, RollCallError> {
        if self.is_rolling() {
            return Err(RollCallError::LockedWhileRolling("repeat mode"));
        }
        self.allow_repeat = !self.allow_repeat;
        Ok(self.allow_repeat)
    }

    /// Takes effect on the next roll.
    pub fn set_roll_speed(&mut self, ms: u64) -> u64 {
        self.roll_speed_ms = clamp_roll_speed(ms);
        self.roll_speed_ms
    }

    pub fn remove_history(&mut self, id: i64) -> Result<HistoryRecord, RollCallError> {
        self.history
            .remove(id)
            .ok_or(RollCallError::HistoryRecordNotFound(id))
    }
}
