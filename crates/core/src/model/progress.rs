use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::ids::SlotId;
use crate::model::plan::WeeklyPlan;

/// Completed plan slots per calendar date.
///
/// Dates with no completed slot are never stored, so two progress values
/// holding the same completions always compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyProgress {
    days: BTreeMap<NaiveDate, BTreeSet<SlotId>>,
}

impl DailyProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_completed(&self, date: NaiveDate, slot: SlotId) -> bool {
        self.days.get(&date).is_some_and(|set| set.contains(&slot))
    }

    /// Slots completed on `date` (empty when none).
    #[must_use]
    pub fn completed_on(&self, date: NaiveDate) -> BTreeSet<SlotId> {
        self.days.get(&date).cloned().unwrap_or_default()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.keys().copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn set_completed(&mut self, date: NaiveDate, slot: SlotId, completed: bool) {
        if completed {
            self.days.entry(date).or_default().insert(slot);
        } else if let Some(set) = self.days.get_mut(&date) {
            set.remove(&slot);
            if set.is_empty() {
                self.days.remove(&date);
            }
        }
    }

    /// Replace every completion of `date`.
    pub fn replace_day(&mut self, date: NaiveDate, slots: BTreeSet<SlotId>) {
        if slots.is_empty() {
            self.days.remove(&date);
        } else {
            self.days.insert(date, slots);
        }
    }

    /// Drop a slot from every date.
    pub fn forget_slot(&mut self, slot: SlotId) {
        self.days.retain(|_, set| {
            set.remove(&slot);
            !set.is_empty()
        });
    }

    /// Drop completions whose slot is not in `plan`. Returns how many were removed.
    pub fn retain_known(&mut self, plan: &WeeklyPlan) -> usize {
        let known = plan.slot_ids();
        let mut removed = 0;
        self.days.retain(|_, set| {
            let before = set.len();
            set.retain(|slot| known.contains(slot));
            removed += before - set.len();
            !set.is_empty()
        });
        removed
    }

    /// Rewrite slot ids through `mapping`. Ids without a mapping are dropped.
    pub fn remap(&mut self, mapping: &BTreeMap<SlotId, SlotId>) {
        let days = std::mem::take(&mut self.days);
        for (date, set) in days {
            let mapped: BTreeSet<SlotId> =
                set.iter().filter_map(|slot| mapping.get(slot).copied()).collect();
            self.replace_day(date, mapped);
        }
    }
}

/// A completion flip that remembers the state it replaced.
///
/// `apply` mutates the progress and yields the command; `revert` puts the
/// slot back exactly as it was, which is what an unconfirmed optimistic
/// update needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressToggle {
    date: NaiveDate,
    slot: SlotId,
    previously_completed: bool,
}

impl ProgressToggle {
    #[must_use]
    pub fn apply(progress: &mut DailyProgress, date: NaiveDate, slot: SlotId) -> Self {
        let previously_completed = progress.is_completed(date, slot);
        progress.set_completed(date, slot, !previously_completed);
        Self {
            date,
            slot,
            previously_completed,
        }
    }

    pub fn revert(&self, progress: &mut DailyProgress) {
        progress.set_completed(self.date, self.slot, self.previously_completed);
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    #[must_use]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Completion state after the toggle.
    #[must_use]
    pub fn completed(&self) -> bool {
        !self.previously_completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DayOfWeek, SubjectId};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    #[test]
    fn toggling_twice_restores_original() {
        let mut progress = DailyProgress::new();
        progress.set_completed(date(28), SlotId::new(9), true);
        let original = progress.clone();

        let first = ProgressToggle::apply(&mut progress, date(28), SlotId::new(1));
        assert!(first.completed());
        let second = ProgressToggle::apply(&mut progress, date(28), SlotId::new(1));
        assert!(!second.completed());

        assert_eq!(progress, original);
    }

    #[test]
    fn revert_restores_prior_value() {
        let mut progress = DailyProgress::new();
        let before = progress.clone();
        let toggle = ProgressToggle::apply(&mut progress, date(1), SlotId::new(3));
        assert!(progress.is_completed(date(1), SlotId::new(3)));

        toggle.revert(&mut progress);
        assert_eq!(progress, before);
        assert!(progress.is_empty());
    }

    #[test]
    fn retain_known_prunes_foreign_ids() {
        let mut plan = crate::model::WeeklyPlan::empty();
        let kept = plan
            .add_slot(DayOfWeek::Monday, SubjectId::new(1), "Math")
            .unwrap();

        let mut progress = DailyProgress::new();
        progress.set_completed(date(2), kept, true);
        progress.set_completed(date(2), SlotId::new(77), true);
        progress.set_completed(date(3), SlotId::new(78), true);

        assert_eq!(progress.retain_known(&plan), 2);
        assert_eq!(progress.completed_on(date(2)).len(), 1);
        assert_eq!(progress.dates().count(), 1);
    }

    #[test]
    fn remap_moves_and_drops_ids() {
        let mut progress = DailyProgress::new();
        progress.set_completed(date(4), SlotId::new(1), true);
        progress.set_completed(date(4), SlotId::new(2), true);

        let mapping = BTreeMap::from([(SlotId::new(1), SlotId::new(100))]);
        progress.remap(&mapping);

        assert!(progress.is_completed(date(4), SlotId::new(100)));
        assert!(!progress.is_completed(date(4), SlotId::new(2)));
    }

    #[test]
    fn serializes_as_date_keyed_map() {
        let mut progress = DailyProgress::new();
        progress.set_completed(date(28), SlotId::new(5), true);
        let json = serde_json::to_string(&progress).unwrap();
        assert_eq!(json, r#"{"2025-07-28":[5]}"#);

        let back: DailyProgress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, progress);
    }
}
