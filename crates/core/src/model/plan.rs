use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{SlotId, SubjectId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlanError {
    #[error("{0} appears more than once in the plan")]
    DuplicateDay(DayOfWeek),

    #[error("slot {slot} appears more than once on {day}")]
    DuplicateSlot { day: DayOfWeek, slot: SlotId },

    #[error("subject name cannot be empty")]
    EmptySubjectName,

    #[error("slot {0} is not part of the plan")]
    UnknownSlot(SlotId),

    #[error("no slot ids left in the plan")]
    SlotIdsExhausted,
}

//
// ─── DAY OF WEEK ───────────────────────────────────────────────────────────────
//

/// Weekday of a plan entry. Plans are ordered Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    /// Position inside a plan (Monday = 0).
    #[must_use]
    pub fn index(self) -> usize {
        self.to_weekday().num_days_from_monday() as usize
    }

    #[must_use]
    pub fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }

    #[must_use]
    pub fn to_weekday(self) -> Weekday {
        match self {
            Self::Monday => Weekday::Mon,
            Self::Tuesday => Weekday::Tue,
            Self::Wednesday => Weekday::Wed,
            Self::Thursday => Weekday::Thu,
            Self::Friday => Weekday::Fri,
            Self::Saturday => Weekday::Sat,
            Self::Sunday => Weekday::Sun,
        }
    }

    /// Weekday a calendar date falls on.
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self::from_weekday(date.weekday())
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//
// ─── SLOTS AND DAYS ────────────────────────────────────────────────────────────
//

/// One subject scheduled on one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSlot {
    pub id: SlotId,
    pub subject_id: SubjectId,
    pub name: String,
}

impl SubjectSlot {
    #[must_use]
    pub fn new(id: SlotId, subject_id: SubjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            subject_id,
            name: name.into(),
        }
    }

    /// Case- and whitespace-insensitive comparison against a subject name.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: DayOfWeek,
    #[serde(default)]
    pub subjects: Vec<SubjectSlot>,
}

impl DayPlan {
    #[must_use]
    pub fn empty(day: DayOfWeek) -> Self {
        Self {
            day,
            subjects: Vec::new(),
        }
    }
}

//
// ─── WEEKLY PLAN ───────────────────────────────────────────────────────────────
//

#[derive(Deserialize)]
struct WeeklyPlanWire {
    #[serde(default)]
    days: Vec<DayPlan>,
}

impl TryFrom<WeeklyPlanWire> for WeeklyPlan {
    type Error = PlanError;

    fn try_from(wire: WeeklyPlanWire) -> Result<Self, Self::Error> {
        WeeklyPlan::from_days(wire.days)
    }
}

/// The user's template of subjects per weekday.
///
/// Always holds exactly seven days in Monday..Sunday order, and no slot id
/// repeats within a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WeeklyPlanWire")]
pub struct WeeklyPlan {
    days: Vec<DayPlan>,
}

impl Default for WeeklyPlan {
    fn default() -> Self {
        Self::empty()
    }
}

impl WeeklyPlan {
    /// A plan with seven empty days.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            days: DayOfWeek::ALL.iter().copied().map(DayPlan::empty).collect(),
        }
    }

    /// Build a plan from day entries in any order. Missing days are empty.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::DuplicateDay` if a weekday is listed twice,
    /// `PlanError::DuplicateSlot` if a slot id repeats within a day, and
    /// `PlanError::EmptySubjectName` for blank slot names.
    pub fn from_days(days: Vec<DayPlan>) -> Result<Self, PlanError> {
        let mut plan = Self::empty();
        let mut seen = BTreeSet::new();
        for entry in days {
            if !seen.insert(entry.day) {
                return Err(PlanError::DuplicateDay(entry.day));
            }
            let mut ids = BTreeSet::new();
            for slot in &entry.subjects {
                if slot.name.trim().is_empty() {
                    return Err(PlanError::EmptySubjectName);
                }
                if !ids.insert(slot.id) {
                    return Err(PlanError::DuplicateSlot {
                        day: entry.day,
                        slot: slot.id,
                    });
                }
            }
            let index = entry.day.index();
            plan.days[index] = entry;
        }
        Ok(plan)
    }

    #[must_use]
    pub fn days(&self) -> &[DayPlan] {
        &self.days
    }

    #[must_use]
    pub fn day(&self, day: DayOfWeek) -> &DayPlan {
        &self.days[day.index()]
    }

    /// Slots scheduled for the weekday of `date`.
    #[must_use]
    pub fn slots_on(&self, date: NaiveDate) -> &[SubjectSlot] {
        &self.day(DayOfWeek::of(date)).subjects
    }

    #[must_use]
    pub fn contains_slot(&self, id: SlotId) -> bool {
        self.find_slot(id).is_some()
    }

    #[must_use]
    pub fn find_slot(&self, id: SlotId) -> Option<(DayOfWeek, &SubjectSlot)> {
        self.days.iter().find_map(|entry| {
            entry
                .subjects
                .iter()
                .find(|slot| slot.id == id)
                .map(|slot| (entry.day, slot))
        })
    }

    #[must_use]
    pub fn slot_ids(&self) -> BTreeSet<SlotId> {
        self.days
            .iter()
            .flat_map(|entry| entry.subjects.iter().map(|slot| slot.id))
            .collect()
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.days.iter().map(|entry| entry.subjects.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot_count() == 0
    }

    /// Append a subject to a day and return its new local id.
    ///
    /// Local ids are unique across the whole plan; the backend may replace
    /// them when the plan is saved.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::EmptySubjectName` if `name` is blank, or
    /// `PlanError::SlotIdsExhausted` once the highest id is `u64::MAX`.
    pub fn add_slot(
        &mut self,
        day: DayOfWeek,
        subject_id: SubjectId,
        name: impl Into<String>,
    ) -> Result<SlotId, PlanError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PlanError::EmptySubjectName);
        }
        let next = match self.slot_ids().last() {
            Some(last) => last
                .value()
                .checked_add(1)
                .ok_or(PlanError::SlotIdsExhausted)?,
            None => 1,
        };
        let id = SlotId::new(next);
        self.days[day.index()]
            .subjects
            .push(SubjectSlot::new(id, subject_id, name.trim()));
        Ok(id)
    }

    /// Remove a slot from a day, returning it if present.
    pub fn remove_slot(&mut self, day: DayOfWeek, id: SlotId) -> Option<SubjectSlot> {
        let subjects = &mut self.days[day.index()].subjects;
        let pos = subjects.iter().position(|slot| slot.id == id)?;
        Some(subjects.remove(pos))
    }

    /// Pair every slot of `self` with the slot at the same day and position in
    /// `canonical`, as long as both refer to the same subject.
    ///
    /// Used to carry progress across ids reassigned by the backend.
    #[must_use]
    pub fn id_mapping_to(&self, canonical: &WeeklyPlan) -> BTreeMap<SlotId, SlotId> {
        let mut mapping = BTreeMap::new();
        for (local, remote) in self.days.iter().zip(canonical.days.iter()) {
            for (old, new) in local.subjects.iter().zip(remote.subjects.iter()) {
                if old.subject_id == new.subject_id {
                    mapping.insert(old.id, new.id);
                }
            }
        }
        mapping
    }

    /// True when both plans schedule the same subjects in the same order,
    /// ignoring slot ids.
    #[must_use]
    pub fn same_contents(&self, other: &WeeklyPlan) -> bool {
        self.days.iter().zip(other.days.iter()).all(|(a, b)| {
            a.subjects.len() == b.subjects.len()
                && a.subjects
                    .iter()
                    .zip(b.subjects.iter())
                    .all(|(x, y)| x.subject_id == y.subject_id && x.name == y.name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: u64, subject: u64, name: &str) -> SubjectSlot {
        SubjectSlot::new(SlotId::new(id), SubjectId::new(subject), name)
    }

    #[test]
    fn empty_plan_has_seven_ordered_days() {
        let plan = WeeklyPlan::empty();
        let days: Vec<_> = plan.days().iter().map(|d| d.day).collect();
        assert_eq!(days, DayOfWeek::ALL.to_vec());
        assert!(plan.is_empty());
    }

    #[test]
    fn add_slot_refuses_to_wrap_the_highest_id() {
        let mut plan = WeeklyPlan::from_days(vec![DayPlan {
            day: DayOfWeek::Monday,
            subjects: vec![slot(u64::MAX, 1, "Math")],
        }])
        .unwrap();
        let err = plan
            .add_slot(DayOfWeek::Tuesday, SubjectId::new(2), "Law")
            .unwrap_err();
        assert_eq!(err, PlanError::SlotIdsExhausted);
        assert_eq!(plan.slot_count(), 1);
    }

    #[test]
    fn from_days_orders_and_fills_missing_days() {
        let plan = WeeklyPlan::from_days(vec![
            DayPlan {
                day: DayOfWeek::Friday,
                subjects: vec![slot(3, 1, "Math")],
            },
            DayPlan {
                day: DayOfWeek::Monday,
                subjects: vec![slot(1, 2, "Law")],
            },
        ])
        .unwrap();

        assert_eq!(plan.days().len(), 7);
        assert_eq!(plan.day(DayOfWeek::Monday).subjects[0].name, "Law");
        assert_eq!(plan.day(DayOfWeek::Friday).subjects[0].name, "Math");
        assert!(plan.day(DayOfWeek::Sunday).subjects.is_empty());
    }

    #[test]
    fn duplicate_slot_within_day_is_rejected() {
        let err = WeeklyPlan::from_days(vec![DayPlan {
            day: DayOfWeek::Tuesday,
            subjects: vec![slot(1, 1, "Math"), slot(1, 2, "Law")],
        }])
        .unwrap_err();
        assert_eq!(
            err,
            PlanError::DuplicateSlot {
                day: DayOfWeek::Tuesday,
                slot: SlotId::new(1)
            }
        );
    }

    #[test]
    fn duplicate_day_is_rejected() {
        let err = WeeklyPlan::from_days(vec![
            DayPlan::empty(DayOfWeek::Sunday),
            DayPlan::empty(DayOfWeek::Sunday),
        ])
        .unwrap_err();
        assert_eq!(err, PlanError::DuplicateDay(DayOfWeek::Sunday));
    }

    #[test]
    fn add_slot_assigns_plan_unique_ids() {
        let mut plan = WeeklyPlan::empty();
        let a = plan
            .add_slot(DayOfWeek::Monday, SubjectId::new(1), "Math")
            .unwrap();
        let b = plan
            .add_slot(DayOfWeek::Tuesday, SubjectId::new(1), "Math")
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(plan.slot_count(), 2);
        assert_eq!(plan.find_slot(b).map(|(day, _)| day), Some(DayOfWeek::Tuesday));

        let err = plan
            .add_slot(DayOfWeek::Monday, SubjectId::new(2), "   ")
            .unwrap_err();
        assert_eq!(err, PlanError::EmptySubjectName);
    }

    #[test]
    fn remove_slot_only_touches_given_day() {
        let mut plan = WeeklyPlan::empty();
        let id = plan
            .add_slot(DayOfWeek::Monday, SubjectId::new(1), "Math")
            .unwrap();
        assert!(plan.remove_slot(DayOfWeek::Tuesday, id).is_none());
        assert!(plan.remove_slot(DayOfWeek::Monday, id).is_some());
        assert!(!plan.contains_slot(id));
    }

    #[test]
    fn id_mapping_pairs_by_position_and_subject() {
        let local = WeeklyPlan::from_days(vec![DayPlan {
            day: DayOfWeek::Monday,
            subjects: vec![slot(1, 10, "Math"), slot(2, 20, "Law")],
        }])
        .unwrap();
        let remote = WeeklyPlan::from_days(vec![DayPlan {
            day: DayOfWeek::Monday,
            subjects: vec![slot(100, 10, "Math"), slot(101, 30, "History")],
        }])
        .unwrap();

        let mapping = local.id_mapping_to(&remote);
        assert_eq!(mapping.get(&SlotId::new(1)), Some(&SlotId::new(100)));
        assert!(!mapping.contains_key(&SlotId::new(2)));
    }

    #[test]
    fn slots_on_uses_weekday_of_date() {
        let mut plan = WeeklyPlan::empty();
        plan.add_slot(DayOfWeek::Tuesday, SubjectId::new(1), "Math")
            .unwrap();
        // 2023-11-14 was a Tuesday.
        let date = NaiveDate::from_ymd_opt(2023, 11, 14).unwrap();
        assert_eq!(plan.slots_on(date).len(), 1);
        assert!(plan.slots_on(date.succ_opt().unwrap()).is_empty());
    }

    #[test]
    fn deserializes_wire_shape() {
        let json = r#"{"days":[{"day":"wednesday","subjects":[{"id":5,"subject_id":2,"name":"Law"}]}]}"#;
        let plan: WeeklyPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.day(DayOfWeek::Wednesday).subjects[0].id, SlotId::new(5));

        let bad = r#"{"days":[{"day":"monday","subjects":[{"id":1,"subject_id":2,"name":""}]}]}"#;
        assert!(serde_json::from_str::<WeeklyPlan>(bad).is_err());
    }
}
