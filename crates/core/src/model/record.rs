use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::format::parse_clock;
use crate::model::ids::{RecordId, SubjectId, UserId};
use crate::time::local_date;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordError {
    #[error("study time is missing")]
    MissingStudyTime,

    #[error("study time {0:?} is not HH:MM:SS or MM:SS")]
    InvalidStudyTime(String),

    #[error("incorrect answers ({incorrect}) exceed questions resolved ({resolved})")]
    TooManyIncorrect { incorrect: u32, resolved: u32 },

    #[error("answers ({answered}) exceed questions resolved ({resolved})")]
    AnswerCountMismatch { answered: u32, resolved: u32 },
}

//
// ─── RECORD ────────────────────────────────────────────────────────────────────
//

/// A logged, completed study session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub subject_id: SubjectId,
    pub topic: String,
    pub study_time_secs: u32,
    pub total_pauses: u32,
    pub questions_resolved: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl StudyRecord {
    /// Local calendar day the session was logged on.
    #[must_use]
    pub fn local_date(&self) -> NaiveDate {
        local_date(self.created_at)
    }

    #[must_use]
    pub fn correct_percentage(&self) -> f64 {
        percentage(self.correct_answers, self.questions_resolved)
    }

    #[must_use]
    pub fn incorrect_percentage(&self) -> f64 {
        percentage(self.incorrect_answers, self.questions_resolved)
    }

    pub fn apply_patch(&mut self, patch: &StudyRecordPatch) {
        self.subject_id = patch.subject_id;
        self.topic.clone_from(&patch.topic);
        self.study_time_secs = patch.study_time_secs;
        self.total_pauses = patch.total_pauses;
        self.questions_resolved = patch.questions_resolved;
        self.correct_answers = patch.correct_answers;
        self.incorrect_answers = patch.incorrect_answers;
    }
}

fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    f64::from(part) / f64::from(whole) * 100.0
}

//
// ─── NEW RECORDS ───────────────────────────────────────────────────────────────
//

/// How long the session lasted, as entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudyTime {
    Seconds(u32),
    /// `HH:MM:SS` or `MM:SS`, as typed into the manual entry form.
    Clock(String),
}

/// Unvalidated input for a new study record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudyRecordDraft {
    pub subject_id: SubjectId,
    pub topic: String,
    pub study_time: StudyTime,
    pub total_pauses: u32,
    pub questions_resolved: u32,
    pub incorrect_answers: u32,
}

impl NewStudyRecordDraft {
    /// Normalize the study time to seconds and derive correct answers.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::MissingStudyTime` for a zero duration,
    /// `RecordError::InvalidStudyTime` for an unparseable clock string and
    /// `RecordError::TooManyIncorrect` if incorrect answers exceed questions resolved.
    pub fn validate(self) -> Result<NewStudyRecord, RecordError> {
        let study_time_secs = match self.study_time {
            StudyTime::Seconds(secs) => secs,
            StudyTime::Clock(raw) => {
                parse_clock(&raw).ok_or(RecordError::InvalidStudyTime(raw))?
            }
        };
        if study_time_secs == 0 {
            return Err(RecordError::MissingStudyTime);
        }
        if self.incorrect_answers > self.questions_resolved {
            return Err(RecordError::TooManyIncorrect {
                incorrect: self.incorrect_answers,
                resolved: self.questions_resolved,
            });
        }

        Ok(NewStudyRecord {
            subject_id: self.subject_id,
            topic: self.topic.trim().to_string(),
            study_time_secs,
            total_pauses: self.total_pauses,
            questions_resolved: self.questions_resolved,
            correct_answers: self.questions_resolved - self.incorrect_answers,
            incorrect_answers: self.incorrect_answers,
        })
    }
}

/// Validated payload for creating a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudyRecord {
    pub subject_id: SubjectId,
    pub topic: String,
    pub study_time_secs: u32,
    pub total_pauses: u32,
    pub questions_resolved: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
}

/// Editable fields of an existing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyRecordPatch {
    pub subject_id: SubjectId,
    pub topic: String,
    pub study_time_secs: u32,
    pub total_pauses: u32,
    pub questions_resolved: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
}

impl StudyRecordPatch {
    #[must_use]
    pub fn from_record(record: &StudyRecord) -> Self {
        Self {
            subject_id: record.subject_id,
            topic: record.topic.clone(),
            study_time_secs: record.study_time_secs,
            total_pauses: record.total_pauses,
            questions_resolved: record.questions_resolved,
            correct_answers: record.correct_answers,
            incorrect_answers: record.incorrect_answers,
        }
    }

    /// # Errors
    ///
    /// Returns `RecordError::AnswerCountMismatch` if correct plus incorrect
    /// answers exceed questions resolved.
    pub fn validate(&self) -> Result<(), RecordError> {
        let answered = self.correct_answers.saturating_add(self.incorrect_answers);
        if answered > self.questions_resolved {
            return Err(RecordError::AnswerCountMismatch {
                answered,
                resolved: self.questions_resolved,
            });
        }
        Ok(())
    }
}

//
// ─── DENORMALIZED VIEW ─────────────────────────────────────────────────────────
//

/// Placeholder shown when a record's subject is missing from the catalog.
pub const UNKNOWN_SUBJECT: &str = "Unknown subject";

/// A record joined with its subject name, as listed in the history table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub record: StudyRecord,
    pub subject_name: String,
}

/// Answer accuracy across a set of records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordStats {
    pub questions_resolved: u64,
    pub correct_answers: u64,
    pub total_study_secs: u64,
}

impl RecordStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a StudyRecord>) -> Self {
        let mut stats = Self {
            questions_resolved: 0,
            correct_answers: 0,
            total_study_secs: 0,
        };
        for record in records {
            stats.questions_resolved += u64::from(record.questions_resolved);
            stats.correct_answers += u64::from(record.correct_answers);
            stats.total_study_secs += u64::from(record.study_time_secs);
        }
        stats
    }

    #[must_use]
    pub fn correct_percentage(&self) -> f64 {
        if self.questions_resolved == 0 {
            return 0.0;
        }
        self.correct_answers as f64 / self.questions_resolved as f64 * 100.0
    }

    /// Everything resolved but not answered correctly counts as incorrect.
    #[must_use]
    pub fn incorrect_percentage(&self) -> f64 {
        if self.questions_resolved == 0 {
            return 0.0;
        }
        100.0 - self.correct_percentage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn draft(study_time: StudyTime) -> NewStudyRecordDraft {
        NewStudyRecordDraft {
            subject_id: SubjectId::new(1),
            topic: "  Contracts ".into(),
            study_time,
            total_pauses: 2,
            questions_resolved: 10,
            incorrect_answers: 3,
        }
    }

    pub(crate) fn record(id: u64, resolved: u32, correct: u32) -> StudyRecord {
        StudyRecord {
            id: RecordId::new(id),
            user_id: UserId::new("u1"),
            subject_id: SubjectId::new(1),
            topic: "t".into(),
            study_time_secs: 600,
            total_pauses: 0,
            questions_resolved: resolved,
            correct_answers: correct,
            incorrect_answers: resolved - correct,
            created_at: fixed_now(),
            active: true,
        }
    }

    #[test]
    fn draft_derives_correct_answers() {
        let new = draft(StudyTime::Seconds(1500)).validate().unwrap();
        assert_eq!(new.correct_answers, 7);
        assert_eq!(new.topic, "Contracts");
        assert_eq!(new.study_time_secs, 1500);
    }

    #[test]
    fn draft_parses_clock_strings() {
        let new = draft(StudyTime::Clock("01:00:30".into())).validate().unwrap();
        assert_eq!(new.study_time_secs, 3630);

        let err = draft(StudyTime::Clock("half an hour".into()))
            .validate()
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidStudyTime(_)));
    }

    #[test]
    fn draft_rejects_zero_time_and_bad_counts() {
        assert_eq!(
            draft(StudyTime::Seconds(0)).validate().unwrap_err(),
            RecordError::MissingStudyTime
        );

        let mut bad = draft(StudyTime::Seconds(60));
        bad.incorrect_answers = 11;
        assert_eq!(
            bad.validate().unwrap_err(),
            RecordError::TooManyIncorrect {
                incorrect: 11,
                resolved: 10
            }
        );
    }

    #[test]
    fn percentages_handle_zero_questions() {
        let empty = record(1, 0, 0);
        assert_eq!(empty.correct_percentage(), 0.0);
        let half = record(2, 10, 5);
        assert_eq!(half.correct_percentage(), 50.0);
        assert_eq!(half.incorrect_percentage(), 50.0);
    }

    #[test]
    fn stats_aggregate_records() {
        let records = [record(1, 10, 8), record(2, 10, 2)];
        let stats = RecordStats::from_records(&records);
        assert_eq!(stats.questions_resolved, 20);
        assert_eq!(stats.correct_percentage(), 50.0);
        assert_eq!(stats.incorrect_percentage(), 50.0);
        assert_eq!(stats.total_study_secs, 1200);

        let none = RecordStats::from_records(&[]);
        assert_eq!(none.incorrect_percentage(), 0.0);
    }

    #[test]
    fn patch_applies_and_validates() {
        let mut rec = record(1, 10, 5);
        let mut patch = StudyRecordPatch::from_record(&rec);
        patch.topic = "Torts".into();
        patch.correct_answers = 9;
        patch.incorrect_answers = 1;
        patch.validate().unwrap();
        rec.apply_patch(&patch);
        assert_eq!(rec.topic, "Torts");
        assert_eq!(rec.correct_answers, 9);

        patch.incorrect_answers = 5;
        assert!(patch.validate().is_err());
    }
}
