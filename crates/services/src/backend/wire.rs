//! JSON shapes exchanged with the REST API.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use study_core::model::de::bool_or_int;
use study_core::model::{
    AdminUser, CareerId, NewStudyRecord, RecordId, SlotId, StudyRecord, StudyRecordPatch,
    SubjectId, UserId, UserPage, UserProfile,
};

/// Some endpoints wrap their payload in `{"data": ...}`, others do not.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } | Envelope::Bare(data) => data,
        }
    }
}

fn active_by_default() -> bool {
    true
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) and bare dates (end of day).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .map(|parsed| parsed.and_utc())
}

//
// ─── USER ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileWire {
    #[serde(default, deserialize_with = "bool_or_int")]
    is_premium: bool,
    #[serde(default)]
    premium_expires_at: Option<String>,
}

impl From<ProfileWire> for UserProfile {
    fn from(wire: ProfileWire) -> Self {
        UserProfile {
            is_premium: wire.is_premium,
            premium_expires_at: wire.premium_expires_at.as_deref().and_then(parse_timestamp),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserCareerWire {
    #[serde(default)]
    pub(crate) career_id: Option<CareerId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CareerNameWire {
    #[serde(default)]
    pub(crate) career_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SaveCareerWire<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) career_id: CareerId,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewCareerWire<'a> {
    pub(crate) name: &'a str,
    pub(crate) icon: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewSubjectWire<'a> {
    pub(crate) name: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserSubjectWire {
    pub(crate) subject_id: SubjectId,
    #[serde(
        rename = "ativo",
        default = "active_by_default",
        deserialize_with = "bool_or_int"
    )]
    pub(crate) active: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SaveUserSubjectsWire<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) subject_ids: &'a [SubjectId],
    pub(crate) subjects_to_deactivate: &'a [SubjectId],
}

#[derive(Debug, Serialize)]
pub(crate) struct DeactivateSubjectWire<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) subject_id: SubjectId,
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
pub(crate) struct RecordWire {
    id: RecordId,
    #[serde(default, deserialize_with = "string_or_number")]
    user_id: String,
    subject_id: SubjectId,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    study_time: Option<u32>,
    #[serde(default)]
    total_pauses: Option<u32>,
    #[serde(default)]
    questions_resolved: Option<u32>,
    #[serde(default)]
    correct_answers: Option<u32>,
    #[serde(default)]
    incorrect_answers: Option<u32>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(
        rename = "ativo",
        alias = "active",
        default = "active_by_default",
        deserialize_with = "bool_or_int"
    )]
    active: bool,
}

impl RecordWire {
    /// `fallback_created_at` stands in when the row carries no usable timestamp.
    pub(crate) fn into_record(self, fallback_created_at: DateTime<Utc>) -> StudyRecord {
        StudyRecord {
            id: self.id,
            user_id: UserId::new(self.user_id),
            subject_id: self.subject_id,
            topic: self.topic.unwrap_or_default(),
            study_time_secs: self.study_time.unwrap_or(0),
            total_pauses: self.total_pauses.unwrap_or(0),
            questions_resolved: self.questions_resolved.unwrap_or(0),
            correct_answers: self.correct_answers.unwrap_or(0),
            incorrect_answers: self.incorrect_answers.unwrap_or(0),
            created_at: self
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(fallback_created_at),
            active: self.active,
        }
    }
}

/// What the create endpoint echoes back; everything else comes from the request.
#[derive(Debug, Deserialize)]
pub(crate) struct RecordCreatedWire {
    pub(crate) id: RecordId,
    #[serde(default)]
    pub(crate) created_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RecordBodyWire<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) subject_id: SubjectId,
    pub(crate) topic: &'a str,
    pub(crate) study_time: u32,
    pub(crate) total_pauses: u32,
    pub(crate) questions_resolved: u32,
    pub(crate) correct_answers: u32,
    pub(crate) incorrect_answers: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ativo: Option<u8>,
}

impl<'a> RecordBodyWire<'a> {
    pub(crate) fn create(user: &'a UserId, record: &'a NewStudyRecord) -> Self {
        Self {
            user_id: user.as_str(),
            subject_id: record.subject_id,
            topic: &record.topic,
            study_time: record.study_time_secs,
            total_pauses: record.total_pauses,
            questions_resolved: record.questions_resolved,
            correct_answers: record.correct_answers,
            incorrect_answers: record.incorrect_answers,
            ativo: Some(1),
        }
    }

    pub(crate) fn patch(user: &'a UserId, patch: &'a StudyRecordPatch) -> Self {
        Self {
            user_id: user.as_str(),
            subject_id: patch.subject_id,
            topic: &patch.topic,
            study_time: patch.study_time_secs,
            total_pauses: patch.total_pauses,
            questions_resolved: patch.questions_resolved,
            correct_answers: patch.correct_answers,
            incorrect_answers: patch.incorrect_answers,
            ativo: None,
        }
    }
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Serialize)]
pub(crate) struct ToggleWire {
    pub(crate) date: NaiveDate,
    pub(crate) slot_id: SlotId,
    pub(crate) completed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct DayProgressWire<'a> {
    pub(crate) slot_ids: &'a BTreeSet<SlotId>,
}

//
// ─── ADMIN ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
pub(crate) struct UserPageWire {
    #[serde(default)]
    data: Vec<AdminUser>,
    #[serde(default)]
    current_page: u32,
    #[serde(default)]
    last_page: u32,
    #[serde(default)]
    total: u64,
}

impl From<UserPageWire> for UserPage {
    fn from(wire: UserPageWire) -> Self {
        UserPage {
            users: wire.data,
            current_page: wire.current_page,
            last_page: wire.last_page,
            total: wire.total,
        }
    }
}
