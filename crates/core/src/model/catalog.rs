use serde::{Deserialize, Serialize};

use crate::model::ids::{CareerId, SubjectId};

/// Icon assigned to careers created without one.
pub const DEFAULT_CAREER_ICON: &str = "wpf:administrator";

/// A subject from the shared catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
}

/// A career track (e.g. a public exam) the user prepares for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Career {
    pub id: CareerId,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl Career {
    #[must_use]
    pub fn icon_or_default(&self) -> &str {
        self.icon.as_deref().unwrap_or(DEFAULT_CAREER_ICON)
    }
}

/// Look up a subject name by id.
#[must_use]
pub fn subject_name(subjects: &[Subject], id: SubjectId) -> Option<&str> {
    subjects
        .iter()
        .find(|subject| subject.id == id)
        .map(|subject| subject.name.as_str())
}
