use thiserror::Error;

use crate::model::ids::SubjectId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CycleError {
    #[error("cycle name cannot be empty")]
    EmptyName,

    #[error("a cycle named {0:?} already exists")]
    DuplicateName(String),

    #[error("no cycle named {0:?}")]
    NotFound(String),
}

/// A named rotation of subjects studied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyCycle {
    pub name: String,
    pub subjects: Vec<SubjectId>,
}

/// What the cycle list shows for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub name: String,
    pub total_subjects: usize,
    pub subjects: Vec<SubjectId>,
}

/// The user's cycles, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudyCycles {
    cycles: Vec<StudyCycle>,
}

impl StudyCycles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cycles(&self) -> &[StudyCycle] {
        &self.cycles
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.cycles.iter().position(|cycle| cycle.name == name)
    }

    /// # Errors
    ///
    /// Returns `CycleError::EmptyName` for a blank name and
    /// `CycleError::DuplicateName` if the name is taken.
    pub fn add(&mut self, name: &str, subjects: Vec<SubjectId>) -> Result<(), CycleError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CycleError::EmptyName);
        }
        if self.position(name).is_some() {
            return Err(CycleError::DuplicateName(name.to_string()));
        }
        self.cycles.push(StudyCycle {
            name: name.to_string(),
            subjects,
        });
        Ok(())
    }

    /// Rename and/or replace the subjects of an existing cycle.
    ///
    /// # Errors
    ///
    /// Returns `CycleError::NotFound` if `old_name` is unknown, and the same
    /// name errors as [`StudyCycles::add`] for `new_name`.
    pub fn update(
        &mut self,
        old_name: &str,
        new_name: &str,
        subjects: Vec<SubjectId>,
    ) -> Result<(), CycleError> {
        let index = self
            .position(old_name)
            .ok_or_else(|| CycleError::NotFound(old_name.to_string()))?;
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(CycleError::EmptyName);
        }
        if new_name != old_name && self.position(new_name).is_some() {
            return Err(CycleError::DuplicateName(new_name.to_string()));
        }
        self.cycles[index] = StudyCycle {
            name: new_name.to_string(),
            subjects,
        };
        Ok(())
    }

    /// Returns true if a cycle was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.cycles.len();
        self.cycles.retain(|cycle| cycle.name != name);
        before != self.cycles.len()
    }

    #[must_use]
    pub fn summary(&self, name: &str) -> Option<CycleSummary> {
        self.position(name).map(|index| {
            let cycle = &self.cycles[index];
            CycleSummary {
                name: cycle.name.clone(),
                total_subjects: cycle.subjects.len(),
                subjects: cycle.subjects.clone(),
            }
        })
    }
}
