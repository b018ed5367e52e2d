use std::collections::BTreeMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;
use super::catalog::Catalog;

/// Read access the decision functions need. Every call may fail with
/// `EngineError::Infrastructure`, which callers propagate unchanged.
pub trait ScheduleSource {
    /// Entries of `kind` whose time overlaps `slot`, ordered by start time.
    fn entries_overlapping(&self, kind: ActivityKind, slot: &Slot) -> Result<Vec<&ScheduleEntry>, EngineError>;
    fn course(&self, code: &str) -> Result<Option<&Course>, EngineError>;
    fn room(&self, id: &Ulid) -> Result<Option<&Room>, EngineError>;
    fn instructor(&self, id: &Ulid) -> Result<Option<&Instructor>, EngineError>;
    /// `None` when the reference dangles.
    fn cohort(&self, cohort: &CohortRef) -> Result<Option<Cohort>, EngineError>;
    fn small_cohorts(&self, family: CohortFamily, semester: Option<u8>) -> Result<Vec<CohortRef>, EngineError>;
}

/// Consistent view over the catalog plus the days a mutation has locked.
/// Asking for a date outside the locked set is an infrastructure fault, never
/// an empty answer.
pub struct Snapshot<'a> {
    catalog: &'a Catalog,
    days: BTreeMap<NaiveDate, &'a DayState>,
}

impl<'a> Snapshot<'a> {
    pub fn new(catalog: &'a Catalog, days: impl IntoIterator<Item = &'a DayState>) -> Self {
        Self {
            catalog,
            days: days.into_iter().map(|d| (d.date, d)).collect(),
        }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }
}

impl ScheduleSource for Snapshot<'_> {
    fn entries_overlapping(&self, kind: ActivityKind, slot: &Slot) -> Result<Vec<&ScheduleEntry>, EngineError> {
        let date = slot.date;
        let day = self
            .days
            .get(&date)
            .ok_or_else(|| EngineError::Infrastructure(format!("date {date} not loaded in snapshot")))?;
        Ok(day.overlapping(slot.start, slot.end).filter(|e| e.kind == kind).collect())
    }

    fn course(&self, code: &str) -> Result<Option<&Course>, EngineError> {
        Ok(self.catalog.course(code))
    }

    fn room(&self, id: &Ulid) -> Result<Option<&Room>, EngineError> {
        Ok(self.catalog.room(id))
    }

    fn instructor(&self, id: &Ulid) -> Result<Option<&Instructor>, EngineError> {
        Ok(self.catalog.instructor(id))
    }

    fn cohort(&self, cohort: &CohortRef) -> Result<Option<Cohort>, EngineError> {
        Ok(self.catalog.cohort(cohort))
    }

    fn small_cohorts(&self, family: CohortFamily, semester: Option<u8>) -> Result<Vec<CohortRef>, EngineError> {
        Ok(self.catalog.small_cohorts(family, semester))
    }
}
