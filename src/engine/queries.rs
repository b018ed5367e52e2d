use std::collections::HashMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn check_range(from: NaiveDate, to: NaiveDate) -> Result<(), EngineError> {
    if from > to {
        return Err(EngineError::Invalid(format!(
            "tanggal awal {from} setelah tanggal akhir {to}"
        )));
    }
    if (to - from).num_days() >= MAX_AGENDA_DAYS {
        return Err(EngineError::LimitExceeded("agenda range too wide"));
    }
    Ok(())
}

impl Engine {
    /// Entries on `date`, ordered by start time.
    pub async fn entries_on(&self, date: NaiveDate) -> Vec<ScheduleEntry> {
        let Some(day) = self.days.get(&date).map(|d| d.value().clone()) else {
            return Vec::new();
        };
        let guard = day.read().await;
        guard.entries.clone()
    }

    pub async fn entry(&self, id: Ulid) -> Result<ScheduleEntry, EngineError> {
        loop {
            let date = self.entry_date(&id)?;
            let day = self.day(date);
            let guard = day.read().await;
            if let Some(entry) = guard.get(&id) {
                return Ok(entry.clone());
            }
        }
    }

    /// Every entry in `[from, to]` matching `keep`, by date then start time.
    async fn collect_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        mut keep: impl FnMut(&ScheduleEntry) -> bool,
    ) -> Vec<ScheduleEntry> {
        let mut days: Vec<(NaiveDate, super::SharedDayState)> = self
            .days
            .iter()
            .filter(|e| (from..=to).contains(e.key()))
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        days.sort_by_key(|(date, _)| *date);

        let mut out = Vec::new();
        for (_, day) in days {
            let guard = day.read().await;
            out.extend(guard.entries.iter().filter(|e| keep(e)).cloned());
        }
        out
    }

    pub async fn instructor_agenda(
        &self,
        instructor: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>, EngineError> {
        check_range(from, to)?;
        if self.catalog.read().await.instructor(&instructor).is_none() {
            return Err(EngineError::NotFound {
                what: "Dosen",
                id: instructor.to_string(),
            });
        }
        Ok(self
            .collect_range(from, to, |e| e.instructor_ids.contains(&instructor))
            .await)
    }

    /// Entries whose cohort includes the student, directly or through the
    /// large group of the student's semester.
    pub async fn student_agenda(
        &self,
        student: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>, EngineError> {
        check_range(from, to)?;
        let catalog = self.catalog.read().await;
        if catalog.student(&student).is_none() {
            return Err(EngineError::NotFound {
                what: "Mahasiswa",
                id: student.to_string(),
            });
        }
        let mut membership: HashMap<CohortRef, bool> = HashMap::new();
        let agenda = self
            .collect_range(from, to, |e| match e.cohort {
                Some(cohort) => *membership.entry(cohort).or_insert_with(|| {
                    catalog
                        .cohort(&cohort)
                        .is_some_and(|c| c.members.contains(&student))
                }),
                None => false,
            })
            .await;
        Ok(agenda)
    }
}
