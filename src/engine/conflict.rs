use std::fmt;

use ulid::Ulid;

use crate::model::*;

use super::EngineError;
use super::cohort::CohortResolver;
use super::overlap;
use super::snapshot::ScheduleSource;

/// Resource dimension on which two entries collided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Room,
    Instructor,
    Cohort,
}

/// The first existing entry found colliding with a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub existing: ScheduleEntry,
    pub dimension: Dimension,
}

/// An explained collision, ready for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ActivityKind,
    pub entry_id: Ulid,
    pub course_code: String,
    pub slot: Slot,
    /// Set when the colliding entry is another row of the same import batch.
    pub batch_row: Option<usize>,
    /// `"<Dimension>: <name>"` fragments; never empty.
    pub fragments: Vec<String>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Jadwal bentrok dengan ")?;
        if let Some(row) = self.batch_row {
            write!(f, "baris {row} ")?;
        }
        write!(
            f,
            "{} {} pada {} ({})",
            self.kind,
            self.course_code,
            self.slot,
            self.fragments.join("; ")
        )
    }
}

/// Kinds scanned for a candidate: its own kind first, then the rest in
/// canonical order.
pub fn scan_order(own: ActivityKind) -> impl Iterator<Item = ActivityKind> {
    std::iter::once(own).chain(ActivityKind::ALL.into_iter().filter(move |k| *k != own))
}

/// Find the first existing entry on the candidate's date that collides with
/// it, skipping `ignore` (the record being edited on update). Only entries
/// whose time overlaps the candidate are fetched.
pub fn find_conflict<S: ScheduleSource + ?Sized>(
    resolver: &CohortResolver<'_, S>,
    candidate: &ScheduleEntry,
    ignore: Option<Ulid>,
) -> Result<Option<Collision>, EngineError> {
    let source = resolver.source();
    for kind in scan_order(candidate.kind) {
        let mut existing = source.entries_overlapping(kind, &candidate.slot)?;
        existing.sort_by(|a, b| (a.slot.start, a.id).cmp(&(b.slot.start, b.id)));
        for entry in existing {
            if Some(entry.id) == ignore {
                continue;
            }
            if let Some(dimension) = pair_collision(resolver, candidate, entry)? {
                return Ok(Some(Collision {
                    existing: entry.clone(),
                    dimension,
                }));
            }
        }
    }
    Ok(None)
}

/// Collision test for one pair. Time first; then room, instructors and
/// cohort, returning the first dimension that matches.
pub fn pair_collision<S: ScheduleSource + ?Sized>(
    resolver: &CohortResolver<'_, S>,
    candidate: &ScheduleEntry,
    existing: &ScheduleEntry,
) -> Result<Option<Dimension>, EngineError> {
    if !overlap::overlaps(&candidate.slot, &existing.slot) {
        return Ok(None);
    }
    if same_room(candidate, existing) {
        return Ok(Some(Dimension::Room));
    }
    if !shared_instructors(candidate, existing).is_empty() {
        return Ok(Some(Dimension::Instructor));
    }
    if cohort_collides(resolver, candidate, existing)? {
        return Ok(Some(Dimension::Cohort));
    }
    Ok(None)
}

pub fn same_room(a: &ScheduleEntry, b: &ScheduleEntry) -> bool {
    matches!((a.room_id, b.room_id), (Some(x), Some(y)) if x == y)
}

/// Instructors assigned to both entries, in `a`'s order.
pub fn shared_instructors(a: &ScheduleEntry, b: &ScheduleEntry) -> Vec<Ulid> {
    a.instructor_ids
        .iter()
        .filter(|id| b.instructor_ids.contains(id))
        .copied()
        .collect()
}

/// Cohort dimension, honouring curriculum scoping: when either entry's kind is
/// curriculum-scoped and the two courses sit in different semesters, the
/// cohorts are not compared. Symmetric in its two arguments.
pub fn cohort_collides<S: ScheduleSource + ?Sized>(
    resolver: &CohortResolver<'_, S>,
    candidate: &ScheduleEntry,
    existing: &ScheduleEntry,
) -> Result<bool, EngineError> {
    if candidate.cohort.is_none() || existing.cohort.is_none() {
        return Ok(false);
    }
    let scoped = candidate.kind.descriptor().curriculum_scoped || existing.kind.descriptor().curriculum_scoped;
    if scoped
        && !same_curriculum_semester(resolver.source(), &candidate.course_code, &existing.course_code)?
    {
        return Ok(false);
    }
    resolver.collides(candidate.cohort.as_ref(), existing.cohort.as_ref())
}

/// Unknown courses and intersession courses never prove a semester mismatch.
fn same_curriculum_semester<S: ScheduleSource + ?Sized>(
    source: &S,
    a: &str,
    b: &str,
) -> Result<bool, EngineError> {
    if a == b {
        return Ok(true);
    }
    let sa = source.course(a)?.and_then(|c| c.semester);
    let sb = source.course(b)?.and_then(|c| c.semester);
    Ok(match (sa, sb) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    })
}
