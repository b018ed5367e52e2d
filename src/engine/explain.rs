use crate::model::*;

use super::EngineError;
use super::cohort::CohortResolver;
use super::conflict::{self, Conflict};
use super::snapshot::ScheduleSource;

/// Name every dimension on which `candidate` and `existing` collide.
///
/// Each dimension is re-tested on its own since more than one may match.
/// When nothing resolves to a name (the record was removed after detection),
/// falls back to the identifying fields of `existing`.
pub fn explain<S: ScheduleSource + ?Sized>(
    resolver: &CohortResolver<'_, S>,
    candidate: &ScheduleEntry,
    existing: &ScheduleEntry,
) -> Result<Vec<String>, EngineError> {
    let source = resolver.source();
    let mut fragments = Vec::new();

    let shared = conflict::shared_instructors(candidate, existing);
    let mut names = Vec::new();
    for id in &shared {
        if let Some(instructor) = source.instructor(id)? {
            names.push(instructor.name.clone());
        }
    }
    if !names.is_empty() {
        fragments.push(format!("Dosen: {}", names.join(", ")));
    }

    if conflict::same_room(candidate, existing)
        && let Some(room_id) = existing.room_id
        && let Some(room) = source.room(&room_id)?
    {
        fragments.push(format!("Ruangan: {}", room.name));
    }

    if conflict::cohort_collides(resolver, candidate, existing)? {
        let name = match existing.cohort.as_ref() {
            Some(c) => resolver.name_of(c)?,
            None => None,
        };
        let name = match (name, candidate.cohort.as_ref()) {
            (Some(n), _) => Some(n),
            (None, Some(c)) => resolver.name_of(c)?,
            (None, None) => None,
        };
        if let Some(name) = name {
            fragments.push(format!("Kelompok: {name}"));
        }
    }

    if fragments.is_empty() {
        fragments = fallback(existing);
    }
    Ok(fragments)
}

fn fallback(existing: &ScheduleEntry) -> Vec<String> {
    let mut fragments = vec![format!("Jadwal: {} {}", existing.kind, existing.course_code)];
    if let Some(room_id) = existing.room_id {
        fragments.push(format!("Ruangan: {room_id}"));
    }
    if !existing.instructor_ids.is_empty() {
        let ids: Vec<String> = existing.instructor_ids.iter().map(|id| id.to_string()).collect();
        fragments.push(format!("Dosen: {}", ids.join(", ")));
    }
    if let Some(cohort) = existing.cohort {
        fragments.push(format!("Kelompok: {}", cohort.id()));
    }
    fragments
}

/// Build the caller-facing conflict for a collision with `existing`.
pub fn describe<S: ScheduleSource + ?Sized>(
    resolver: &CohortResolver<'_, S>,
    candidate: &ScheduleEntry,
    existing: &ScheduleEntry,
    batch_row: Option<usize>,
) -> Result<Conflict, EngineError> {
    Ok(Conflict {
        kind: existing.kind,
        entry_id: existing.id,
        course_code: existing.course_code.clone(),
        slot: existing.slot,
        batch_row,
        fragments: explain(resolver, candidate, existing)?,
    })
}
