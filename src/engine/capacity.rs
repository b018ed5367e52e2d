use serde::{Deserialize, Serialize};

use crate::model::*;

use super::EngineError;
use super::snapshot::ScheduleSource;

/// Expected attendance for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headcount {
    pub students: u32,
    pub instructors: u32,
}

impl Headcount {
    pub fn required(&self) -> u32 {
        self.students + self.instructors
    }
}

/// Check that the entry's room can hold its cohort plus instructors.
///
/// Entries without a room pass. Without a cohort the room only needs room for
/// one person. A room or cohort that cannot be resolved is `NotFound`, which
/// callers must keep apart from a shortfall.
pub fn validate_capacity<S: ScheduleSource + ?Sized>(
    source: &S,
    candidate: &ScheduleEntry,
) -> Result<Option<Headcount>, EngineError> {
    let Some(room_id) = candidate.room_id else {
        return Ok(None);
    };
    let room = source.room(&room_id)?.ok_or_else(|| EngineError::NotFound {
        what: "Ruangan",
        id: room_id.to_string(),
    })?;

    let Some(cohort_ref) = candidate.cohort else {
        if room.capacity < 1 {
            return Err(EngineError::CapacityExceeded {
                room: room.name.clone(),
                required: 1,
                available: room.capacity,
            });
        }
        return Ok(None);
    };

    let cohort = source.cohort(&cohort_ref)?.ok_or_else(|| EngineError::NotFound {
        what: "Kelompok",
        id: cohort_ref.id().to_string(),
    })?;

    let headcount = Headcount {
        students: cohort.members.len() as u32,
        instructors: candidate
            .kind
            .descriptor()
            .instructors
            .headcount(candidate.instructor_ids.len()),
    };
    if headcount.required() > room.capacity {
        return Err(EngineError::CapacityExceeded {
            room: room.name.clone(),
            required: headcount.required(),
            available: room.capacity,
        });
    }
    Ok(Some(headcount))
}
