//! Pure validation sequence behind every mutation: normalize, kind rules,
//! capacity, then conflicts. Nothing here locks or writes.

use std::collections::HashSet;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::time::{TimeOfDay, parse_date};

use super::capacity::validate_capacity;
use super::cohort::CohortResolver;
use super::conflict::{find_conflict, pair_collision};
use super::explain::describe;
use super::snapshot::ScheduleSource;
use super::{EngineError, RowError};

/// Normalize a request into an entry with the given id.
pub fn build_entry(id: Ulid, request: &ScheduleRequest) -> Result<ScheduleEntry, EngineError> {
    if request.course_code.trim().is_empty() {
        return Err(EngineError::Invalid("kode mata kuliah wajib diisi".into()));
    }
    if request.course_code.len() > MAX_COURSE_CODE_LEN {
        return Err(EngineError::LimitExceeded("course code too long"));
    }
    if let Some(ref l) = request.label
        && l.len() > MAX_LABEL_LEN
    {
        return Err(EngineError::LimitExceeded("label too long"));
    }
    if request.instructor_ids.len() > MAX_INSTRUCTORS_PER_ENTRY {
        return Err(EngineError::LimitExceeded("too many instructors"));
    }
    if let Some(n) = request.sessions
        && (n == 0 || n > MAX_SESSIONS)
    {
        return Err(EngineError::Invalid(format!(
            "jumlah sesi harus antara 1 dan {MAX_SESSIONS}"
        )));
    }

    let date = parse_date(&request.date)?;
    let start = TimeOfDay::parse(&request.start)?;
    let end = match (&request.end, request.sessions) {
        (Some(end), _) => TimeOfDay::parse(end)?,
        (None, Some(n)) => start
            .checked_add_minutes(n * SESSION_MINUTES)
            .ok_or_else(|| EngineError::Invalid("jam selesai melewati tengah malam".into()))?,
        (None, None) => {
            return Err(EngineError::Invalid(
                "jam selesai atau jumlah sesi wajib diisi".into(),
            ));
        }
    };
    if start >= end {
        return Err(EngineError::Invalid(format!(
            "jam mulai {start} harus sebelum jam selesai {end}"
        )));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = request.instructor_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(EngineError::Invalid(format!("dosen {dup} tercantum lebih dari sekali")));
    }

    Ok(ScheduleEntry {
        id,
        kind: request.kind,
        course_code: request.course_code.trim().to_string(),
        slot: Slot::new(date, start, end),
        sessions: request.sessions,
        room_id: request.room_id,
        instructor_ids: request.instructor_ids.clone(),
        cohort: request.cohort,
        label: request.label.clone(),
    })
}

/// Kind-specific shape rules and reference existence.
pub fn check_rules<S: ScheduleSource + ?Sized>(source: &S, entry: &ScheduleEntry) -> Result<(), EngineError> {
    let descriptor = entry.kind.descriptor();
    let kind = entry.kind;

    if !descriptor.instructors.accepts(entry.instructor_ids.len()) {
        let rule = match descriptor.instructors {
            InstructorRule::ExactlyOne => "tepat satu dosen",
            InstructorRule::AtLeastOne => "minimal satu dosen",
            InstructorRule::Any => "dosen",
        };
        return Err(EngineError::Invalid(format!("{kind} membutuhkan {rule}")));
    }
    if descriptor.room_required && entry.room_id.is_none() {
        return Err(EngineError::Invalid(format!("{kind} membutuhkan ruangan")));
    }
    if !descriptor.allows_cohort(entry.cohort.as_ref()) {
        return Err(EngineError::Invalid(match entry.cohort {
            None => format!("{kind} membutuhkan kelompok mahasiswa"),
            Some(c) => format!("{kind} tidak dapat dijadwalkan untuk kelompok {:?}", c.kind()),
        }));
    }

    if source.course(&entry.course_code)?.is_none() {
        return Err(EngineError::NotFound {
            what: "Mata kuliah",
            id: entry.course_code.clone(),
        });
    }
    if let Some(cohort) = entry.cohort
        && source.cohort(&cohort)?.is_none()
    {
        return Err(EngineError::NotFound {
            what: "Kelompok",
            id: cohort.id().to_string(),
        });
    }

    let mut coordinators = 0usize;
    for id in &entry.instructor_ids {
        let instructor = source.instructor(id)?.ok_or_else(|| EngineError::NotFound {
            what: "Dosen",
            id: id.to_string(),
        })?;
        if instructor.role == InstructorRole::Coordinator {
            coordinators += 1;
        }
    }
    if let Some(max) = descriptor.max_coordinators
        && coordinators > max
    {
        return Err(EngineError::Invalid(format!(
            "{kind} hanya boleh memiliki {max} koordinator, diberikan {coordinators}"
        )));
    }
    Ok(())
}

/// Kind rules, then capacity, then conflicts; stops at the first failure.
pub fn validate_with<S: ScheduleSource + ?Sized>(
    resolver: &CohortResolver<'_, S>,
    entry: &ScheduleEntry,
    ignore: Option<Ulid>,
) -> Result<(), EngineError> {
    let source = resolver.source();
    check_rules(source, entry)?;
    validate_capacity(source, entry)?;
    if let Some(collision) = find_conflict(resolver, entry, ignore)? {
        let conflict = describe(resolver, entry, &collision.existing, None)?;
        return Err(EngineError::ScheduleConflict(Box::new(conflict)));
    }
    Ok(())
}

pub fn validate_candidate<S: ScheduleSource + ?Sized>(
    source: &S,
    entry: &ScheduleEntry,
    ignore: Option<Ulid>,
) -> Result<(), EngineError> {
    validate_with(&CohortResolver::new(source), entry, ignore)
}

/// Validate every row of an import against the stored schedule and against
/// the earlier rows that passed. Collects one error per failing row; returns
/// the entries only if no row failed.
pub fn validate_batch<S: ScheduleSource + ?Sized>(
    source: &S,
    rows: Vec<Result<ScheduleEntry, EngineError>>,
) -> Result<Vec<ScheduleEntry>, EngineError> {
    let resolver = CohortResolver::new(source);
    let mut errors = Vec::new();
    let mut built: Vec<(usize, ScheduleEntry)> = Vec::with_capacity(rows.len());

    for (i, row) in rows.into_iter().enumerate() {
        let row_no = i + 1;
        let entry = match row {
            Ok(entry) => entry,
            Err(error) => {
                errors.push(RowError { row: row_no, error });
                continue;
            }
        };
        match validate_with(&resolver, &entry, None) {
            Err(e) if e.is_infrastructure() => return Err(e),
            Err(error) => errors.push(RowError { row: row_no, error }),
            Ok(()) => {
                let mut clash = None;
                for (earlier_no, earlier) in &built {
                    if pair_collision(&resolver, &entry, earlier)?.is_some() {
                        clash = Some(describe(&resolver, &entry, earlier, Some(*earlier_no))?);
                        break;
                    }
                }
                match clash {
                    Some(conflict) => errors.push(RowError {
                        row: row_no,
                        error: EngineError::ScheduleConflict(Box::new(conflict)),
                    }),
                    None => built.push((row_no, entry)),
                }
            }
        }
    }

    if !errors.is_empty() {
        return Err(EngineError::BatchRejected(errors));
    }
    Ok(built.into_iter().map(|(_, e)| e).collect())
}

/// Data the notification and audit collaborators need.
pub fn build_receipt<S: ScheduleSource + ?Sized>(
    source: &S,
    operation: Operation,
    entry: ScheduleEntry,
    ctx: &MutationContext,
) -> Result<Receipt, EngineError> {
    let resolver = CohortResolver::new(source);
    let affected_students = resolver.members_of(entry.cohort.as_ref())?.iter().copied().collect();
    Ok(Receipt {
        operation,
        affected_instructors: entry.instructor_ids.clone(),
        affected_students,
        entry,
        actor: ctx.actor.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::Fixture;

    fn request(kind: ActivityKind, start: &str, end: Option<&str>) -> ScheduleRequest {
        ScheduleRequest {
            kind,
            course_code: "KB301".into(),
            date: "2024-09-02".into(),
            start: start.into(),
            end: end.map(Into::into),
            sessions: None,
            room_id: None,
            instructor_ids: vec![],
            cohort: None,
            label: None,
        }
    }

    #[test]
    fn build_normalizes_all_time_formats() {
        let a = build_entry(Ulid::new(), &request(ActivityKind::LargeLecture, "09.00", Some("10:40:00"))).unwrap();
        assert_eq!(a.slot.start.to_string(), "09:00");
        assert_eq!(a.slot.end.to_string(), "10:40");
    }

    #[test]
    fn end_derived_from_sessions() {
        let req = ScheduleRequest {
            sessions: Some(2),
            ..request(ActivityKind::LargeLecture, "09:00", None)
        };
        let e = build_entry(Ulid::new(), &req).unwrap();
        assert_eq!(e.slot.end.to_string(), "10:40");
    }

    #[test]
    fn missing_end_and_sessions_rejected() {
        let err = build_entry(Ulid::new(), &request(ActivityKind::LargeLecture, "09:00", None)).unwrap_err();
        assert!(matches!(err, EngineError::Invalid(_)));
    }

    #[test]
    fn start_must_precede_end() {
        for end in ["09:00", "08:00"] {
            let err = build_entry(Ulid::new(), &request(ActivityKind::Pbl, "09:00", Some(end))).unwrap_err();
            assert!(matches!(err, EngineError::Invalid(_)));
        }
    }

    #[test]
    fn duplicate_instructor_rejected() {
        let dr = Ulid::new();
        let req = ScheduleRequest {
            instructor_ids: vec![dr, dr],
            ..request(ActivityKind::LargeLecture, "09:00", Some("10:00"))
        };
        assert!(matches!(build_entry(Ulid::new(), &req), Err(EngineError::Invalid(_))));
    }

    #[test]
    fn rules_enforce_instructor_cardinality() {
        let fx = Fixture::new();
        let snap = fx.snapshot();
        let pbl = ScheduleEntry {
            room_id: Some(fx.room_5),
            cohort: Some(fx.small_s3_a),
            instructor_ids: vec![fx.dr_a, fx.dr_b],
            ..fx.entry(ActivityKind::Pbl, "09:00", "10:00")
        };
        assert!(matches!(check_rules(&snap, &pbl), Err(EngineError::Invalid(_))));
        let pbl = ScheduleEntry {
            instructor_ids: vec![fx.dr_a],
            ..pbl
        };
        assert!(check_rules(&snap, &pbl).is_ok());
    }

    #[test]
    fn rules_enforce_cohort_family_and_room() {
        let fx = Fixture::new();
        let snap = fx.snapshot();
        let lecture = ScheduleEntry {
            room_id: Some(fx.aula),
            cohort: Some(fx.small_s3_a),
            instructor_ids: vec![fx.dr_a],
            ..fx.entry(ActivityKind::LargeLecture, "09:00", "10:00")
        };
        assert!(matches!(check_rules(&snap, &lecture), Err(EngineError::Invalid(_))));
        let no_room = ScheduleEntry {
            room_id: None,
            cohort: Some(fx.large_s3),
            ..lecture
        };
        assert!(matches!(check_rules(&snap, &no_room), Err(EngineError::Invalid(_))));
    }

    #[test]
    fn plenary_allows_one_coordinator() {
        let fx = Fixture::new();
        let snap = fx.snapshot();
        let seminar = ScheduleEntry {
            room_id: Some(fx.aula),
            cohort: Some(fx.large_s3),
            instructor_ids: vec![fx.coordinator_1, fx.dr_a],
            ..fx.entry(ActivityKind::PlenarySeminar, "09:00", "10:00")
        };
        assert!(check_rules(&snap, &seminar).is_ok());
        let two = ScheduleEntry {
            instructor_ids: vec![fx.coordinator_1, fx.coordinator_2],
            ..seminar
        };
        assert!(matches!(check_rules(&snap, &two), Err(EngineError::Invalid(_))));
    }

    #[test]
    fn unknown_references_are_not_found() {
        let fx = Fixture::new();
        let snap = fx.snapshot();
        let base = ScheduleEntry {
            room_id: Some(fx.aula),
            cohort: Some(fx.large_s3),
            instructor_ids: vec![Ulid::new()],
            ..fx.entry(ActivityKind::LargeLecture, "09:00", "10:00")
        };
        assert!(matches!(
            check_rules(&snap, &base),
            Err(EngineError::NotFound { what: "Dosen", .. })
        ));
        let bad_course = ScheduleEntry {
            course_code: "NOPE".into(),
            instructor_ids: vec![fx.dr_a],
            ..base
        };
        assert!(matches!(
            check_rules(&snap, &bad_course),
            Err(EngineError::NotFound { what: "Mata kuliah", .. })
        ));
    }

    #[test]
    fn unknown_cohort_is_not_found_even_without_room() {
        let fx = Fixture::new();
        let agenda = ScheduleEntry {
            cohort: Some(CohortRef::LargeGroup(Ulid::new())),
            ..fx.entry(ActivityKind::SpecialAgenda, "09:00", "10:00")
        };
        assert!(agenda.room_id.is_none());
        assert!(matches!(
            validate_candidate(&fx.snapshot(), &agenda, None),
            Err(EngineError::NotFound { what: "Kelompok", .. })
        ));
    }

    #[test]
    fn capacity_checked_before_conflicts() {
        let mut fx = Fixture::new();
        fx.add(ScheduleEntry {
            room_id: Some(fx.closet),
            ..fx.entry(ActivityKind::SpecialAgenda, "09:00", "10:00")
        });
        let candidate = ScheduleEntry {
            room_id: Some(fx.closet),
            ..fx.entry(ActivityKind::SpecialAgenda, "09:00", "10:00")
        };
        let err = validate_candidate(&fx.snapshot(), &candidate, None).unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded { .. }));
    }

    fn lecture_row(fx: &Fixture, start: &str, end: &str, room: Ulid) -> Result<ScheduleEntry, EngineError> {
        Ok(ScheduleEntry {
            room_id: Some(room),
            instructor_ids: vec![],
            ..fx.entry(ActivityKind::SpecialAgenda, start, end)
        })
    }

    #[test]
    fn batch_reports_in_batch_collision_against_later_row() {
        let fx = Fixture::new();
        let rows = vec![
            lecture_row(&fx, "08:00", "09:00", fx.room_5),
            lecture_row(&fx, "09:00", "10:00", fx.room_5),
            lecture_row(&fx, "08:30", "09:30", fx.aula),
            lecture_row(&fx, "10:00", "11:00", fx.room_5),
            lecture_row(&fx, "08:30", "08:45", fx.room_5),
        ];
        let err = validate_batch(&fx.snapshot(), rows).unwrap_err();
        let EngineError::BatchRejected(errors) = err else {
            panic!("expected batch rejection");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row, 5);
        let EngineError::ScheduleConflict(conflict) = &errors[0].error else {
            panic!("expected conflict");
        };
        assert_eq!(conflict.batch_row, Some(1));
    }

    #[test]
    fn batch_collects_every_failing_row() {
        let fx = Fixture::new();
        let rows = vec![
            Err(EngineError::Invalid("jam".into())),
            lecture_row(&fx, "08:00", "09:00", fx.room_5),
            lecture_row(&fx, "08:00", "09:00", fx.closet),
            lecture_row(&fx, "08:30", "09:30", fx.room_5),
        ];
        let EngineError::BatchRejected(errors) = validate_batch(&fx.snapshot(), rows).unwrap_err() else {
            panic!("expected batch rejection");
        };
        let rows: Vec<usize> = errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![1, 3, 4]);
    }

    #[test]
    fn rejected_row_is_not_cited_by_later_rows() {
        let fx = Fixture::new();
        let unknown_dr = lecture_row(&fx, "08:00", "09:00", fx.room_5).map(|e| ScheduleEntry {
            instructor_ids: vec![Ulid::new()],
            ..e
        });
        let rows = vec![unknown_dr, lecture_row(&fx, "08:30", "09:30", fx.room_5)];
        let EngineError::BatchRejected(errors) = validate_batch(&fx.snapshot(), rows).unwrap_err() else {
            panic!("expected batch rejection");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row, 1);
        assert!(matches!(errors[0].error, EngineError::NotFound { what: "Dosen", .. }));
    }

    #[test]
    fn clean_batch_returns_entries_in_order() {
        let fx = Fixture::new();
        let rows = vec![
            lecture_row(&fx, "08:00", "09:00", fx.room_5),
            lecture_row(&fx, "09:00", "10:00", fx.room_5),
        ];
        let entries = validate_batch(&fx.snapshot(), rows).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].slot.start.to_string(), "08:00");
    }
}
