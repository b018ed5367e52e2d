use std::time::Instant;

use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::record_mutation;

use super::catalog::Catalog;
use super::pipeline::{build_entry, build_receipt, validate_batch, validate_candidate};
use super::snapshot::Snapshot;
use super::{DayGuard, Engine, EngineError, WalCommand};

fn check_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Invalid("nama wajib diisi".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn duplicate(id: impl std::fmt::Display) -> EngineError {
    EngineError::Invalid(format!("id {id} sudah terdaftar"))
}

fn snapshot<'a>(catalog: &'a Catalog, guards: &'a [DayGuard]) -> Snapshot<'a> {
    Snapshot::new(catalog, guards.iter().map(|g| &**g))
}

impl Engine {
    // ── Reference data ───────────────────────────────────────

    /// Validate under the catalog write lock, persist, then apply.
    async fn register(
        &self,
        event: Event,
        check: impl FnOnce(&Catalog) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let mut catalog = self.catalog.write().await;
        check(&*catalog)?;
        self.wal_append(&event).await?;
        catalog.apply_event(&event);
        tracing::debug!(?event, "catalog updated");
        Ok(())
    }

    pub async fn register_room(&self, room: Room) -> Result<(), EngineError> {
        check_name(&room.name)?;
        let id = room.id;
        self.register(Event::RoomRegistered(room), |c| {
            if c.contains_id(&id) { Err(duplicate(id)) } else { Ok(()) }
        })
        .await
    }

    pub async fn register_instructor(&self, instructor: Instructor) -> Result<(), EngineError> {
        check_name(&instructor.name)?;
        let id = instructor.id;
        self.register(Event::InstructorRegistered(instructor), |c| {
            if c.contains_id(&id) { Err(duplicate(id)) } else { Ok(()) }
        })
        .await
    }

    pub async fn register_course(&self, course: Course) -> Result<(), EngineError> {
        check_name(&course.name)?;
        if course.code.trim().is_empty() {
            return Err(EngineError::Invalid("kode mata kuliah wajib diisi".into()));
        }
        if course.code.len() > MAX_COURSE_CODE_LEN {
            return Err(EngineError::LimitExceeded("course code too long"));
        }
        let code = course.code.clone();
        self.register(Event::CourseRegistered(course), |c| {
            if c.course(&code).is_some() { Err(duplicate(&code)) } else { Ok(()) }
        })
        .await
    }

    pub async fn enroll_student(&self, student: Student) -> Result<(), EngineError> {
        check_name(&student.name)?;
        let id = student.id;
        self.register(Event::StudentEnrolled(student), |c| {
            if c.contains_id(&id) { Err(duplicate(id)) } else { Ok(()) }
        })
        .await
    }

    /// One regular large group per semester; its members are that
    /// semester's students.
    pub async fn create_large_group(&self, group: LargeGroup) -> Result<(), EngineError> {
        let (id, semester) = (group.id, group.semester);
        self.register(Event::LargeGroupCreated(group), |c| {
            if c.contains_id(&id) {
                return Err(duplicate(id));
            }
            if c.large_group_for_semester(semester).is_some() {
                return Err(EngineError::Invalid(format!(
                    "kelompok besar semester {semester} sudah ada"
                )));
            }
            Ok(())
        })
        .await
    }

    pub async fn create_large_group_intersession(&self, group: LargeGroupIntersession) -> Result<(), EngineError> {
        check_name(&group.name)?;
        if group.members.len() > MAX_ROSTER_SIZE {
            return Err(EngineError::LimitExceeded("roster too large"));
        }
        let id = group.id;
        let members = group.members.clone();
        self.register(Event::LargeGroupIntersessionCreated(group), |c| {
            if c.contains_id(&id) {
                return Err(duplicate(id));
            }
            require_students(c, &members)
        })
        .await
    }

    /// Place one student in a named regular small group of a semester.
    pub async fn assign_small_group(&self, row: SmallGroupRow) -> Result<(), EngineError> {
        check_name(&row.name)?;
        let (id, student_id, semester) = (row.id, row.student_id, row.semester);
        self.register(Event::SmallGroupAssigned(row), |c| {
            if c.contains_id(&id) {
                return Err(duplicate(id));
            }
            let student = c.student(&student_id).ok_or_else(|| EngineError::NotFound {
                what: "Mahasiswa",
                id: student_id.to_string(),
            })?;
            if student.semester != semester {
                return Err(EngineError::Invalid(format!(
                    "mahasiswa {} terdaftar di semester {}, bukan {semester}",
                    student.name, student.semester
                )));
            }
            Ok(())
        })
        .await
    }

    pub async fn create_small_group_intersession(&self, group: SmallGroupIntersession) -> Result<(), EngineError> {
        check_name(&group.name)?;
        if group.members.len() > MAX_ROSTER_SIZE {
            return Err(EngineError::LimitExceeded("roster too large"));
        }
        let id = group.id;
        let members = group.members.clone();
        self.register(Event::SmallGroupIntersessionCreated(group), |c| {
            if c.contains_id(&id) {
                return Err(duplicate(id));
            }
            require_students(c, &members)
        })
        .await
    }

    // ── Schedule entries ─────────────────────────────────────

    pub async fn create_entry(&self, request: ScheduleRequest, ctx: &MutationContext) -> Result<Receipt, EngineError> {
        let started = Instant::now();
        let result = self.create_entry_inner(&request, ctx).await;
        record_mutation("create", &result, started);
        result
    }

    async fn create_entry_inner(&self, request: &ScheduleRequest, ctx: &MutationContext) -> Result<Receipt, EngineError> {
        let entry = build_entry(Ulid::new(), request)?;
        let catalog = self.catalog.read().await;
        let mut guards = self.lock_days(&[entry.slot.date]).await;

        let receipt = {
            let snap = snapshot(&catalog, &guards);
            validate_candidate(&snap, &entry, None)?;
            build_receipt(&snap, Operation::Created, entry.clone(), ctx)?
        };

        let event = Event::EntryScheduled { entry };
        self.persist_and_apply(&mut guards, &event).await?;
        info!(
            id = %receipt.entry.id,
            kind = %receipt.entry.kind,
            slot = %receipt.entry.slot,
            actor = %ctx.actor,
            "entry created"
        );
        self.notify.publish(&receipt);
        Ok(receipt)
    }

    /// Replace an entry's fields. The kind cannot change; the entry being
    /// edited never conflicts with itself.
    pub async fn update_entry(
        &self,
        id: Ulid,
        request: ScheduleRequest,
        ctx: &MutationContext,
    ) -> Result<Receipt, EngineError> {
        let started = Instant::now();
        let result = self.update_entry_inner(id, &request, ctx).await;
        record_mutation("update", &result, started);
        result
    }

    async fn update_entry_inner(
        &self,
        id: Ulid,
        request: &ScheduleRequest,
        ctx: &MutationContext,
    ) -> Result<Receipt, EngineError> {
        let entry = build_entry(id, request)?;
        let catalog = self.catalog.read().await;
        let (previous_date, mut guards) = self.lock_entry(id, Some(entry.slot.date)).await?;

        let receipt = {
            let snap = snapshot(&catalog, &guards);
            let current = guards
                .iter()
                .find(|g| g.date == previous_date)
                .and_then(|g| g.get(&id))
                .ok_or_else(|| EngineError::NotFound {
                    what: "Jadwal",
                    id: id.to_string(),
                })?;
            if current.kind != entry.kind {
                return Err(EngineError::Invalid(format!(
                    "jenis kegiatan tidak dapat diubah dari {} ke {}",
                    current.kind, entry.kind
                )));
            }
            validate_candidate(&snap, &entry, Some(id))?;
            build_receipt(&snap, Operation::Updated, entry.clone(), ctx)?
        };

        let event = Event::EntryRescheduled { entry, previous_date };
        self.persist_and_apply(&mut guards, &event).await?;
        info!(%id, slot = %receipt.entry.slot, %previous_date, actor = %ctx.actor, "entry updated");
        self.notify.publish(&receipt);
        Ok(receipt)
    }

    pub async fn delete_entry(&self, id: Ulid, ctx: &MutationContext) -> Result<Receipt, EngineError> {
        let started = Instant::now();
        let result = self.delete_entry_inner(id, ctx).await;
        record_mutation("delete", &result, started);
        result
    }

    async fn delete_entry_inner(&self, id: Ulid, ctx: &MutationContext) -> Result<Receipt, EngineError> {
        let catalog = self.catalog.read().await;
        let (date, mut guards) = self.lock_entry(id, None).await?;

        let receipt = {
            let snap = snapshot(&catalog, &guards);
            let entry = guards
                .iter()
                .find_map(|g| g.get(&id))
                .cloned()
                .ok_or_else(|| EngineError::NotFound {
                    what: "Jadwal",
                    id: id.to_string(),
                })?;
            build_receipt(&snap, Operation::Deleted, entry, ctx)?
        };

        let event = Event::EntryDeleted { id, date };
        self.persist_and_apply(&mut guards, &event).await?;
        info!(%id, %date, actor = %ctx.actor, "entry deleted");
        self.notify.publish(&receipt);
        Ok(receipt)
    }

    /// Import many rows as one unit. Either every row is stored or none is;
    /// a rejection lists every failing row.
    pub async fn import_entries(
        &self,
        rows: Vec<ScheduleRequest>,
        ctx: &MutationContext,
    ) -> Result<Vec<Receipt>, EngineError> {
        let started = Instant::now();
        let result = self.import_entries_inner(&rows, ctx).await;
        record_mutation("import", &result, started);
        result
    }

    async fn import_entries_inner(
        &self,
        rows: &[ScheduleRequest],
        ctx: &MutationContext,
    ) -> Result<Vec<Receipt>, EngineError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        if rows.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }

        let built: Vec<Result<ScheduleEntry, EngineError>> =
            rows.iter().map(|r| build_entry(Ulid::new(), r)).collect();
        let dates: Vec<NaiveDate> = built.iter().flatten().map(|e| e.slot.date).collect();

        let catalog = self.catalog.read().await;
        let mut guards = self.lock_days(&dates).await;

        let (entries, receipts) = {
            let snap = snapshot(&catalog, &guards);
            let entries = validate_batch(&snap, built)?;
            let receipts = entries
                .iter()
                .map(|e| build_receipt(&snap, Operation::Imported, e.clone(), ctx))
                .collect::<Result<Vec<_>, _>>()?;
            (entries, receipts)
        };

        let event = Event::BatchScheduled { entries };
        self.persist_and_apply(&mut guards, &event).await?;
        info!(rows = receipts.len(), actor = %ctx.actor, "batch imported");
        for receipt in &receipts {
            self.notify.publish(receipt);
        }
        Ok(receipts)
    }

    /// Run the full validation for a request without storing anything.
    /// `ignore` names an entry to leave out, as an update would.
    pub async fn check_entry(&self, request: ScheduleRequest, ignore: Option<Ulid>) -> Result<ScheduleEntry, EngineError> {
        let started = Instant::now();
        let result = self.check_entry_inner(&request, ignore).await;
        record_mutation("check", &result, started);
        result
    }

    async fn check_entry_inner(&self, request: &ScheduleRequest, ignore: Option<Ulid>) -> Result<ScheduleEntry, EngineError> {
        let entry = build_entry(ignore.unwrap_or_else(Ulid::new), request)?;
        let catalog = self.catalog.read().await;
        let day = self.day(entry.slot.date).read_owned().await;
        let snap = Snapshot::new(&catalog, [&*day]);
        validate_candidate(&snap, &entry, ignore)?;
        Ok(entry)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL as the minimal event list for the current state.
    /// Holds the catalog write lock throughout, so no mutation interleaves.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let catalog = self.catalog.write().await;
        let mut events = catalog.to_events();

        let mut dates: Vec<NaiveDate> = self.days.iter().map(|e| *e.key()).collect();
        dates.sort();
        for date in dates {
            let day = self.day(date);
            let guard = day.read().await;
            events.extend(guard.entries.iter().map(|entry| Event::EntryScheduled { entry: entry.clone() }));
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Infrastructure("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Infrastructure("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Infrastructure(e.to_string()))?;
        drop(catalog);
        info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn require_students(catalog: &Catalog, members: &[Ulid]) -> Result<(), EngineError> {
    match members.iter().find(|id| catalog.student(id).is_none()) {
        Some(missing) => Err(EngineError::NotFound {
            what: "Mahasiswa",
            id: missing.to_string(),
        }),
        None => Ok(()),
    }
}
