//! Shared catalog for the decision-function tests.

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::time::TimeOfDay;

use super::catalog::Catalog;
use super::snapshot::Snapshot;

pub(crate) struct Fixture {
    pub catalog: Catalog,
    pub days: Vec<DayState>,
    pub date: NaiveDate,
    /// capacity 30
    pub room_5: Ulid,
    /// capacity 200
    pub aula: Ulid,
    /// capacity 0, for the no-cohort sanity rule
    pub closet: Ulid,
    pub dr_a: Ulid,
    pub dr_b: Ulid,
    pub coordinator_1: Ulid,
    pub coordinator_2: Ulid,
    pub large_s3: CohortRef,
    pub large_s5: CohortRef,
    pub small_s3_a: CohortRef,
    pub small_s3_b: CohortRef,
    pub large_intersession: CohortRef,
    pub small_intersession: CohortRef,
    /// Intersession roster sharing a student only with `small_intersession`.
    pub outsider_roster: CohortRef,
}

impl Fixture {
    pub fn new() -> Self {
        let mut catalog = Catalog::new();
        let mut apply = |e: Event| catalog.apply_event(&e);

        let room_5 = Ulid::new();
        let aula = Ulid::new();
        let closet = Ulid::new();
        apply(Event::RoomRegistered(Room { id: room_5, name: "Ruang 5".into(), capacity: 30 }));
        apply(Event::RoomRegistered(Room { id: aula, name: "Aula".into(), capacity: 200 }));
        apply(Event::RoomRegistered(Room { id: closet, name: "Gudang".into(), capacity: 0 }));

        let dr_a = Ulid::new();
        let dr_b = Ulid::new();
        let coordinator_1 = Ulid::new();
        let coordinator_2 = Ulid::new();
        for (id, name, role) in [
            (dr_a, "dr. Andi", InstructorRole::Regular),
            (dr_b, "dr. Budi", InstructorRole::Regular),
            (coordinator_1, "dr. Citra", InstructorRole::Coordinator),
            (coordinator_2, "dr. Dewi", InstructorRole::Coordinator),
        ] {
            apply(Event::InstructorRegistered(Instructor { id, name: name.into(), role }));
        }

        for (code, semester) in [("KB301", Some(3)), ("PBL301", Some(3)), ("PBL501", Some(5)), ("INT01", None)] {
            apply(Event::CourseRegistered(Course {
                code: code.into(),
                name: code.into(),
                semester,
            }));
        }

        let enroll = |apply: &mut dyn FnMut(Event), semester: u8| {
            let id = Ulid::new();
            apply(Event::StudentEnrolled(Student {
                id,
                name: format!("mhs-{id}"),
                semester,
            }));
            id
        };
        let a: Vec<Ulid> = (0..2).map(|_| enroll(&mut apply, 3)).collect();
        let b: Vec<Ulid> = (0..2).map(|_| enroll(&mut apply, 3)).collect();
        let _c: Vec<Ulid> = (0..2).map(|_| enroll(&mut apply, 5)).collect();
        let x1 = enroll(&mut apply, 1);
        let o1 = enroll(&mut apply, 7);

        let large_s3_id = Ulid::new();
        let large_s5_id = Ulid::new();
        apply(Event::LargeGroupCreated(LargeGroup { id: large_s3_id, semester: 3 }));
        apply(Event::LargeGroupCreated(LargeGroup { id: large_s5_id, semester: 5 }));

        let mut first_rows = Vec::new();
        for (name, members) in [("Kelompok 1", &a), ("Kelompok 2", &b)] {
            let mut first = None;
            for student_id in members {
                let id = Ulid::new();
                first.get_or_insert(id);
                apply(Event::SmallGroupAssigned(SmallGroupRow {
                    id,
                    name: name.into(),
                    semester: 3,
                    student_id: *student_id,
                }));
            }
            first_rows.push(first.unwrap());
        }

        let large_intersession_id = Ulid::new();
        apply(Event::LargeGroupIntersessionCreated(LargeGroupIntersession {
            id: large_intersession_id,
            name: "Antara 2024".into(),
            members: vec![a[0], x1],
        }));
        let small_intersession_id = Ulid::new();
        apply(Event::SmallGroupIntersessionCreated(SmallGroupIntersession {
            id: small_intersession_id,
            name: "Antara Kelompok A".into(),
            members: vec![x1, o1],
        }));
        let outsider_id = Ulid::new();
        apply(Event::LargeGroupIntersessionCreated(LargeGroupIntersession {
            id: outsider_id,
            name: "Antara Susulan".into(),
            members: vec![o1],
        }));

        let date = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        Self {
            catalog,
            days: vec![DayState::new(date)],
            date,
            room_5,
            aula,
            closet,
            dr_a,
            dr_b,
            coordinator_1,
            coordinator_2,
            large_s3: CohortRef::LargeGroup(large_s3_id),
            large_s5: CohortRef::LargeGroup(large_s5_id),
            small_s3_a: CohortRef::SmallGroup(first_rows[0]),
            small_s3_b: CohortRef::SmallGroup(first_rows[1]),
            large_intersession: CohortRef::LargeGroupIntersession(large_intersession_id),
            small_intersession: CohortRef::SmallGroupIntersession(small_intersession_id),
            outsider_roster: CohortRef::LargeGroupIntersession(outsider_id),
        }
    }

    pub fn all_cohorts(&self) -> Vec<CohortRef> {
        vec![
            self.large_s3,
            self.large_s5,
            self.small_s3_a,
            self.small_s3_b,
            self.large_intersession,
            self.small_intersession,
            self.outsider_roster,
        ]
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot::new(&self.catalog, self.days.iter())
    }

    /// Bare entry on the fixture date; callers fill in resources.
    pub fn entry(&self, kind: ActivityKind, start: &str, end: &str) -> ScheduleEntry {
        let course_code = match kind {
            ActivityKind::Pbl | ActivityKind::JournalReading => "PBL301",
            _ => "KB301",
        };
        ScheduleEntry {
            id: Ulid::new(),
            kind,
            course_code: course_code.into(),
            slot: Slot::new(
                self.date,
                TimeOfDay::parse(start).unwrap(),
                TimeOfDay::parse(end).unwrap(),
            ),
            sessions: None,
            room_id: None,
            instructor_ids: vec![],
            cohort: None,
            label: None,
        }
    }

    pub fn add(&mut self, entry: ScheduleEntry) {
        let date = entry.slot.date;
        match self.days.iter_mut().find(|d| d.date == date) {
            Some(day) => day.insert_entry(entry),
            None => {
                let mut day = DayState::new(date);
                day.insert_entry(entry);
                self.days.push(day);
            }
        }
    }
}
