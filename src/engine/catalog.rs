use std::collections::{BTreeMap, BTreeSet, HashMap};

use ulid::Ulid;

use crate::model::*;

/// Reference data the engine reads but never schedules: rooms, instructors,
/// courses, students and the cohorts built from them.
#[derive(Debug, Default)]
pub struct Catalog {
    rooms: HashMap<Ulid, Room>,
    instructors: HashMap<Ulid, Instructor>,
    courses: HashMap<String, Course>,
    students: HashMap<Ulid, Student>,
    large_groups: HashMap<Ulid, LargeGroup>,
    large_group_intersessions: HashMap<Ulid, LargeGroupIntersession>,
    small_group_rows: HashMap<Ulid, SmallGroupRow>,
    small_group_intersessions: HashMap<Ulid, SmallGroupIntersession>,
    /// semester → enrolled students
    students_by_semester: BTreeMap<u8, BTreeSet<Ulid>>,
    /// (semester, group name) → row ids
    small_groups_by_name: BTreeMap<(u8, String), BTreeSet<Ulid>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Lookups ──────────────────────────────────────────────

    pub fn room(&self, id: &Ulid) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn instructor(&self, id: &Ulid) -> Option<&Instructor> {
        self.instructors.get(id)
    }

    pub fn course(&self, code: &str) -> Option<&Course> {
        self.courses.get(code)
    }

    pub fn student(&self, id: &Ulid) -> Option<&Student> {
        self.students.get(id)
    }

    /// True if any kind of record already uses `id`.
    pub fn contains_id(&self, id: &Ulid) -> bool {
        self.rooms.contains_key(id)
            || self.instructors.contains_key(id)
            || self.students.contains_key(id)
            || self.large_groups.contains_key(id)
            || self.large_group_intersessions.contains_key(id)
            || self.small_group_rows.contains_key(id)
            || self.small_group_intersessions.contains_key(id)
    }

    pub fn large_group_for_semester(&self, semester: u8) -> Option<&LargeGroup> {
        self.large_groups.values().find(|g| g.semester == semester)
    }

    // ── Cohort membership ────────────────────────────────────

    /// Resolve a cohort reference to its name and members. `None` when the
    /// reference dangles.
    pub fn cohort(&self, reference: &CohortRef) -> Option<Cohort> {
        match reference {
            CohortRef::LargeGroup(id) => {
                let group = self.large_groups.get(id)?;
                let members = self
                    .students_by_semester
                    .get(&group.semester)
                    .cloned()
                    .unwrap_or_default();
                Some(Cohort {
                    reference: *reference,
                    name: format!("Kelompok Besar Semester {}", group.semester),
                    semester: Some(group.semester),
                    members,
                })
            }
            CohortRef::LargeGroupIntersession(id) => {
                let group = self.large_group_intersessions.get(id)?;
                Some(Cohort {
                    reference: *reference,
                    name: group.name.clone(),
                    semester: None,
                    members: group.members.iter().copied().collect(),
                })
            }
            CohortRef::SmallGroup(id) => {
                let row = self.small_group_rows.get(id)?;
                let members = self
                    .small_groups_by_name
                    .get(&(row.semester, row.name.clone()))
                    .into_iter()
                    .flatten()
                    .filter_map(|rid| self.small_group_rows.get(rid))
                    .map(|r| r.student_id)
                    .collect();
                Some(Cohort {
                    reference: *reference,
                    name: format!("{} (Semester {})", row.name, row.semester),
                    semester: Some(row.semester),
                    members,
                })
            }
            CohortRef::SmallGroupIntersession(id) => {
                let group = self.small_group_intersessions.get(id)?;
                Some(Cohort {
                    reference: *reference,
                    name: group.name.clone(),
                    semester: None,
                    members: group.members.iter().copied().collect(),
                })
            }
        }
    }

    /// Every small cohort of a family. Regular groups are reported once per
    /// name (by their lowest row id) and may be narrowed to one semester.
    pub fn small_cohorts(&self, family: CohortFamily, semester: Option<u8>) -> Vec<CohortRef> {
        match family {
            CohortFamily::Regular => self
                .small_groups_by_name
                .iter()
                .filter(|((sem, _), _)| semester.is_none_or(|s| s == *sem))
                .filter_map(|(_, rows)| rows.first().copied())
                .map(CohortRef::SmallGroup)
                .collect(),
            CohortFamily::Intersession => {
                let mut ids: Vec<Ulid> = self.small_group_intersessions.keys().copied().collect();
                ids.sort();
                ids.into_iter().map(CohortRef::SmallGroupIntersession).collect()
            }
        }
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::RoomRegistered(room) => {
                self.rooms.insert(room.id, room.clone());
            }
            Event::InstructorRegistered(instructor) => {
                self.instructors.insert(instructor.id, instructor.clone());
            }
            Event::CourseRegistered(course) => {
                self.courses.insert(course.code.clone(), course.clone());
            }
            Event::StudentEnrolled(student) => {
                if let Some(previous) = self.students.insert(student.id, student.clone())
                    && let Some(set) = self.students_by_semester.get_mut(&previous.semester)
                {
                    set.remove(&student.id);
                }
                self.students_by_semester
                    .entry(student.semester)
                    .or_default()
                    .insert(student.id);
            }
            Event::LargeGroupCreated(group) => {
                self.large_groups.insert(group.id, group.clone());
            }
            Event::LargeGroupIntersessionCreated(group) => {
                self.large_group_intersessions.insert(group.id, group.clone());
            }
            Event::SmallGroupAssigned(row) => {
                self.small_groups_by_name
                    .entry((row.semester, row.name.clone()))
                    .or_default()
                    .insert(row.id);
                self.small_group_rows.insert(row.id, row.clone());
            }
            Event::SmallGroupIntersessionCreated(group) => {
                self.small_group_intersessions.insert(group.id, group.clone());
            }
            Event::EntryScheduled { .. }
            | Event::EntryRescheduled { .. }
            | Event::EntryDeleted { .. }
            | Event::BatchScheduled { .. } => {}
        }
    }

    /// Minimal event list that recreates this catalog.
    pub fn to_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        events.extend(sorted(self.rooms.values(), |r| r.id).map(Event::RoomRegistered));
        events.extend(sorted(self.instructors.values(), |i| i.id).map(Event::InstructorRegistered));
        let mut courses: Vec<&Course> = self.courses.values().collect();
        courses.sort_by(|a, b| a.code.cmp(&b.code));
        events.extend(courses.into_iter().cloned().map(Event::CourseRegistered));
        events.extend(sorted(self.students.values(), |s| s.id).map(Event::StudentEnrolled));
        events.extend(sorted(self.large_groups.values(), |g| g.id).map(Event::LargeGroupCreated));
        events.extend(
            sorted(self.large_group_intersessions.values(), |g| g.id)
                .map(Event::LargeGroupIntersessionCreated),
        );
        events.extend(sorted(self.small_group_rows.values(), |r| r.id).map(Event::SmallGroupAssigned));
        events.extend(
            sorted(self.small_group_intersessions.values(), |g| g.id)
                .map(Event::SmallGroupIntersessionCreated),
        );
        events
    }
}

fn sorted<'a, T: Clone + 'a>(
    items: impl Iterator<Item = &'a T>,
    key: impl Fn(&T) -> Ulid,
) -> impl Iterator<Item = T> {
    let mut v: Vec<&T> = items.collect();
    v.sort_by_key(|item| key(item));
    v.into_iter().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(catalog: &mut Catalog, semester: u8) -> Ulid {
        let id = Ulid::new();
        catalog.apply_event(&Event::StudentEnrolled(Student {
            id,
            name: format!("mhs-{id}"),
            semester,
        }));
        id
    }

    fn assign(catalog: &mut Catalog, name: &str, semester: u8, student_id: Ulid) -> Ulid {
        let id = Ulid::new();
        catalog.apply_event(&Event::SmallGroupAssigned(SmallGroupRow {
            id,
            name: name.into(),
            semester,
            student_id,
        }));
        id
    }

    #[test]
    fn large_group_members_follow_semester() {
        let mut c = Catalog::new();
        let s1 = student(&mut c, 3);
        let s2 = student(&mut c, 3);
        let _other = student(&mut c, 5);
        let gid = Ulid::new();
        c.apply_event(&Event::LargeGroupCreated(LargeGroup { id: gid, semester: 3 }));

        let cohort = c.cohort(&CohortRef::LargeGroup(gid)).unwrap();
        assert_eq!(cohort.members, BTreeSet::from([s1, s2]));
        assert_eq!(cohort.semester, Some(3));
    }

    #[test]
    fn small_group_members_join_rows_by_name_and_semester() {
        let mut c = Catalog::new();
        let a = student(&mut c, 3);
        let b = student(&mut c, 3);
        let x = student(&mut c, 5);
        let row_a = assign(&mut c, "Kelompok 1", 3, a);
        let row_b = assign(&mut c, "Kelompok 1", 3, b);
        // Same name, different semester: a different group.
        assign(&mut c, "Kelompok 1", 5, x);

        let via_a = c.cohort(&CohortRef::SmallGroup(row_a)).unwrap();
        let via_b = c.cohort(&CohortRef::SmallGroup(row_b)).unwrap();
        assert_eq!(via_a.members, BTreeSet::from([a, b]));
        assert_eq!(via_a.members, via_b.members);
    }

    #[test]
    fn dangling_reference_resolves_to_none() {
        let c = Catalog::new();
        assert!(c.cohort(&CohortRef::LargeGroup(Ulid::new())).is_none());
        assert!(c.cohort(&CohortRef::SmallGroupIntersession(Ulid::new())).is_none());
    }

    #[test]
    fn small_cohorts_reported_once_per_group() {
        let mut c = Catalog::new();
        let a = student(&mut c, 3);
        let b = student(&mut c, 3);
        assign(&mut c, "Kelompok 1", 3, a);
        assign(&mut c, "Kelompok 1", 3, b);
        assign(&mut c, "Kelompok 2", 3, b);
        assign(&mut c, "Kelompok 1", 5, a);

        assert_eq!(c.small_cohorts(CohortFamily::Regular, Some(3)).len(), 2);
        assert_eq!(c.small_cohorts(CohortFamily::Regular, None).len(), 3);
        assert!(c.small_cohorts(CohortFamily::Intersession, None).is_empty());
    }

    #[test]
    fn re_enrolling_moves_student_between_semesters() {
        let mut c = Catalog::new();
        let id = student(&mut c, 3);
        c.apply_event(&Event::StudentEnrolled(Student {
            id,
            name: "pindah".into(),
            semester: 5,
        }));
        let g3 = Ulid::new();
        let g5 = Ulid::new();
        c.apply_event(&Event::LargeGroupCreated(LargeGroup { id: g3, semester: 3 }));
        c.apply_event(&Event::LargeGroupCreated(LargeGroup { id: g5, semester: 5 }));
        assert!(c.cohort(&CohortRef::LargeGroup(g3)).unwrap().members.is_empty());
        assert!(c.cohort(&CohortRef::LargeGroup(g5)).unwrap().members.contains(&id));
    }

    #[test]
    fn events_rebuild_equivalent_catalog() {
        let mut c = Catalog::new();
        let a = student(&mut c, 1);
        assign(&mut c, "Kelompok 3", 1, a);
        c.apply_event(&Event::RoomRegistered(Room {
            id: Ulid::new(),
            name: "R.1".into(),
            capacity: 40,
        }));

        let mut rebuilt = Catalog::new();
        for e in c.to_events() {
            rebuilt.apply_event(&e);
        }
        assert_eq!(rebuilt.to_events(), c.to_events());
    }
}
