use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::time::TimeOfDay;

/// One day's half-open window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub date: NaiveDate,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Slot {
    pub fn new(date: NaiveDate, start: TimeOfDay, end: TimeOfDay) -> Self {
        debug_assert!(start < end, "Slot start must be before end");
        Self { date, start, end }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{}", self.date, self.start, self.end)
    }
}

// ── Activity kinds ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    LargeLecture,
    Pbl,
    Practicum,
    JournalReading,
    SpecialAgenda,
    PlenarySeminar,
}

impl ActivityKind {
    /// Canonical order; conflict scans and reports follow it.
    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::LargeLecture,
        ActivityKind::Pbl,
        ActivityKind::Practicum,
        ActivityKind::JournalReading,
        ActivityKind::SpecialAgenda,
        ActivityKind::PlenarySeminar,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ActivityKind::LargeLecture => "Kuliah Besar",
            ActivityKind::Pbl => "PBL",
            ActivityKind::Practicum => "Praktikum",
            ActivityKind::JournalReading => "Jurnal Reading",
            ActivityKind::SpecialAgenda => "Agenda Khusus",
            ActivityKind::PlenarySeminar => "Seminar Pleno",
        }
    }

    pub fn descriptor(self) -> &'static KindDescriptor {
        match self {
            ActivityKind::LargeLecture => &LARGE_LECTURE,
            ActivityKind::Pbl => &PBL,
            ActivityKind::Practicum => &PRACTICUM,
            ActivityKind::JournalReading => &JOURNAL_READING,
            ActivityKind::SpecialAgenda => &SPECIAL_AGENDA,
            ActivityKind::PlenarySeminar => &PLENARY_SEMINAR,
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How many instructors an activity kind takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructorRule {
    ExactlyOne,
    AtLeastOne,
    Any,
}

impl InstructorRule {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            InstructorRule::ExactlyOne => count == 1,
            InstructorRule::AtLeastOne => count >= 1,
            InstructorRule::Any => true,
        }
    }

    /// Instructors counted toward room headcount.
    pub fn headcount(self, assigned: usize) -> u32 {
        match self {
            InstructorRule::ExactlyOne => 1,
            InstructorRule::AtLeastOne | InstructorRule::Any => assigned as u32,
        }
    }
}

/// Per-kind rules. One table replaces six hand-written validation paths.
#[derive(Debug)]
pub struct KindDescriptor {
    pub instructors: InstructorRule,
    pub room_required: bool,
    pub cohorts: &'static [CohortKind],
    pub cohort_optional: bool,
    /// Cohort collisions are only compared within the same curriculum semester.
    pub curriculum_scoped: bool,
    pub max_coordinators: Option<usize>,
}

impl KindDescriptor {
    pub fn allows_cohort(&self, cohort: Option<&CohortRef>) -> bool {
        match cohort {
            None => self.cohort_optional,
            Some(c) => self.cohorts.contains(&c.kind()),
        }
    }
}

const LARGE: &[CohortKind] = &[CohortKind::LargeGroup, CohortKind::LargeGroupIntersession];
const SMALL: &[CohortKind] = &[CohortKind::SmallGroup, CohortKind::SmallGroupIntersession];
const ANY_COHORT: &[CohortKind] = &[
    CohortKind::LargeGroup,
    CohortKind::LargeGroupIntersession,
    CohortKind::SmallGroup,
    CohortKind::SmallGroupIntersession,
];

static LARGE_LECTURE: KindDescriptor = KindDescriptor {
    instructors: InstructorRule::AtLeastOne,
    room_required: true,
    cohorts: LARGE,
    cohort_optional: false,
    curriculum_scoped: false,
    max_coordinators: None,
};

static PBL: KindDescriptor = KindDescriptor {
    instructors: InstructorRule::ExactlyOne,
    room_required: true,
    cohorts: SMALL,
    cohort_optional: false,
    curriculum_scoped: true,
    max_coordinators: None,
};

static PRACTICUM: KindDescriptor = KindDescriptor {
    instructors: InstructorRule::AtLeastOne,
    room_required: true,
    cohorts: ANY_COHORT,
    cohort_optional: false,
    curriculum_scoped: true,
    max_coordinators: None,
};

static JOURNAL_READING: KindDescriptor = KindDescriptor {
    instructors: InstructorRule::ExactlyOne,
    room_required: true,
    cohorts: SMALL,
    cohort_optional: false,
    curriculum_scoped: true,
    max_coordinators: None,
};

static SPECIAL_AGENDA: KindDescriptor = KindDescriptor {
    instructors: InstructorRule::Any,
    room_required: false,
    cohorts: LARGE,
    cohort_optional: true,
    curriculum_scoped: false,
    max_coordinators: None,
};

static PLENARY_SEMINAR: KindDescriptor = KindDescriptor {
    instructors: InstructorRule::AtLeastOne,
    room_required: true,
    cohorts: LARGE,
    cohort_optional: false,
    curriculum_scoped: false,
    max_coordinators: Some(1),
};

// ── Cohorts ──────────────────────────────────────────────────────

/// Reference to a student cohort. Entries with no cohort carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortRef {
    LargeGroup(Ulid),
    LargeGroupIntersession(Ulid),
    /// Any row id of the small group; membership joins rows by name + semester.
    SmallGroup(Ulid),
    SmallGroupIntersession(Ulid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CohortKind {
    LargeGroup,
    LargeGroupIntersession,
    SmallGroup,
    SmallGroupIntersession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CohortFamily {
    Regular,
    Intersession,
}

impl CohortRef {
    pub fn id(&self) -> Ulid {
        match self {
            CohortRef::LargeGroup(id)
            | CohortRef::LargeGroupIntersession(id)
            | CohortRef::SmallGroup(id)
            | CohortRef::SmallGroupIntersession(id) => *id,
        }
    }

    pub fn kind(&self) -> CohortKind {
        match self {
            CohortRef::LargeGroup(_) => CohortKind::LargeGroup,
            CohortRef::LargeGroupIntersession(_) => CohortKind::LargeGroupIntersession,
            CohortRef::SmallGroup(_) => CohortKind::SmallGroup,
            CohortRef::SmallGroupIntersession(_) => CohortKind::SmallGroupIntersession,
        }
    }

    pub fn family(&self) -> CohortFamily {
        match self {
            CohortRef::LargeGroup(_) | CohortRef::SmallGroup(_) => CohortFamily::Regular,
            CohortRef::LargeGroupIntersession(_) | CohortRef::SmallGroupIntersession(_) => {
                CohortFamily::Intersession
            }
        }
    }

    pub fn is_large(&self) -> bool {
        matches!(self, CohortRef::LargeGroup(_) | CohortRef::LargeGroupIntersession(_))
    }
}

/// A cohort with its membership resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cohort {
    pub reference: CohortRef,
    pub name: String,
    pub semester: Option<u8>,
    pub members: std::collections::BTreeSet<Ulid>,
}

// ── Reference data ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructorRole {
    #[default]
    Regular,
    Coordinator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
    pub id: Ulid,
    pub name: String,
    #[serde(default)]
    pub role: InstructorRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: Ulid,
    pub name: String,
    pub semester: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub code: String,
    pub name: String,
    /// `None` for intersession courses, which sit outside the curriculum semesters.
    pub semester: Option<u8>,
}

/// Whole-semester cohort; members are every student enrolled in the semester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LargeGroup {
    pub id: Ulid,
    pub semester: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LargeGroupIntersession {
    pub id: Ulid,
    pub name: String,
    pub members: Vec<Ulid>,
}

/// One membership row of a regular small group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmallGroupRow {
    pub id: Ulid,
    pub name: String,
    pub semester: u8,
    pub student_id: Ulid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmallGroupIntersession {
    pub id: Ulid,
    pub name: String,
    pub members: Vec<Ulid>,
}

// ── Schedule entries ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: Ulid,
    pub kind: ActivityKind,
    pub course_code: String,
    pub slot: Slot,
    pub sessions: Option<u32>,
    pub room_id: Option<Ulid>,
    pub instructor_ids: Vec<Ulid>,
    pub cohort: Option<CohortRef>,
    pub label: Option<String>,
}

/// Mutation payload as it arrives from the caller. Field presence and types
/// are already checked; times are still in caller format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub kind: ActivityKind,
    pub course_code: String,
    pub date: String,
    pub start: String,
    /// May be omitted when `sessions` is given.
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub sessions: Option<u32>,
    #[serde(default)]
    pub room_id: Option<Ulid>,
    #[serde(default)]
    pub instructor_ids: Vec<Ulid>,
    #[serde(default)]
    pub cohort: Option<CohortRef>,
    #[serde(default)]
    pub label: Option<String>,
}

/// All entries on one date, sorted by `slot.start`.
#[derive(Debug, Clone)]
pub struct DayState {
    pub date: NaiveDate,
    pub entries: Vec<ScheduleEntry>,
}

impl DayState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            entries: Vec::new(),
        }
    }

    /// Insert entry maintaining sort order by slot.start.
    pub fn insert_entry(&mut self, entry: ScheduleEntry) {
        debug_assert_eq!(entry.slot.date, self.date);
        let pos = self
            .entries
            .partition_point(|e| e.slot.start <= entry.slot.start);
        self.entries.insert(pos, entry);
    }

    pub fn remove_entry(&mut self, id: Ulid) -> Option<ScheduleEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn get(&self, id: &Ulid) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.id == *id)
    }

    /// Entries whose slot overlaps the window `[start, end)`.
    /// Uses binary search to skip entries starting at or after `end`.
    pub fn overlapping(&self, start: TimeOfDay, end: TimeOfDay) -> impl Iterator<Item = &ScheduleEntry> {
        let right_bound = self.entries.partition_point(|e| e.slot.start < end);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.slot.end > start)
    }
}

/// WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomRegistered(Room),
    InstructorRegistered(Instructor),
    CourseRegistered(Course),
    StudentEnrolled(Student),
    LargeGroupCreated(LargeGroup),
    LargeGroupIntersessionCreated(LargeGroupIntersession),
    SmallGroupAssigned(SmallGroupRow),
    SmallGroupIntersessionCreated(SmallGroupIntersession),
    EntryScheduled {
        entry: ScheduleEntry,
    },
    EntryRescheduled {
        entry: ScheduleEntry,
        previous_date: NaiveDate,
    },
    EntryDeleted {
        id: Ulid,
        date: NaiveDate,
    },
    /// A whole import batch; one record so the batch is all-or-nothing on replay.
    BatchScheduled {
        entries: Vec<ScheduleEntry>,
    },
}

impl Event {
    pub fn is_catalog(&self) -> bool {
        !matches!(
            self,
            Event::EntryScheduled { .. }
                | Event::EntryRescheduled { .. }
                | Event::EntryDeleted { .. }
                | Event::BatchScheduled { .. }
        )
    }
}

// ── Mutation results ─────────────────────────────────────────────

/// Caller-supplied identity for audit and notification authorship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationContext {
    pub actor: String,
}

impl MutationContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self { actor: actor.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Created,
    Updated,
    Deleted,
    Imported,
}

/// What a successful mutation hands to the audit and notification collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub operation: Operation,
    pub entry: ScheduleEntry,
    pub affected_instructors: Vec<Ulid>,
    pub affected_students: Vec<Ulid>,
    pub actor: String,
}
