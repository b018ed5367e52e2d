/// Rows in one import batch.
pub const MAX_BATCH_SIZE: usize = 500;

/// Instructors assigned to a single entry.
pub const MAX_INSTRUCTORS_PER_ENTRY: usize = 32;

/// Room, instructor, student, course and group names.
pub const MAX_NAME_LEN: usize = 256;

pub const MAX_COURSE_CODE_LEN: usize = 64;

/// Free-text label on an entry.
pub const MAX_LABEL_LEN: usize = 1024;

/// Students listed on one intersession roster.
pub const MAX_ROSTER_SIZE: usize = 2_000;

pub const MAX_SESSIONS: u32 = 12;

/// Length of one teaching session; a request with `sessions` and no end time
/// runs for `sessions * SESSION_MINUTES`.
pub const SESSION_MINUTES: u32 = 50;

/// Widest date range an agenda query may cover.
pub const MAX_AGENDA_DAYS: i64 = 366;

/// Largest WAL frame payload. A full import batch or a maximal roster stays
/// far below it; a larger length prefix can only come from a damaged tail.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
