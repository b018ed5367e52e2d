//! JSON-lines front end: one command object per input line, one response
//! object per output line.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::{Engine, EngineError, RejectionKind};
use crate::model::*;
use crate::time::parse_date;

fn default_actor() -> String {
    "system".into()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    RegisterRoom(Room),
    RegisterInstructor(Instructor),
    RegisterCourse(Course),
    EnrollStudent(Student),
    CreateLargeGroup(LargeGroup),
    CreateLargeGroupIntersession(LargeGroupIntersession),
    AssignSmallGroup(SmallGroupRow),
    CreateSmallGroupIntersession(SmallGroupIntersession),
    Create {
        request: ScheduleRequest,
        #[serde(default = "default_actor")]
        actor: String,
    },
    Update {
        id: Ulid,
        request: ScheduleRequest,
        #[serde(default = "default_actor")]
        actor: String,
    },
    Delete {
        id: Ulid,
        #[serde(default = "default_actor")]
        actor: String,
    },
    Import {
        rows: Vec<ScheduleRequest>,
        #[serde(default = "default_actor")]
        actor: String,
    },
    Check {
        request: ScheduleRequest,
        #[serde(default)]
        ignore: Option<Ulid>,
    },
    EntriesOn {
        date: String,
    },
    Entry {
        id: Ulid,
    },
    InstructorAgenda {
        instructor: Ulid,
        from: String,
        to: String,
    },
    StudentAgenda {
        student: Ulid,
        from: String,
        to: String,
    },
    Compact,
}

impl Command {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Command::RegisterRoom(_) => "register_room",
            Command::RegisterInstructor(_) => "register_instructor",
            Command::RegisterCourse(_) => "register_course",
            Command::EnrollStudent(_) => "enroll_student",
            Command::CreateLargeGroup(_) => "create_large_group",
            Command::CreateLargeGroupIntersession(_) => "create_large_group_intersession",
            Command::AssignSmallGroup(_) => "assign_small_group",
            Command::CreateSmallGroupIntersession(_) => "create_small_group_intersession",
            Command::Create { .. } => "create",
            Command::Update { .. } => "update",
            Command::Delete { .. } => "delete",
            Command::Import { .. } => "import",
            Command::Check { .. } => "check",
            Command::EntriesOn { .. } => "entries_on",
            Command::Entry { .. } => "entry",
            Command::InstructorAgenda { .. } => "instructor_agenda",
            Command::StudentAgenda { .. } => "student_agenda",
            Command::Compact => "compact",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowRejection {
    pub row: usize,
    pub kind: RejectionKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Accepted {
        #[serde(skip_serializing_if = "serde_json::Value::is_null")]
        result: serde_json::Value,
    },
    Rejected {
        kind: RejectionKind,
        message: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        rows: Vec<RowRejection>,
    },
    Error {
        message: String,
    },
}

impl Response {
    fn accepted(value: impl Serialize) -> Response {
        match serde_json::to_value(value) {
            Ok(result) => Response::Accepted { result },
            Err(e) => Response::Error {
                message: format!("failed to encode result: {e}"),
            },
        }
    }

    fn from_error(error: EngineError) -> Response {
        let Some(rejection) = error.rejection() else {
            return Response::Error {
                message: error.to_string(),
            };
        };
        let rows = match &error {
            EngineError::BatchRejected(rows) => rows
                .iter()
                .filter_map(|r| {
                    r.error.rejection().map(|rej| RowRejection {
                        row: r.row,
                        kind: rej.kind,
                        message: rej.reason,
                    })
                })
                .collect(),
            _ => Vec::new(),
        };
        Response::Rejected {
            kind: rejection.kind,
            message: rejection.reason,
            rows,
        }
    }

    fn from_result<T: Serialize>(result: Result<T, EngineError>) -> Response {
        match result {
            Ok(value) => Response::accepted(value),
            Err(e) => Response::from_error(e),
        }
    }
}

pub async fn handle(engine: &Engine, command: Command) -> Response {
    match command {
        Command::RegisterRoom(room) => Response::from_result(engine.register_room(room).await),
        Command::RegisterInstructor(i) => Response::from_result(engine.register_instructor(i).await),
        Command::RegisterCourse(c) => Response::from_result(engine.register_course(c).await),
        Command::EnrollStudent(s) => Response::from_result(engine.enroll_student(s).await),
        Command::CreateLargeGroup(g) => Response::from_result(engine.create_large_group(g).await),
        Command::CreateLargeGroupIntersession(g) => {
            Response::from_result(engine.create_large_group_intersession(g).await)
        }
        Command::AssignSmallGroup(row) => Response::from_result(engine.assign_small_group(row).await),
        Command::CreateSmallGroupIntersession(g) => {
            Response::from_result(engine.create_small_group_intersession(g).await)
        }
        Command::Create { request, actor } => {
            Response::from_result(engine.create_entry(request, &MutationContext::new(actor)).await)
        }
        Command::Update { id, request, actor } => {
            Response::from_result(engine.update_entry(id, request, &MutationContext::new(actor)).await)
        }
        Command::Delete { id, actor } => {
            Response::from_result(engine.delete_entry(id, &MutationContext::new(actor)).await)
        }
        Command::Import { rows, actor } => {
            Response::from_result(engine.import_entries(rows, &MutationContext::new(actor)).await)
        }
        Command::Check { request, ignore } => Response::from_result(engine.check_entry(request, ignore).await),
        Command::EntriesOn { date } => match parse_date(&date) {
            Ok(date) => Response::accepted(engine.entries_on(date).await),
            Err(e) => Response::from_error(e.into()),
        },
        Command::Entry { id } => Response::from_result(engine.entry(id).await),
        Command::InstructorAgenda { instructor, from, to } => match parse_range(&from, &to) {
            Ok((from, to)) => Response::from_result(engine.instructor_agenda(instructor, from, to).await),
            Err(e) => Response::from_error(e),
        },
        Command::StudentAgenda { student, from, to } => match parse_range(&from, &to) {
            Ok((from, to)) => Response::from_result(engine.student_agenda(student, from, to).await),
            Err(e) => Response::from_error(e),
        },
        Command::Compact => Response::from_result(engine.compact_wal().await),
    }
}

fn parse_range(from: &str, to: &str) -> Result<(chrono::NaiveDate, chrono::NaiveDate), EngineError> {
    Ok((parse_date(from)?, parse_date(to)?))
}

/// Decode and run one input line. Malformed input is a rejection, not an error.
pub async fn handle_line(engine: &Engine, line: &str) -> Response {
    let command: Command = match serde_json::from_str(line) {
        Ok(c) => c,
        Err(e) => {
            return Response::Rejected {
                kind: RejectionKind::Invalid,
                message: format!("perintah tidak valid: {e}"),
                rows: Vec::new(),
            };
        }
    };
    let label = command.label();
    let response = handle(engine, command).await;
    tracing::debug!(command = label, status = response.status(), "handled");
    response
}

impl Response {
    pub fn status(&self) -> &'static str {
        match self {
            Response::Accepted { .. } => "accepted",
            Response::Rejected { .. } => "rejected",
            Response::Error { .. } => "error",
        }
    }
}
