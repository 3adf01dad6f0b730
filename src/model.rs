use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Parent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "parent" => Some(Role::Parent),
            _ => None,
        }
    }

    /// Admin and teacher are the staff roles allowed to write academic records.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }
}

/// An already-authenticated caller. Credentials are checked by the host process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn require_admin(&self, action: &str) -> ServiceResult<()> {
        if self.role == Role::Admin {
            return Ok(());
        }
        Err(ServiceError::forbidden(format!("only admin can {action}")))
    }

    pub fn require_staff(&self, action: &str) -> ServiceResult<()> {
        if self.role.is_staff() {
            return Ok(());
        }
        Err(ServiceError::forbidden(format!(
            "only admin or teacher can {action}"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }

    /// Exact, case-sensitive match on the two stored spellings.
    pub fn parse(raw: &str) -> ServiceResult<AttendanceStatus> {
        match raw {
            "Present" => Ok(AttendanceStatus::Present),
            "Absent" => Ok(AttendanceStatus::Absent),
            other => Err(ServiceError::new(
                ErrorKind::InvalidStatus,
                "invalid attendance status",
            )
            .with_details(serde_json::json!({ "status": other }))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub class: String,
    pub roll_no: Option<i64>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub date: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub id: String,
    pub student_id: String,
    pub amount: f64,
    pub due_date: Option<String>,
    pub paid: bool,
    pub paid_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Salary {
    pub id: String,
    pub teacher_id: String,
    pub month: Option<String>,
    pub amount: f64,
    pub paid: bool,
    pub paid_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: String,
    pub student_id: String,
    pub exam: String,
    pub subject: String,
    pub marks: f64,
    pub totalmarks: f64,
    pub grade: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: String,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAdmission {
    pub id: String,
    pub student_name: String,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub dob: Option<String>,
    pub mobile_number: Option<String>,
    pub aadhar_number: Option<String>,
    pub permanent_address: Option<String>,
    pub father_occupation: Option<String>,
    pub last_institution: Option<String>,
    pub religion: Option<String>,
    pub class_applied: String,
    pub parent_email: Option<String>,
    pub photo_url: Option<String>,
    pub submitted_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub user_id: Option<String>,
    pub created_at: String,
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
