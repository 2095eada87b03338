//! Common type definitions and permission system types.
//!
//! This module defines:
//! - Type aliases for entity IDs (CourseId, GroupId, etc.)
//! - Resource and operation enums used by the role-based access checks
//!
//! # ID Types
//!
//! Every row is keyed by a database-assigned UUID:
//!
//! - [`UserId`]: Administrative account
//! - [`CourseId`]: Training course ("capacitación")
//! - [`GroupId`]: Scheduled instance of a course ("grupo")
//! - [`GroupDayId`]: One session day of a group
//! - [`DealerId`]: Dealer ("concesionario")
//! - [`MechanicId`]: Dealer staff member
//! - [`EnrollmentId`]: One reserved seat in a group ("inscripción")
//!
//! # Permission System
//!
//! - [`Resource`]: What entity type is being accessed
//! - [`Operation`]: What action is being performed
//! - [`Permission`]: Authorization requirement combining both
//!
//! ```ignore
//! use capctl::types::{Operation, Permission, Resource};
//!
//! let required = Permission::Allow(Resource::Courses, Operation::DeleteAll);
//! ```

use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;
pub type CourseId = Uuid;
pub type GroupId = Uuid;
pub type GroupDayId = Uuid;
pub type DealerId = Uuid;
pub type MechanicId = Uuid;
pub type EnrollmentId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAll,
    ReadAll,
    UpdateAll,
    DeleteAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Courses,
    Groups,
    Enrollments,
    Dealers,
    Mechanics,
    Reports,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    Allow(Resource, Operation),
    Any(Vec<Permission>),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAll => write!(f, "Create"),
            Operation::ReadAll => write!(f, "Read"),
            Operation::UpdateAll => write!(f, "Update"),
            Operation::DeleteAll => write!(f, "Delete"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Users => "users",
            Resource::Courses => "courses",
            Resource::Groups => "groups",
            Resource::Enrollments => "enrollments",
            Resource::Dealers => "dealers",
            Resource::Mechanics => "mechanics",
            Resource::Reports => "reports",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }

    #[test]
    fn test_operation_display_drops_scope() {
        assert_eq!(Operation::DeleteAll.to_string(), "Delete");
        assert_eq!(Resource::Enrollments.to_string(), "enrollments");
    }
}
