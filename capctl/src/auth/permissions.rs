//! Role-based permissions.
//!
//! | Role            | Grants                                                                |
//! |-----------------|-----------------------------------------------------------------------|
//! | `SuperAdmin`    | everything                                                            |
//! | `CourseManager` | courses, groups, enrollments; read reports, dealers and mechanics     |
//! | `DealerManager` | dealers, mechanics; read enrollments, courses and groups              |
//! | `ReportViewer`  | read everything except users                                          |

use crate::{
    AppState,
    api::models::users::{CurrentUser, Role},
    errors::Error,
    types::{Operation, Permission, Resource},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use std::{marker::PhantomData, ops::Deref};

const ALL_OPERATIONS: [Operation; 4] = [
    Operation::CreateAll,
    Operation::ReadAll,
    Operation::UpdateAll,
    Operation::DeleteAll,
];

/// Whether `role` alone allows `operation` on `resource`
pub fn role_allows(role: Role, resource: Resource, operation: Operation) -> bool {
    use Resource::*;

    match role {
        Role::SuperAdmin => true,
        Role::CourseManager => match resource {
            Courses | Groups | Enrollments => ALL_OPERATIONS.contains(&operation),
            Reports | Dealers | Mechanics => operation == Operation::ReadAll,
            Users => false,
        },
        Role::DealerManager => match resource {
            Dealers | Mechanics => ALL_OPERATIONS.contains(&operation),
            Enrollments | Courses | Groups => operation == Operation::ReadAll,
            Reports | Users => false,
        },
        Role::ReportViewer => resource != Users && operation == Operation::ReadAll,
    }
}

pub fn has_permission(user: &CurrentUser, resource: Resource, operation: Operation) -> bool {
    user.roles.iter().any(|role| role_allows(*role, resource, operation))
}

/// True when any single grant inside `permission` is satisfied
pub fn satisfies(user: &CurrentUser, permission: &Permission) -> bool {
    match permission {
        Permission::Allow(resource, operation) => has_permission(user, *resource, *operation),
        Permission::Any(options) => options.iter().any(|p| satisfies(user, p)),
    }
}

/// Type-level resource markers for [`RequiresPermission`]
pub mod resource {
    use crate::types::Resource;

    pub trait ResourceMarker: Send + Sync + 'static {
        const RESOURCE: Resource;
    }

    macro_rules! resources {
        ($($name:ident),*) => {
            $(
                pub struct $name;
                impl ResourceMarker for $name {
                    const RESOURCE: Resource = Resource::$name;
                }
            )*
        };
    }

    resources!(Users, Courses, Groups, Enrollments, Dealers, Mechanics, Reports);
}

/// Type-level operation markers for [`RequiresPermission`]
pub mod operation {
    use crate::types::Operation;

    pub trait OperationMarker: Send + Sync + 'static {
        const OPERATION: Operation;
    }

    macro_rules! operations {
        ($($name:ident),*) => {
            $(
                pub struct $name;
                impl OperationMarker for $name {
                    const OPERATION: Operation = Operation::$name;
                }
            )*
        };
    }

    operations!(CreateAll, ReadAll, UpdateAll, DeleteAll);
}

/// Extractor that authenticates the caller and checks one permission before the handler runs.
///
/// Derefs to the [`CurrentUser`].
pub struct RequiresPermission<R, O> {
    user: CurrentUser,
    _marker: PhantomData<fn() -> (R, O)>,
}

impl<R, O> RequiresPermission<R, O> {
    pub fn into_inner(self) -> CurrentUser {
        self.user
    }
}

impl<R, O> Deref for RequiresPermission<R, O> {
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: resource::ResourceMarker,
    O: operation::OperationMarker,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if !has_permission(&user, R::RESOURCE, O::OPERATION) {
            tracing::debug!(user_id = %user.id, resource = %R::RESOURCE, operation = %O::OPERATION, "Permission denied");
            return Err(Error::InsufficientPermissions {
                required: Permission::Allow(R::RESOURCE, O::OPERATION),
                action: O::OPERATION,
                resource: R::RESOURCE.to_string(),
            });
        }

        Ok(Self {
            user,
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(roles: Vec<Role>) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "x@example.com".to_string(),
            display_name: None,
            roles,
        }
    }

    #[test]
    fn test_super_admin_can_do_everything() {
        let admin = user(vec![Role::SuperAdmin]);
        assert!(has_permission(&admin, Resource::Users, Operation::DeleteAll));
        assert!(has_permission(&admin, Resource::Reports, Operation::ReadAll));
    }

    #[test]
    fn test_course_manager() {
        let manager = user(vec![Role::CourseManager]);
        assert!(has_permission(&manager, Resource::Courses, Operation::DeleteAll));
        assert!(has_permission(&manager, Resource::Enrollments, Operation::UpdateAll));
        assert!(has_permission(&manager, Resource::Reports, Operation::ReadAll));
        assert!(!has_permission(&manager, Resource::Dealers, Operation::CreateAll));
        assert!(!has_permission(&manager, Resource::Users, Operation::ReadAll));
    }

    #[test]
    fn test_dealer_manager() {
        let manager = user(vec![Role::DealerManager]);
        assert!(has_permission(&manager, Resource::Mechanics, Operation::CreateAll));
        assert!(has_permission(&manager, Resource::Enrollments, Operation::ReadAll));
        assert!(!has_permission(&manager, Resource::Enrollments, Operation::DeleteAll));
        assert!(!has_permission(&manager, Resource::Reports, Operation::ReadAll));
    }

    #[test]
    fn test_report_viewer_is_read_only() {
        let viewer = user(vec![Role::ReportViewer]);
        assert!(has_permission(&viewer, Resource::Reports, Operation::ReadAll));
        assert!(has_permission(&viewer, Resource::Enrollments, Operation::ReadAll));
        assert!(!has_permission(&viewer, Resource::Courses, Operation::UpdateAll));
        assert!(!has_permission(&viewer, Resource::Users, Operation::ReadAll));
    }

    #[test]
    fn test_roles_combine() {
        let both = user(vec![Role::DealerManager, Role::ReportViewer]);
        assert!(has_permission(&both, Resource::Reports, Operation::ReadAll));
        assert!(has_permission(&both, Resource::Dealers, Operation::DeleteAll));

        let nobody = user(vec![]);
        assert!(!satisfies(
            &nobody,
            &Permission::Any(vec![
                Permission::Allow(Resource::Courses, Operation::ReadAll),
                Permission::Allow(Resource::Reports, Operation::ReadAll),
            ])
        ));
        assert!(satisfies(&both, &Permission::Allow(Resource::Mechanics, Operation::UpdateAll)));
    }
}
