//! Access gate selecting which caller classes may obtain the display service.

use crate::error::{Result, ServiceError};

/// Caller class, assigned by the surrounding service registration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    User,
    System,
    Manager,
}

/// Service flavor the caller is requesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    User,
    Compositor,
}

fn is_valid_service_access(permission: Permission, policy: Policy) -> bool {
    match permission {
        Permission::User => policy == Policy::User,
        Permission::System | Permission::Manager => true,
    }
}

pub fn check_service_access(permission: Permission, policy: Policy) -> Result<()> {
    if !is_valid_service_access(permission, policy) {
        return Err(ServiceError::PermissionDenied);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_callers_only_get_the_user_policy() {
        assert!(check_service_access(Permission::User, Policy::User).is_ok());
        assert_eq!(
            check_service_access(Permission::User, Policy::Compositor),
            Err(ServiceError::PermissionDenied)
        );
    }

    #[test]
    fn privileged_callers_get_either_policy() {
        for permission in [Permission::System, Permission::Manager] {
            for policy in [Policy::User, Policy::Compositor] {
                assert!(check_service_access(permission, policy).is_ok());
            }
        }
    }
}
