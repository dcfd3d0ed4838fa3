use ipc_transport::CallerIdentity;
use tracing::warn;

use crate::error::RetError;

pub const WRITE_ACCESSIBILITY_CONFIG: &str = "ohos.permission.WRITE_ACCESSIBILITY_CONFIG";
pub const READ_ACCESSIBILITY_CONFIG: &str = "ohos.permission.READ_ACCESSIBILITY_CONFIG";
pub const MANAGE_ACCESSIBILITY: &str = "ohos.permission.MANAGE_ACCESSIBILITY";

/// What a caller must hold to invoke an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    None,
    SystemApp,
    Permission(&'static str),
    SystemAppWithPermission(&'static str),
    /// Caller was started by the accessibility debug harness.
    DebugHarness,
}

pub trait PermissionChecker: Send + Sync + 'static {
    fn check(&self, required: &Capability, caller: &CallerIdentity) -> Result<(), RetError>;
}

/// Decides from the flags and grants carried on the caller's identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPermissionChecker;

impl PermissionChecker for IdentityPermissionChecker {
    fn check(&self, required: &Capability, caller: &CallerIdentity) -> Result<(), RetError> {
        let outcome = match required {
            Capability::None => Ok(()),
            Capability::SystemApp => require_system_app(caller),
            Capability::Permission(permission) => require_permission(caller, permission),
            Capability::SystemAppWithPermission(permission) => {
                require_system_app(caller).and_then(|()| require_permission(caller, permission))
            }
            Capability::DebugHarness => {
                if caller.debug_harness {
                    Ok(())
                } else {
                    Err(RetError::NoPermission)
                }
            }
        };
        if let Err(err) = outcome {
            warn!(
                target: "a11y::permission",
                pid = caller.pid,
                uid = caller.uid,
                bundle = %caller.bundle_name,
                ?required,
                error = %err,
                "access denied"
            );
        }
        outcome
    }
}

fn require_system_app(caller: &CallerIdentity) -> Result<(), RetError> {
    if caller.system_app {
        Ok(())
    } else {
        Err(RetError::NotSystemApp)
    }
}

fn require_permission(caller: &CallerIdentity, permission: &str) -> Result<(), RetError> {
    if caller.has_permission(permission) {
        Ok(())
    } else {
        Err(RetError::NoPermission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn system_app_is_checked_before_permission() {
        let checker = IdentityPermissionChecker;
        let required = Capability::SystemAppWithPermission(WRITE_ACCESSIBILITY_CONFIG);

        let plain = CallerIdentity::new(100, 20010001).with_permission(WRITE_ACCESSIBILITY_CONFIG);
        assert_eq!(checker.check(&required, &plain), Err(RetError::NotSystemApp));

        let system = CallerIdentity::new(101, 1000).with_system_app();
        assert_eq!(checker.check(&required, &system), Err(RetError::NoPermission));

        let granted = system.with_permission(WRITE_ACCESSIBILITY_CONFIG);
        assert_eq!(checker.check(&required, &granted), Ok(()));
    }

    #[test_timeout::timeout]
    fn debug_harness_and_open_routes() {
        let checker = IdentityPermissionChecker;
        let caller = CallerIdentity::new(5, 5);
        assert_eq!(checker.check(&Capability::None, &caller), Ok(()));
        assert_eq!(
            checker.check(&Capability::DebugHarness, &caller),
            Err(RetError::NoPermission)
        );
        assert_eq!(
            checker.check(&Capability::DebugHarness, &caller.with_debug_harness()),
            Ok(())
        );
    }
}
