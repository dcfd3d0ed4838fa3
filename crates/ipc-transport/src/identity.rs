use std::cell::RefCell;
use std::collections::BTreeSet;

thread_local! {
    static CURRENT: RefCell<Option<CallerIdentity>> = const { RefCell::new(None) };
}

/// Who is on the other end of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub pid: u32,
    pub uid: u32,
    pub token_id: u64,
    pub bundle_name: String,
    pub system_app: bool,
    /// Process was launched by the accessibility debug harness.
    pub debug_harness: bool,
    pub permissions: BTreeSet<String>,
}

impl CallerIdentity {
    pub fn new(pid: u32, uid: u32) -> Self {
        Self {
            pid,
            uid,
            token_id: ((uid as u64) << 32) | pid as u64,
            ..Self::default()
        }
    }

    pub fn with_bundle_name(mut self, bundle_name: impl Into<String>) -> Self {
        self.bundle_name = bundle_name.into();
        self
    }

    pub fn with_system_app(mut self) -> Self {
        self.system_app = true;
        self
    }

    pub fn with_debug_harness(mut self) -> Self {
        self.debug_harness = true;
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Sets the identity outgoing requests from this thread are attributed to,
/// restoring the previous one on drop.
pub struct IdentityScope {
    previous: Option<CallerIdentity>,
}

impl IdentityScope {
    pub fn enter(identity: CallerIdentity) -> Self {
        let previous = CURRENT.with(|slot| slot.replace(Some(identity)));
        Self { previous }
    }

    pub fn current() -> CallerIdentity {
        CURRENT.with(|slot| slot.borrow().clone().unwrap_or_default())
    }
}

impl Drop for IdentityScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| {
            slot.replace(previous);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn scopes_nest_and_restore() {
        assert_eq!(IdentityScope::current(), CallerIdentity::default());
        let outer = CallerIdentity::new(10, 1000);
        let _outer = IdentityScope::enter(outer.clone());
        {
            let inner = CallerIdentity::new(20, 2000).with_system_app();
            let _inner = IdentityScope::enter(inner.clone());
            assert_eq!(IdentityScope::current(), inner);
        }
        assert_eq!(IdentityScope::current(), outer);
    }
}
