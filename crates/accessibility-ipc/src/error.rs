use thiserror::Error;

/// Wire value for a successful business result.
pub const RET_OK: i32 = 0;

/// Business result codes carried inside replies and callbacks.
///
/// Transport and decode failures never appear here on the receiving side;
/// proxies fold them into [`RetError::IpcFailed`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RetError {
    #[error("operation failed")]
    Failed = -1,
    #[error("invalid parameter")]
    InvalidParam = 1001,
    #[error("required object is null")]
    NullPtr = 1002,
    #[error("ipc failed")]
    IpcFailed = 1003,
    #[error("service unavailable")]
    Samgr = 1004,
    #[error("permission denied")]
    NoPermission = 1005,
    #[error("timed out")]
    TimeOut = 1006,
    #[error("caller is not a system app")]
    NotSystemApp = 1007,
    #[error("already registered")]
    RegisterExist = 4001,
    #[error("not registered")]
    NoRegister = 4002,
    #[error("connection already exists")]
    ConnectionExist = 4003,
    #[error("no connection")]
    NoConnection = 4004,
    #[error("no window connection")]
    NoWindowConnection = 4005,
    #[error("capability not granted")]
    NoCapability = 4006,
    #[error("invalid element info from ace")]
    InvalidElementInfoFromAce = 4007,
    #[error("perform action failed by ace")]
    PerformActionFailedByAce = 4008,
    #[error("no injector")]
    NoInjector = 4009,
    #[error("ability not installed")]
    NotInstalled = 4010,
    #[error("ability not enabled")]
    NotEnabled = 4011,
    #[error("property does not exist")]
    PropertyNotExist = 4012,
    #[error("action not supported")]
    ActionNotSupport = 4013,
}

pub type RetResult<T> = Result<T, RetError>;

const ALL: &[RetError] = &[
    RetError::Failed,
    RetError::InvalidParam,
    RetError::NullPtr,
    RetError::IpcFailed,
    RetError::Samgr,
    RetError::NoPermission,
    RetError::TimeOut,
    RetError::NotSystemApp,
    RetError::RegisterExist,
    RetError::NoRegister,
    RetError::ConnectionExist,
    RetError::NoConnection,
    RetError::NoWindowConnection,
    RetError::NoCapability,
    RetError::InvalidElementInfoFromAce,
    RetError::PerformActionFailedByAce,
    RetError::NoInjector,
    RetError::NotInstalled,
    RetError::NotEnabled,
    RetError::PropertyNotExist,
    RetError::ActionNotSupport,
];

impl RetError {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        ALL.iter().copied().find(|err| err.code() == code)
    }

    /// Interprets a wire result code. Codes this side does not know are
    /// reported as [`RetError::Failed`].
    pub fn check(code: i32) -> RetResult<()> {
        if code == RET_OK {
            return Ok(());
        }
        Err(Self::from_code(code).unwrap_or(RetError::Failed))
    }
}

/// Wire value of a business result.
pub fn ret_code<T>(result: &RetResult<T>) -> i32 {
    match result {
        Ok(_) => RET_OK,
        Err(err) => err.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn codes_map_back_to_variants() {
        for err in ALL {
            assert_eq!(RetError::from_code(err.code()), Some(*err));
        }
        assert_eq!(RetError::check(RET_OK), Ok(()));
        assert_eq!(RetError::check(1005), Err(RetError::NoPermission));
    }

    #[test_timeout::timeout]
    fn unknown_code_is_a_generic_failure() {
        assert_eq!(RetError::check(77), Err(RetError::Failed));
        assert_eq!(ret_code::<()>(&Err(RetError::TimeOut)), 1006);
        assert_eq!(ret_code(&Ok(5)), RET_OK);
    }
}
