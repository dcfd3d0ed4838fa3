use thiserror::Error;

use crate::identity::CallerIdentity;
use crate::parcel::{Parcel, ParcelError};

/// Liveness probe understood by every stub.
pub const PING_TRANSACTION: u32 = u32::from_be_bytes(*b"_PNG");
/// Asks a stub for its interface descriptor.
pub const INTERFACE_TRANSACTION: u32 = u32::from_be_bytes(*b"_NTF");

/// How a request is delivered to the remote stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallMode {
    /// Caller waits for the stub to run and decodes the reply.
    Blocking,
    /// Queued in order on the endpoint; the worker is woken at once.
    OneWay,
    /// Queued in order on the endpoint; the worker picks it up at its next
    /// wake-up rather than being woken for it.
    OneWayDeferred,
}

impl CallMode {
    pub fn is_one_way(self) -> bool {
        !matches!(self, CallMode::Blocking)
    }
}

/// Transport-level dispatch status. Business failures travel inside the
/// reply instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StubError {
    #[error("interface descriptor mismatch")]
    InvalidState,
    #[error("malformed request: {0}")]
    InvalidValue(#[from] ParcelError),
    #[error("unknown transaction code {0}")]
    UnknownTransaction(u32),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("remote object is dead")]
    DeadObject,
    #[error("remote rejected request: {0}")]
    Remote(StubError),
}

/// What a stub learns about the request besides its payload.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub caller: CallerIdentity,
    pub code: u32,
    pub mode: CallMode,
}

/// Server side of a remote object.
pub trait RemoteStub: Send + Sync + 'static {
    fn descriptor(&self) -> &str;

    fn on_remote_request(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: &mut Parcel,
        ctx: &CallContext,
    ) -> Result<(), StubError>;
}

/// Handles the transactions every stub answers regardless of interface.
pub fn handle_base_request(
    descriptor: &str,
    code: u32,
    reply: &mut Parcel,
) -> Result<(), StubError> {
    match code {
        PING_TRANSACTION => Ok(()),
        INTERFACE_TRANSACTION => {
            reply.write_string(descriptor)?;
            Ok(())
        }
        other => Err(StubError::UnknownTransaction(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn base_request_answers_interface_query() {
        let mut reply = Parcel::new();
        handle_base_request("test.Iface", INTERFACE_TRANSACTION, &mut reply).unwrap();
        assert_eq!(reply.read_string().unwrap(), "test.Iface");
    }

    #[test_timeout::timeout]
    fn base_request_rejects_other_codes() {
        let mut reply = Parcel::new();
        assert_eq!(
            handle_base_request("test.Iface", 77, &mut reply),
            Err(StubError::UnknownTransaction(77))
        );
        assert_eq!(reply.data_size(), 0);
    }
}
