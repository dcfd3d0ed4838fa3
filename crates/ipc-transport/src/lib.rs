//! In-process object transport with binder call semantics.
//!
//! Responsibilities:
//! - `Parcel`: aligned message buffer with a side region for raw blobs and a
//!   table of remote object references
//! - `Endpoint` / `RemoteObject`: hosting a stub and calling into it with a
//!   chosen [`CallMode`]
//! - calling identity propagation so stubs can run access checks

mod endpoint;
mod identity;
mod parcel;
mod remote;

pub use endpoint::{Endpoint, ObjectId, RemoteObject, TransportConfig};
pub use identity::{CallerIdentity, IdentityScope};
pub use parcel::{
    DEFAULT_PARCEL_CAPACITY, MAX_RAWDATA_SIZE, MAX_STRING_LEN, Parcel, ParcelError, Parcelable,
};
pub use remote::{
    CallContext, CallMode, INTERFACE_TRANSACTION, PING_TRANSACTION, RemoteStub, StubError,
    TransportError, handle_base_request,
};
