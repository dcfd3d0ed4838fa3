//! Generic halves of every proxy and stub.
//!
//! Inbound requests pass through [`dispatch`]: interface token, route lookup,
//! access check from the route table, then the interface's own handler. The
//! access check runs before any argument is decoded.

use std::fmt;
use std::sync::Arc;

use ipc_transport::{
    handle_base_request, CallContext, CallMode, CallerIdentity, Endpoint, Parcel, ParcelError,
    RemoteObject, RemoteStub, StubError, TransportConfig,
};
use tracing::{trace, warn};

use crate::error::{ret_code, RetError, RetResult};
use crate::permission::{Capability, IdentityPermissionChecker, PermissionChecker};

/// One row of an interface's dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSpec {
    pub code: u32,
    pub name: &'static str,
    pub capability: Capability,
}

impl RouteSpec {
    pub const fn open(code: u32, name: &'static str) -> Self {
        Self {
            code,
            name,
            capability: Capability::None,
        }
    }

    pub const fn guarded(code: u32, name: &'static str, capability: Capability) -> Self {
        Self {
            code,
            name,
            capability,
        }
    }
}

/// Server side of one interface.
pub trait InterfaceStub: Send + Sync + 'static {
    const DESCRIPTOR: &'static str;
    const ROUTES: &'static [RouteSpec];

    /// Decodes the arguments for `code`, calls the implementation and writes
    /// the reply. Only invoked for codes listed in [`Self::ROUTES`] whose
    /// capability the caller holds.
    fn handle(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: &mut Parcel,
        ctx: &CallContext,
    ) -> Result<(), StubError>;
}

pub fn route<S: InterfaceStub>(code: u32) -> Option<&'static RouteSpec> {
    S::ROUTES.iter().find(|route| route.code == code)
}

pub fn dispatch<S: InterfaceStub>(
    stub: &S,
    checker: &dyn PermissionChecker,
    code: u32,
    data: &mut Parcel,
    reply: &mut Parcel,
    ctx: &CallContext,
) -> Result<(), StubError> {
    let token = data
        .read_interface_token()
        .map_err(|_| StubError::InvalidState)?;
    if token != S::DESCRIPTOR {
        warn!(
            target: "a11y::dispatch",
            expected = S::DESCRIPTOR,
            received = %token,
            code,
            "interface token mismatch"
        );
        return Err(StubError::InvalidState);
    }

    let Some(route) = route::<S>(code) else {
        return handle_base_request(S::DESCRIPTOR, code, reply);
    };

    if let Err(denied) = checker.check(&route.capability, &ctx.caller) {
        reply.write_i32(denied.code())?;
        return Ok(());
    }

    trace!(
        target: "a11y::dispatch",
        interface = S::DESCRIPTOR,
        route = route.name,
        caller_pid = ctx.caller.pid,
        "dispatching"
    );
    stub.handle(code, data, reply, ctx).map_err(|err| {
        warn!(
            target: "a11y::dispatch",
            interface = S::DESCRIPTOR,
            route = route.name,
            error = %err,
            "request rejected"
        );
        err
    })
}

/// Adapts an [`InterfaceStub`] to the transport.
pub struct StubAdapter<S> {
    stub: S,
    checker: Arc<dyn PermissionChecker>,
}

impl<S: InterfaceStub> StubAdapter<S> {
    pub fn new(stub: S) -> Self {
        Self::with_checker(stub, Arc::new(IdentityPermissionChecker))
    }

    pub fn with_checker(stub: S, checker: Arc<dyn PermissionChecker>) -> Self {
        Self { stub, checker }
    }
}

impl<S: InterfaceStub> RemoteStub for StubAdapter<S> {
    fn descriptor(&self) -> &str {
        S::DESCRIPTOR
    }

    fn on_remote_request(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: &mut Parcel,
        ctx: &CallContext,
    ) -> Result<(), StubError> {
        dispatch(&self.stub, self.checker.as_ref(), code, data, reply, ctx)
    }
}

/// Hosts `stub` on a new endpoint owned by `owner`.
pub fn host<S: InterfaceStub>(stub: S, owner: CallerIdentity, transport: TransportConfig) -> Endpoint {
    Endpoint::spawn_with(StubAdapter::new(stub), owner, transport)
}

/// Reads the callback or observer object a request must carry.
pub fn read_required_object(data: &mut Parcel) -> Result<RemoteObject, StubError> {
    data.read_remote_object()?
        .ok_or(StubError::InvalidValue(ParcelError::InvalidData("null remote object")))
}

/// Writes a business result code, followed by `value` on success.
pub fn write_result<T>(
    reply: &mut Parcel,
    result: RetResult<T>,
    value: impl FnOnce(&mut Parcel, T) -> Result<(), ParcelError>,
) -> Result<(), StubError> {
    reply.write_i32(ret_code(&result))?;
    if let Ok(output) = result {
        value(reply, output)?;
    }
    Ok(())
}

pub fn write_ret(reply: &mut Parcel, result: RetResult<()>) -> Result<(), StubError> {
    write_result(reply, result, |_, ()| Ok(()))
}

/// Client side of one interface: frames requests and classifies failures.
#[derive(Clone)]
pub struct ProxyCore {
    remote: RemoteObject,
    descriptor: &'static str,
}

impl ProxyCore {
    pub fn new(remote: RemoteObject, descriptor: &'static str) -> Self {
        Self { remote, descriptor }
    }

    pub fn remote(&self) -> &RemoteObject {
        &self.remote
    }

    /// Encodes and sends a request. Encode or transport failures become
    /// [`RetError::IpcFailed`]; the reply is returned undecoded.
    pub fn transact<F>(&self, code: u32, name: &'static str, mode: CallMode, write: F) -> RetResult<Parcel>
    where
        F: FnOnce(&mut Parcel) -> Result<(), ParcelError>,
    {
        let mut data = Parcel::new();
        if let Err(err) = data.write_interface_token(self.descriptor).and_then(|()| write(&mut data)) {
            warn!(
                target: "a11y::proxy",
                interface = self.descriptor,
                op = name,
                error = %err,
                "failed to encode request"
            );
            return Err(RetError::IpcFailed);
        }
        let mut reply = Parcel::new();
        if let Err(err) = self.remote.send_request(code, data, &mut reply, mode) {
            warn!(
                target: "a11y::proxy",
                interface = self.descriptor,
                op = name,
                object = %self.remote.id(),
                error = %err,
                "transport call failed"
            );
            return Err(RetError::IpcFailed);
        }
        Ok(reply)
    }

    /// Fire-and-forget request.
    pub fn send<F>(&self, code: u32, name: &'static str, mode: CallMode, write: F) -> RetResult<()>
    where
        F: FnOnce(&mut Parcel) -> Result<(), ParcelError>,
    {
        self.transact(code, name, mode, write).map(|_| ())
    }

    /// Blocking request whose reply starts with a result code; the rest of
    /// the reply is decoded by `read` only on success.
    pub fn call<T, F, R>(&self, code: u32, name: &'static str, write: F, read: R) -> RetResult<T>
    where
        F: FnOnce(&mut Parcel) -> Result<(), ParcelError>,
        R: FnOnce(&mut Parcel) -> Result<T, ParcelError>,
    {
        let mut reply = self.transact(code, name, CallMode::Blocking, write)?;
        let decoded = reply.read_i32().and_then(|ret| match RetError::check(ret) {
            Ok(()) => read(&mut reply).map(Ok),
            Err(err) => Ok(Err(err)),
        });
        match decoded {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    target: "a11y::proxy",
                    interface = self.descriptor,
                    op = name,
                    error = %err,
                    "malformed reply"
                );
                Err(RetError::IpcFailed)
            }
        }
    }

    pub fn call_ret<F>(&self, code: u32, name: &'static str, write: F) -> RetResult<()>
    where
        F: FnOnce(&mut Parcel) -> Result<(), ParcelError>,
    {
        self.call(code, name, write, |_| Ok(()))
    }
}

impl fmt::Debug for ProxyCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCore")
            .field("descriptor", &self.descriptor)
            .field("remote", &self.remote.id())
            .finish()
    }
}

/// Remote object behind a callback or observer argument, or `NullPtr` when
/// the argument is not backed by a hosted endpoint.
pub fn object_of(object: Option<RemoteObject>) -> RetResult<RemoteObject> {
    object.ok_or(RetError::NullPtr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::WRITE_ACCESSIBILITY_CONFIG;
    use ipc_transport::{IdentityScope, TransportError, INTERFACE_TRANSACTION, PING_TRANSACTION};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CounterStub {
        handled: Arc<AtomicUsize>,
    }

    const ADD: u32 = 1;
    const RESET: u32 = 2;

    impl InterfaceStub for CounterStub {
        const DESCRIPTOR: &'static str = "test.ICounter";
        const ROUTES: &'static [RouteSpec] = &[
            RouteSpec::open(ADD, "add"),
            RouteSpec::guarded(
                RESET,
                "reset",
                Capability::SystemAppWithPermission(WRITE_ACCESSIBILITY_CONFIG),
            ),
        ];

        fn handle(
            &self,
            code: u32,
            data: &mut Parcel,
            reply: &mut Parcel,
            _ctx: &CallContext,
        ) -> Result<(), StubError> {
            let amount = data.read_i32()?;
            let total = match code {
                ADD => self.handled.fetch_add(amount as usize, Ordering::SeqCst) + amount as usize,
                _ => {
                    self.handled.store(0, Ordering::SeqCst);
                    0
                }
            };
            write_result(reply, Ok(total as i32), |reply, total| reply.write_i32(total))
        }
    }

    fn counter() -> (Endpoint, Arc<AtomicUsize>) {
        let handled = Arc::new(AtomicUsize::new(0));
        let endpoint = host(
            CounterStub {
                handled: Arc::clone(&handled),
            },
            CallerIdentity::new(1, 1000).with_system_app(),
            TransportConfig::default(),
        );
        (endpoint, handled)
    }

    #[test_timeout::timeout]
    fn proxy_round_trip() {
        let (endpoint, _) = counter();
        let proxy = ProxyCore::new(endpoint.remote(), CounterStub::DESCRIPTOR);
        let total = proxy
            .call(ADD, "add", |data| data.write_i32(5), |reply| reply.read_i32())
            .unwrap();
        assert_eq!(total, 5);
    }

    #[test_timeout::timeout]
    fn wrong_token_is_rejected_before_any_handler() {
        let (endpoint, handled) = counter();
        let mut data = Parcel::new();
        data.write_interface_token("test.IOther").unwrap();
        data.write_i32(5).unwrap();
        let mut reply = Parcel::new();
        let err = endpoint
            .remote()
            .send_request(ADD, data, &mut reply, CallMode::Blocking)
            .unwrap_err();
        assert_eq!(err, TransportError::Remote(StubError::InvalidState));
        assert_eq!(handled.load(Ordering::SeqCst), 0);

        let wrong = ProxyCore::new(endpoint.remote(), "test.IOther");
        assert_eq!(
            wrong.call_ret(ADD, "add", |data| data.write_i32(1)),
            Err(RetError::IpcFailed)
        );
    }

    #[test_timeout::timeout]
    fn unknown_code_falls_back_to_base_handler() {
        let (endpoint, _) = counter();
        let proxy = ProxyCore::new(endpoint.remote(), CounterStub::DESCRIPTOR);
        let mut reply = proxy
            .transact(INTERFACE_TRANSACTION, "interface", CallMode::Blocking, |_| Ok(()))
            .unwrap();
        assert_eq!(reply.read_string().unwrap(), CounterStub::DESCRIPTOR);
        assert!(proxy
            .transact(PING_TRANSACTION, "ping", CallMode::Blocking, |_| Ok(()))
            .is_ok());
        assert_eq!(
            proxy.transact(0x7777, "bogus", CallMode::Blocking, |_| Ok(())).map(|_| ()),
            Err(RetError::IpcFailed)
        );
    }

    #[test_timeout::timeout]
    fn denied_caller_gets_code_without_decode() {
        let (endpoint, handled) = counter();
        handled.store(3, Ordering::SeqCst);
        let proxy = ProxyCore::new(endpoint.remote(), CounterStub::DESCRIPTOR);

        let _caller = IdentityScope::enter(CallerIdentity::new(50, 20010050).with_system_app());
        // payload is deliberately empty; a decode would fail with InvalidValue
        assert_eq!(proxy.call_ret(RESET, "reset", |_| Ok(())), Err(RetError::NoPermission));
        assert_eq!(handled.load(Ordering::SeqCst), 3);
    }

    #[test_timeout::timeout]
    fn decode_failure_is_a_transport_error() {
        let (endpoint, _) = counter();
        let mut data = Parcel::new();
        data.write_interface_token(CounterStub::DESCRIPTOR).unwrap();
        let mut reply = Parcel::new();
        let err = endpoint
            .remote()
            .send_request(ADD, data, &mut reply, CallMode::Blocking)
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Remote(StubError::InvalidValue(ParcelError::UnexpectedEof))
        );
    }
}
