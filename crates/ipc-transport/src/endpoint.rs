use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, trace, warn};

use crate::identity::{CallerIdentity, IdentityScope};
use crate::parcel::Parcel;
use crate::remote::{CallContext, CallMode, RemoteStub, StubError, TransportError};

static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("ipc-transport")
        .enable_all()
        .build()
        .expect("ipc transport runtime")
});

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

const DEFAULT_DEFERRED_WAKEUP: Duration = Duration::from_millis(1);
const DEFAULT_SLOW_DISPATCH: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound on how long a deferred one-way request waits for the
    /// worker to wake up.
    pub deferred_wakeup: Duration,
    /// Handlers running longer than this are logged at warn.
    pub slow_dispatch: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            deferred_wakeup: DEFAULT_DEFERRED_WAKEUP,
            slow_dispatch: DEFAULT_SLOW_DISPATCH,
        }
    }
}

type DeathRecipient = Box<dyn FnOnce(ObjectId) + Send>;

struct QueuedRequest {
    code: u32,
    data: Parcel,
    caller: CallerIdentity,
    mode: CallMode,
}

struct EndpointShared {
    id: ObjectId,
    descriptor: String,
    owner: CallerIdentity,
    stub: Arc<dyn RemoteStub>,
    alive: AtomicBool,
    queue: Mutex<VecDeque<QueuedRequest>>,
    wake: Notify,
    wakeup_armed: AtomicBool,
    death_recipients: Mutex<Vec<DeathRecipient>>,
    config: TransportConfig,
}

impl EndpointShared {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn pop(&self) -> Option<QueuedRequest> {
        self.queue.lock().pop_front()
    }

    fn enqueue(self: &Arc<Self>, request: QueuedRequest) {
        let deferred = request.mode == CallMode::OneWayDeferred;
        self.queue.lock().push_back(request);
        if !deferred {
            self.wake.notify_one();
            return;
        }
        if self.wakeup_armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let delay = self.config.deferred_wakeup;
        let shared = Arc::downgrade(self);
        RUNTIME.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.wakeup_armed.store(false, Ordering::Release);
                shared.wake.notify_one();
            }
        });
    }

    fn dispatch(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: &mut Parcel,
        caller: CallerIdentity,
        mode: CallMode,
    ) -> Result<(), StubError> {
        let _identity = IdentityScope::enter(self.owner.clone());
        let ctx = CallContext { caller, code, mode };
        data.rewind();
        let started = Instant::now();
        let status = self.stub.on_remote_request(code, data, reply, &ctx);
        let elapsed = started.elapsed();
        if elapsed >= self.config.slow_dispatch {
            warn!(
                target: "ipc::transport",
                object = %self.id,
                descriptor = %self.descriptor,
                code,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow dispatch"
            );
        } else {
            trace!(
                target: "ipc::transport",
                object = %self.id,
                code,
                ?mode,
                elapsed_us = elapsed.as_micros() as u64,
                "dispatched"
            );
        }
        status
    }

    fn deliver(&self, request: QueuedRequest) {
        let QueuedRequest {
            code,
            mut data,
            caller,
            mode,
        } = request;
        let mut reply = Parcel::new();
        if let Err(status) = self.dispatch(code, &mut data, &mut reply, caller, mode) {
            warn!(
                target: "ipc::transport",
                object = %self.id,
                descriptor = %self.descriptor,
                code,
                error = %status,
                "one-way request failed"
            );
        }
    }

    fn shutdown(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        let dropped = {
            let mut queue = self.queue.lock();
            let pending = queue.len();
            queue.clear();
            pending
        };
        self.wake.notify_one();
        let recipients = std::mem::take(&mut *self.death_recipients.lock());
        debug!(
            target: "ipc::transport",
            object = %self.id,
            descriptor = %self.descriptor,
            dropped,
            recipients = recipients.len(),
            "endpoint shut down"
        );
        for recipient in recipients {
            recipient(self.id);
        }
    }
}

async fn drain_queue(shared: Arc<EndpointShared>) {
    loop {
        shared.wake.notified().await;
        if !shared.is_alive() {
            break;
        }
        while let Some(request) = shared.pop() {
            let worker = Arc::clone(&shared);
            if let Err(err) = tokio::task::spawn_blocking(move || worker.deliver(request)).await {
                warn!(
                    target: "ipc::transport",
                    object = %shared.id,
                    error = %err,
                    "one-way handler panicked"
                );
            }
            if !shared.is_alive() {
                return;
            }
        }
    }
}

/// Client-side handle to a hosted stub. Cheap to clone; carries no
/// ownership of the stub's lifetime.
#[derive(Clone)]
pub struct RemoteObject {
    shared: Arc<EndpointShared>,
}

impl RemoteObject {
    pub fn id(&self) -> ObjectId {
        self.shared.id
    }

    pub fn descriptor(&self) -> &str {
        &self.shared.descriptor
    }

    pub fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    /// Delivers `data` to the stub.
    ///
    /// Blocking calls replace `reply` with the stub's reply and must not be
    /// issued from inside an async task. One-way calls leave `reply` untouched.
    pub fn send_request(
        &self,
        code: u32,
        data: Parcel,
        reply: &mut Parcel,
        mode: CallMode,
    ) -> Result<(), TransportError> {
        if !self.shared.is_alive() {
            return Err(TransportError::DeadObject);
        }
        let caller = IdentityScope::current();
        match mode {
            CallMode::Blocking => {
                let (tx, rx) = oneshot::channel();
                let worker = Arc::clone(&self.shared);
                RUNTIME.spawn_blocking(move || {
                    let mut data = data;
                    let mut out = Parcel::new();
                    let status = worker.dispatch(code, &mut data, &mut out, caller, mode);
                    let _ = tx.send((status, out));
                });
                let (status, out) = rx.blocking_recv().map_err(|_| TransportError::DeadObject)?;
                status.map_err(TransportError::Remote)?;
                *reply = out;
                reply.rewind();
                Ok(())
            }
            CallMode::OneWay | CallMode::OneWayDeferred => {
                self.shared.enqueue(QueuedRequest {
                    code,
                    data,
                    caller,
                    mode,
                });
                Ok(())
            }
        }
    }

    /// Registers `recipient` to run once when the endpoint shuts down. Runs it
    /// immediately if the endpoint is already dead.
    pub fn add_death_recipient<F>(&self, recipient: F)
    where
        F: FnOnce(ObjectId) + Send + 'static,
    {
        let mut recipients = self.shared.death_recipients.lock();
        if self.shared.is_alive() {
            recipients.push(Box::new(recipient));
            return;
        }
        drop(recipients);
        recipient(self.shared.id);
    }
}

impl PartialEq for RemoteObject {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}

impl Eq for RemoteObject {}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("id", &self.shared.id)
            .field("descriptor", &self.shared.descriptor)
            .field("alive", &self.shared.is_alive())
            .finish()
    }
}

/// Hosts a stub for as long as the endpoint value is kept. Dropping it makes
/// every outstanding [`RemoteObject`] dead.
pub struct Endpoint {
    remote: RemoteObject,
}

impl Endpoint {
    pub fn spawn<S: RemoteStub>(stub: S, owner: CallerIdentity) -> Self {
        Self::spawn_with(stub, owner, TransportConfig::default())
    }

    pub fn spawn_with<S: RemoteStub>(stub: S, owner: CallerIdentity, config: TransportConfig) -> Self {
        let id = ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed));
        let descriptor = stub.descriptor().to_string();
        let shared = Arc::new(EndpointShared {
            id,
            descriptor,
            owner,
            stub: Arc::new(stub),
            alive: AtomicBool::new(true),
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            wakeup_armed: AtomicBool::new(false),
            death_recipients: Mutex::new(Vec::new()),
            config,
        });
        RUNTIME.spawn(drain_queue(Arc::clone(&shared)));
        debug!(
            target: "ipc::transport",
            object = %id,
            descriptor = %shared.descriptor,
            owner_pid = shared.owner.pid,
            "endpoint started"
        );
        Self {
            remote: RemoteObject { shared },
        }
    }

    pub fn id(&self) -> ObjectId {
        self.remote.id()
    }

    pub fn remote(&self) -> RemoteObject {
        self.remote.clone()
    }

    pub fn shutdown(&self) {
        self.remote.shared.shutdown();
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::remote::handle_base_request;

    struct EchoStub {
        seen: mpsc::Sender<(u32, i32, CallerIdentity, CallerIdentity)>,
    }

    impl RemoteStub for EchoStub {
        fn descriptor(&self) -> &str {
            "test.IEcho"
        }

        fn on_remote_request(
            &self,
            code: u32,
            data: &mut Parcel,
            reply: &mut Parcel,
            ctx: &CallContext,
        ) -> Result<(), StubError> {
            if code == 0 {
                return handle_base_request(self.descriptor(), 99, reply);
            }
            let value = data.read_i32()?;
            let _ = self.seen.send((code, value, ctx.caller.clone(), IdentityScope::current()));
            reply.write_i32(value * 2)?;
            Ok(())
        }
    }

    fn echo() -> (Endpoint, mpsc::Receiver<(u32, i32, CallerIdentity, CallerIdentity)>) {
        let (tx, rx) = mpsc::channel();
        let owner = CallerIdentity::new(2, 2000).with_bundle_name("echo.host");
        (Endpoint::spawn(EchoStub { seen: tx }, owner), rx)
    }

    fn request(value: i32) -> Parcel {
        let mut parcel = Parcel::new();
        parcel.write_i32(value).unwrap();
        parcel
    }

    #[test_timeout::timeout]
    fn blocking_call_returns_reply_and_identities() {
        let (endpoint, seen) = echo();
        let caller = CallerIdentity::new(7, 7000);
        let _scope = IdentityScope::enter(caller.clone());

        let mut reply = Parcel::new();
        endpoint
            .remote()
            .send_request(5, request(21), &mut reply, CallMode::Blocking)
            .expect("blocking call");
        assert_eq!(reply.read_i32().unwrap(), 42);

        let (code, value, remote_caller, handler_identity) = seen.recv().unwrap();
        assert_eq!((code, value), (5, 21));
        assert_eq!(remote_caller, caller);
        assert_eq!(handler_identity.bundle_name, "echo.host");
    }

    #[test_timeout::timeout]
    fn stub_status_surfaces_as_remote_error() {
        let (endpoint, _seen) = echo();
        let mut reply = Parcel::new();
        let err = endpoint
            .remote()
            .send_request(0, Parcel::new(), &mut reply, CallMode::Blocking)
            .unwrap_err();
        assert_eq!(err, TransportError::Remote(StubError::UnknownTransaction(99)));
    }

    #[test_timeout::timeout]
    fn one_way_and_deferred_preserve_order() {
        let (endpoint, seen) = echo();
        let remote = endpoint.remote();
        let mut reply = Parcel::new();
        remote
            .send_request(1, request(1), &mut reply, CallMode::OneWayDeferred)
            .unwrap();
        remote
            .send_request(1, request(2), &mut reply, CallMode::OneWayDeferred)
            .unwrap();
        remote
            .send_request(1, request(3), &mut reply, CallMode::OneWay)
            .unwrap();
        assert_eq!(reply.data_size(), 0);

        let order: Vec<i32> = (0..3)
            .map(|_| seen.recv_timeout(Duration::from_secs(5)).unwrap().1)
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test_timeout::timeout]
    fn deferred_request_is_delivered_without_further_traffic() {
        let (endpoint, seen) = echo();
        let mut reply = Parcel::new();
        endpoint
            .remote()
            .send_request(3, request(9), &mut reply, CallMode::OneWayDeferred)
            .unwrap();
        let (_, value, _, _) = seen.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(value, 9);
    }

    #[test_timeout::timeout]
    fn dead_endpoint_rejects_and_notifies_once() {
        let (endpoint, _seen) = echo();
        let remote = endpoint.remote();
        let (tx, rx) = mpsc::channel();
        let early = tx.clone();
        remote.add_death_recipient(move |id| {
            let _ = early.send(id);
        });

        drop(endpoint);
        assert!(!remote.is_alive());
        assert_eq!(rx.recv().unwrap(), remote.id());

        let mut reply = Parcel::new();
        assert_eq!(
            remote.send_request(1, request(1), &mut reply, CallMode::Blocking),
            Err(TransportError::DeadObject)
        );

        // late registration runs immediately
        remote.add_death_recipient(move |id| {
            let _ = tx.send(id);
        });
        assert_eq!(rx.recv().unwrap(), remote.id());
        assert!(rx.try_recv().is_err());
    }
}
