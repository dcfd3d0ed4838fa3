//! Implemented by every accessibility service; the manager drives it.

use std::sync::Arc;

use ipc_transport::{CallContext, CallMode, Parcel, RemoteObject, StubError};
use tracing::debug;

use super::ability_channel::{AbilityChannel, AbilityChannelProxy};
use crate::dispatch::{object_of, read_required_object, InterfaceStub, ProxyCore, RouteSpec};
use crate::error::RetResult;
use crate::model::{EventInfo, KeyEvent};

pub const DESCRIPTOR: &str = "OHOS.Accessibility.IAccessibleAbilityClient";

pub mod codes {
    pub const INIT: u32 = 500;
    pub const DISCONNECT: u32 = 501;
    pub const ON_ACCESSIBILITY_EVENT: u32 = 502;
    pub const ON_KEY_PRESSED_EVENT: u32 = 503;
}

pub trait AbilityClient: Send + Sync + 'static {
    /// Hands the service its channel back into the manager.
    fn init(&self, channel: Arc<dyn AbilityChannel>, channel_id: i32) -> RetResult<()>;

    fn disconnect(&self, channel_id: i32) -> RetResult<()>;

    fn on_accessibility_event(&self, event: EventInfo) -> RetResult<()>;

    fn on_key_pressed_event(&self, key_event: KeyEvent, sequence: i32) -> RetResult<()>;

    fn as_object(&self) -> Option<RemoteObject> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct AbilityClientProxy {
    core: ProxyCore,
}

impl AbilityClientProxy {
    pub fn new(remote: RemoteObject) -> Self {
        Self {
            core: ProxyCore::new(remote, DESCRIPTOR),
        }
    }

    pub fn shared(remote: RemoteObject) -> Arc<dyn AbilityClient> {
        Arc::new(Self::new(remote))
    }
}

impl AbilityClient for AbilityClientProxy {
    fn init(&self, channel: Arc<dyn AbilityChannel>, channel_id: i32) -> RetResult<()> {
        let channel = object_of(channel.as_object())?;
        self.core.send(codes::INIT, "init", CallMode::OneWay, |data| {
            data.write_remote_object(Some(&channel))?;
            data.write_i32(channel_id)
        })
    }

    fn disconnect(&self, channel_id: i32) -> RetResult<()> {
        self.core
            .send(codes::DISCONNECT, "disconnect", CallMode::OneWay, |data| {
                data.write_i32(channel_id)
            })
    }

    fn on_accessibility_event(&self, event: EventInfo) -> RetResult<()> {
        self.core.send(
            codes::ON_ACCESSIBILITY_EVENT,
            "on_accessibility_event",
            CallMode::OneWay,
            |data| data.write_parcelable(&event),
        )
    }

    fn on_key_pressed_event(&self, key_event: KeyEvent, sequence: i32) -> RetResult<()> {
        self.core.send(
            codes::ON_KEY_PRESSED_EVENT,
            "on_key_pressed_event",
            CallMode::OneWay,
            |data| {
                data.write_parcelable(&key_event)?;
                data.write_i32(sequence)
            },
        )
    }

    fn as_object(&self) -> Option<RemoteObject> {
        Some(self.core.remote().clone())
    }
}

pub struct AbilityClientStub<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: AbilityClient + ?Sized> AbilityClientStub<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T: AbilityClient + ?Sized> InterfaceStub for AbilityClientStub<T> {
    const DESCRIPTOR: &'static str = DESCRIPTOR;
    const ROUTES: &'static [RouteSpec] = &[
        RouteSpec::open(codes::INIT, "init"),
        RouteSpec::open(codes::DISCONNECT, "disconnect"),
        RouteSpec::open(codes::ON_ACCESSIBILITY_EVENT, "on_accessibility_event"),
        RouteSpec::open(codes::ON_KEY_PRESSED_EVENT, "on_key_pressed_event"),
    ];

    fn handle(
        &self,
        code: u32,
        data: &mut Parcel,
        _reply: &mut Parcel,
        _ctx: &CallContext,
    ) -> Result<(), StubError> {
        let result = match code {
            codes::INIT => {
                let channel = AbilityChannelProxy::shared(read_required_object(data)?);
                let channel_id = data.read_i32()?;
                self.inner.init(channel, channel_id)
            }
            codes::DISCONNECT => {
                let channel_id = data.read_i32()?;
                self.inner.disconnect(channel_id)
            }
            codes::ON_ACCESSIBILITY_EVENT => {
                let event = data.read_parcelable()?;
                self.inner.on_accessibility_event(event)
            }
            codes::ON_KEY_PRESSED_EVENT => {
                let key_event = data.read_parcelable()?;
                let sequence = data.read_i32()?;
                self.inner.on_key_pressed_event(key_event, sequence)
            }
            other => return Err(StubError::UnknownTransaction(other)),
        };
        if let Err(err) = result {
            debug!(target: "a11y::dispatch", interface = DESCRIPTOR, code, error = %err, "one-way call failed");
        }
        Ok(())
    }
}
