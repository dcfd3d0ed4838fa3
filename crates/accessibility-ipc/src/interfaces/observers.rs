//! Observer interfaces the manager notifies. Every notification is one-way.

use std::sync::Arc;

use ipc_transport::{CallContext, CallMode, Parcel, RemoteObject, StubError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::{InterfaceStub, ProxyCore, RouteSpec};
use crate::error::RetResult;
use crate::model::CaptionProperty;

fn log_one_way(interface: &'static str, code: u32, result: RetResult<()>) {
    if let Err(err) = result {
        debug!(target: "a11y::dispatch", interface, code, error = %err, "one-way call failed");
    }
}

pub mod state_observer {
    pub const DESCRIPTOR: &str = "OHOS.Accessibility.IAccessibleAbilityManagerStateObserver";
    pub const ON_STATE_CHANGED: u32 = 900;
}

pub mod caption_observer {
    pub const DESCRIPTOR: &str = "OHOS.Accessibility.IAccessibleAbilityManagerCaptionObserver";
    pub const ON_PROPERTY_CHANGED: u32 = 600;
}

pub mod enable_lists_observer {
    pub const DESCRIPTOR: &str = "OHOS.Accessibility.IAccessibilityEnableAbilityListsObserver";
    pub const ON_ENABLE_ABILITY_LISTS_CHANGED: u32 = 300;
    pub const ON_INSTALL_ABILITY_LISTS_CHANGED: u32 = 301;
}

pub mod config_observer {
    pub const DESCRIPTOR: &str = "OHOS.Accessibility.IAccessibleAbilityManagerConfigObserver";
    pub const ON_CONFIG_STATE_CHANGED: u32 = 700;
    pub const ON_AUDIO_BALANCE_CHANGED: u32 = 701;
    pub const ON_BRIGHTNESS_DISCOUNT_CHANGED: u32 = 702;
    pub const ON_CONTENT_TIMEOUT_CHANGED: u32 = 703;
    pub const ON_DALTONIZATION_COLOR_FILTER_CHANGED: u32 = 704;
    pub const ON_MOUSE_AUTO_CLICK_CHANGED: u32 = 705;
    pub const ON_SHORTKEY_TARGET_CHANGED: u32 = 706;
    pub const ON_CLICK_RESPONSE_TIME_CHANGED: u32 = 707;
    pub const ON_IGNORE_REPEAT_CLICK_TIME_CHANGED: u32 = 708;
}

// -- state ------------------------------------------------------------------

pub trait StateObserver: Send + Sync + 'static {
    /// `state` is a bit set of [`crate::model::state`] flags.
    fn on_state_changed(&self, state: u32) -> RetResult<()>;

    fn as_object(&self) -> Option<RemoteObject> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct StateObserverProxy {
    core: ProxyCore,
}

impl StateObserverProxy {
    pub fn new(remote: RemoteObject) -> Self {
        Self {
            core: ProxyCore::new(remote, state_observer::DESCRIPTOR),
        }
    }

    pub fn shared(remote: RemoteObject) -> Arc<dyn StateObserver> {
        Arc::new(Self::new(remote))
    }
}

impl StateObserver for StateObserverProxy {
    fn on_state_changed(&self, state: u32) -> RetResult<()> {
        self.core.send(
            state_observer::ON_STATE_CHANGED,
            "on_state_changed",
            CallMode::OneWay,
            |data| data.write_u32(state),
        )
    }

    fn as_object(&self) -> Option<RemoteObject> {
        Some(self.core.remote().clone())
    }
}

pub struct StateObserverStub<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: StateObserver + ?Sized> StateObserverStub<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T: StateObserver + ?Sized> InterfaceStub for StateObserverStub<T> {
    const DESCRIPTOR: &'static str = state_observer::DESCRIPTOR;
    const ROUTES: &'static [RouteSpec] =
        &[RouteSpec::open(state_observer::ON_STATE_CHANGED, "on_state_changed")];

    fn handle(
        &self,
        code: u32,
        data: &mut Parcel,
        _reply: &mut Parcel,
        _ctx: &CallContext,
    ) -> Result<(), StubError> {
        match code {
            state_observer::ON_STATE_CHANGED => {
                let state = data.read_u32()?;
                log_one_way(Self::DESCRIPTOR, code, self.inner.on_state_changed(state));
                Ok(())
            }
            other => Err(StubError::UnknownTransaction(other)),
        }
    }
}

// -- caption ----------------------------------------------------------------

pub trait CaptionObserver: Send + Sync + 'static {
    fn on_property_changed(&self, property: CaptionProperty) -> RetResult<()>;

    fn as_object(&self) -> Option<RemoteObject> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct CaptionObserverProxy {
    core: ProxyCore,
}

impl CaptionObserverProxy {
    pub fn new(remote: RemoteObject) -> Self {
        Self {
            core: ProxyCore::new(remote, caption_observer::DESCRIPTOR),
        }
    }

    pub fn shared(remote: RemoteObject) -> Arc<dyn CaptionObserver> {
        Arc::new(Self::new(remote))
    }
}

impl CaptionObserver for CaptionObserverProxy {
    fn on_property_changed(&self, property: CaptionProperty) -> RetResult<()> {
        self.core.send(
            caption_observer::ON_PROPERTY_CHANGED,
            "on_property_changed",
            CallMode::OneWay,
            |data| data.write_parcelable(&property),
        )
    }

    fn as_object(&self) -> Option<RemoteObject> {
        Some(self.core.remote().clone())
    }
}

pub struct CaptionObserverStub<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: CaptionObserver + ?Sized> CaptionObserverStub<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T: CaptionObserver + ?Sized> InterfaceStub for CaptionObserverStub<T> {
    const DESCRIPTOR: &'static str = caption_observer::DESCRIPTOR;
    const ROUTES: &'static [RouteSpec] =
        &[RouteSpec::open(caption_observer::ON_PROPERTY_CHANGED, "on_property_changed")];

    fn handle(
        &self,
        code: u32,
        data: &mut Parcel,
        _reply: &mut Parcel,
        _ctx: &CallContext,
    ) -> Result<(), StubError> {
        match code {
            caption_observer::ON_PROPERTY_CHANGED => {
                let property = data.read_parcelable()?;
                log_one_way(Self::DESCRIPTOR, code, self.inner.on_property_changed(property));
                Ok(())
            }
            other => Err(StubError::UnknownTransaction(other)),
        }
    }
}

// -- enable / install lists -------------------------------------------------

pub trait EnableAbilityListsObserver: Send + Sync + 'static {
    fn on_enable_ability_lists_changed(&self) -> RetResult<()>;

    fn on_install_ability_lists_changed(&self) -> RetResult<()>;

    fn as_object(&self) -> Option<RemoteObject> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct EnableAbilityListsObserverProxy {
    core: ProxyCore,
}

impl EnableAbilityListsObserverProxy {
    pub fn new(remote: RemoteObject) -> Self {
        Self {
            core: ProxyCore::new(remote, enable_lists_observer::DESCRIPTOR),
        }
    }

    pub fn shared(remote: RemoteObject) -> Arc<dyn EnableAbilityListsObserver> {
        Arc::new(Self::new(remote))
    }
}

impl EnableAbilityListsObserver for EnableAbilityListsObserverProxy {
    fn on_enable_ability_lists_changed(&self) -> RetResult<()> {
        self.core.send(
            enable_lists_observer::ON_ENABLE_ABILITY_LISTS_CHANGED,
            "on_enable_ability_lists_changed",
            CallMode::OneWay,
            |_| Ok(()),
        )
    }

    fn on_install_ability_lists_changed(&self) -> RetResult<()> {
        self.core.send(
            enable_lists_observer::ON_INSTALL_ABILITY_LISTS_CHANGED,
            "on_install_ability_lists_changed",
            CallMode::OneWay,
            |_| Ok(()),
        )
    }

    fn as_object(&self) -> Option<RemoteObject> {
        Some(self.core.remote().clone())
    }
}

pub struct EnableAbilityListsObserverStub<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: EnableAbilityListsObserver + ?Sized> EnableAbilityListsObserverStub<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T: EnableAbilityListsObserver + ?Sized> InterfaceStub for EnableAbilityListsObserverStub<T> {
    const DESCRIPTOR: &'static str = enable_lists_observer::DESCRIPTOR;
    const ROUTES: &'static [RouteSpec] = &[
        RouteSpec::open(
            enable_lists_observer::ON_ENABLE_ABILITY_LISTS_CHANGED,
            "on_enable_ability_lists_changed",
        ),
        RouteSpec::open(
            enable_lists_observer::ON_INSTALL_ABILITY_LISTS_CHANGED,
            "on_install_ability_lists_changed",
        ),
    ];

    fn handle(
        &self,
        code: u32,
        _data: &mut Parcel,
        _reply: &mut Parcel,
        _ctx: &CallContext,
    ) -> Result<(), StubError> {
        let result = match code {
            enable_lists_observer::ON_ENABLE_ABILITY_LISTS_CHANGED => {
                self.inner.on_enable_ability_lists_changed()
            }
            enable_lists_observer::ON_INSTALL_ABILITY_LISTS_CHANGED => {
                self.inner.on_install_ability_lists_changed()
            }
            other => return Err(StubError::UnknownTransaction(other)),
        };
        log_one_way(Self::DESCRIPTOR, code, result);
        Ok(())
    }
}

// -- config -----------------------------------------------------------------

/// One accessibility setting and its new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "setting", content = "value", rename_all = "snake_case")]
pub enum ConfigChange {
    State(u32),
    AudioBalance(f32),
    BrightnessDiscount(f32),
    ContentTimeout(u32),
    DaltonizationColorFilter(u32),
    MouseAutoClick(i32),
    ShortkeyTarget(String),
    ClickResponseTime(u32),
    IgnoreRepeatClickTime(u32),
}

impl ConfigChange {
    pub fn code(&self) -> u32 {
        use config_observer::*;
        match self {
            Self::State(_) => ON_CONFIG_STATE_CHANGED,
            Self::AudioBalance(_) => ON_AUDIO_BALANCE_CHANGED,
            Self::BrightnessDiscount(_) => ON_BRIGHTNESS_DISCOUNT_CHANGED,
            Self::ContentTimeout(_) => ON_CONTENT_TIMEOUT_CHANGED,
            Self::DaltonizationColorFilter(_) => ON_DALTONIZATION_COLOR_FILTER_CHANGED,
            Self::MouseAutoClick(_) => ON_MOUSE_AUTO_CLICK_CHANGED,
            Self::ShortkeyTarget(_) => ON_SHORTKEY_TARGET_CHANGED,
            Self::ClickResponseTime(_) => ON_CLICK_RESPONSE_TIME_CHANGED,
            Self::IgnoreRepeatClickTime(_) => ON_IGNORE_REPEAT_CLICK_TIME_CHANGED,
        }
    }

    /// Calls the observer method matching this setting.
    pub fn deliver<O: ConfigObserver + ?Sized>(&self, observer: &O) -> RetResult<()> {
        match self {
            Self::State(value) => observer.on_config_state_changed(*value),
            Self::AudioBalance(value) => observer.on_audio_balance_changed(*value),
            Self::BrightnessDiscount(value) => observer.on_brightness_discount_changed(*value),
            Self::ContentTimeout(value) => observer.on_content_timeout_changed(*value),
            Self::DaltonizationColorFilter(value) => {
                observer.on_daltonization_color_filter_changed(*value)
            }
            Self::MouseAutoClick(value) => observer.on_mouse_auto_click_changed(*value),
            Self::ShortkeyTarget(value) => observer.on_shortkey_target_changed(value),
            Self::ClickResponseTime(value) => observer.on_click_response_time_changed(*value),
            Self::IgnoreRepeatClickTime(value) => {
                observer.on_ignore_repeat_click_time_changed(*value)
            }
        }
    }

    fn write_value(&self, data: &mut Parcel) -> Result<(), ipc_transport::ParcelError> {
        match self {
            Self::State(value)
            | Self::ContentTimeout(value)
            | Self::DaltonizationColorFilter(value)
            | Self::ClickResponseTime(value)
            | Self::IgnoreRepeatClickTime(value) => data.write_u32(*value),
            Self::AudioBalance(value) | Self::BrightnessDiscount(value) => data.write_f32(*value),
            Self::MouseAutoClick(value) => data.write_i32(*value),
            Self::ShortkeyTarget(value) => data.write_string(value),
        }
    }

    fn read(code: u32, data: &mut Parcel) -> Result<Option<Self>, ipc_transport::ParcelError> {
        use config_observer::*;
        let change = match code {
            ON_CONFIG_STATE_CHANGED => Self::State(data.read_u32()?),
            ON_AUDIO_BALANCE_CHANGED => Self::AudioBalance(data.read_f32()?),
            ON_BRIGHTNESS_DISCOUNT_CHANGED => Self::BrightnessDiscount(data.read_f32()?),
            ON_CONTENT_TIMEOUT_CHANGED => Self::ContentTimeout(data.read_u32()?),
            ON_DALTONIZATION_COLOR_FILTER_CHANGED => Self::DaltonizationColorFilter(data.read_u32()?),
            ON_MOUSE_AUTO_CLICK_CHANGED => Self::MouseAutoClick(data.read_i32()?),
            ON_SHORTKEY_TARGET_CHANGED => Self::ShortkeyTarget(data.read_string()?),
            ON_CLICK_RESPONSE_TIME_CHANGED => Self::ClickResponseTime(data.read_u32()?),
            ON_IGNORE_REPEAT_CLICK_TIME_CHANGED => Self::IgnoreRepeatClickTime(data.read_u32()?),
            _ => return Ok(None),
        };
        Ok(Some(change))
    }
}

pub trait ConfigObserver: Send + Sync + 'static {
    fn on_config_state_changed(&self, state: u32) -> RetResult<()>;
    fn on_audio_balance_changed(&self, balance: f32) -> RetResult<()>;
    fn on_brightness_discount_changed(&self, discount: f32) -> RetResult<()>;
    fn on_content_timeout_changed(&self, timeout: u32) -> RetResult<()>;
    fn on_daltonization_color_filter_changed(&self, filter: u32) -> RetResult<()>;
    fn on_mouse_auto_click_changed(&self, delay: i32) -> RetResult<()>;
    fn on_shortkey_target_changed(&self, target: &str) -> RetResult<()>;
    fn on_click_response_time_changed(&self, time: u32) -> RetResult<()>;
    fn on_ignore_repeat_click_time_changed(&self, time: u32) -> RetResult<()>;

    fn as_object(&self) -> Option<RemoteObject> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ConfigObserverProxy {
    core: ProxyCore,
}

impl ConfigObserverProxy {
    pub fn new(remote: RemoteObject) -> Self {
        Self {
            core: ProxyCore::new(remote, config_observer::DESCRIPTOR),
        }
    }

    pub fn shared(remote: RemoteObject) -> Arc<dyn ConfigObserver> {
        Arc::new(Self::new(remote))
    }

    fn notify(&self, change: ConfigChange) -> RetResult<()> {
        self.core
            .send(change.code(), "on_config_changed", CallMode::OneWay, |data| {
                change.write_value(data)
            })
    }
}

impl ConfigObserver for ConfigObserverProxy {
    fn on_config_state_changed(&self, state: u32) -> RetResult<()> {
        self.notify(ConfigChange::State(state))
    }

    fn on_audio_balance_changed(&self, balance: f32) -> RetResult<()> {
        self.notify(ConfigChange::AudioBalance(balance))
    }

    fn on_brightness_discount_changed(&self, discount: f32) -> RetResult<()> {
        self.notify(ConfigChange::BrightnessDiscount(discount))
    }

    fn on_content_timeout_changed(&self, timeout: u32) -> RetResult<()> {
        self.notify(ConfigChange::ContentTimeout(timeout))
    }

    fn on_daltonization_color_filter_changed(&self, filter: u32) -> RetResult<()> {
        self.notify(ConfigChange::DaltonizationColorFilter(filter))
    }

    fn on_mouse_auto_click_changed(&self, delay: i32) -> RetResult<()> {
        self.notify(ConfigChange::MouseAutoClick(delay))
    }

    fn on_shortkey_target_changed(&self, target: &str) -> RetResult<()> {
        self.notify(ConfigChange::ShortkeyTarget(target.to_owned()))
    }

    fn on_click_response_time_changed(&self, time: u32) -> RetResult<()> {
        self.notify(ConfigChange::ClickResponseTime(time))
    }

    fn on_ignore_repeat_click_time_changed(&self, time: u32) -> RetResult<()> {
        self.notify(ConfigChange::IgnoreRepeatClickTime(time))
    }

    fn as_object(&self) -> Option<RemoteObject> {
        Some(self.core.remote().clone())
    }
}

pub struct ConfigObserverStub<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: ConfigObserver + ?Sized> ConfigObserverStub<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T: ConfigObserver + ?Sized> InterfaceStub for ConfigObserverStub<T> {
    const DESCRIPTOR: &'static str = config_observer::DESCRIPTOR;
    const ROUTES: &'static [RouteSpec] = &[
        RouteSpec::open(config_observer::ON_CONFIG_STATE_CHANGED, "on_config_state_changed"),
        RouteSpec::open(config_observer::ON_AUDIO_BALANCE_CHANGED, "on_audio_balance_changed"),
        RouteSpec::open(
            config_observer::ON_BRIGHTNESS_DISCOUNT_CHANGED,
            "on_brightness_discount_changed",
        ),
        RouteSpec::open(config_observer::ON_CONTENT_TIMEOUT_CHANGED, "on_content_timeout_changed"),
        RouteSpec::open(
            config_observer::ON_DALTONIZATION_COLOR_FILTER_CHANGED,
            "on_daltonization_color_filter_changed",
        ),
        RouteSpec::open(config_observer::ON_MOUSE_AUTO_CLICK_CHANGED, "on_mouse_auto_click_changed"),
        RouteSpec::open(config_observer::ON_SHORTKEY_TARGET_CHANGED, "on_shortkey_target_changed"),
        RouteSpec::open(
            config_observer::ON_CLICK_RESPONSE_TIME_CHANGED,
            "on_click_response_time_changed",
        ),
        RouteSpec::open(
            config_observer::ON_IGNORE_REPEAT_CLICK_TIME_CHANGED,
            "on_ignore_repeat_click_time_changed",
        ),
    ];

    fn handle(
        &self,
        code: u32,
        data: &mut Parcel,
        _reply: &mut Parcel,
        _ctx: &CallContext,
    ) -> Result<(), StubError> {
        let Some(change) = ConfigChange::read(code, data)? else {
            return Err(StubError::UnknownTransaction(code));
        };
        log_one_way(Self::DESCRIPTOR, code, change.deliver(self.inner.as_ref()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::host;
    use ipc_transport::{CallerIdentity, TransportConfig};
    use parking_lot::Mutex;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<ConfigChange>>,
        done: Mutex<mpsc::Sender<()>>,
    }

    impl Recorder {
        fn push(&self, change: ConfigChange) -> RetResult<()> {
            self.seen.lock().push(change);
            let _ = self.done.lock().send(());
            Ok(())
        }
    }

    impl ConfigObserver for Recorder {
        fn on_config_state_changed(&self, state: u32) -> RetResult<()> {
            self.push(ConfigChange::State(state))
        }
        fn on_audio_balance_changed(&self, balance: f32) -> RetResult<()> {
            self.push(ConfigChange::AudioBalance(balance))
        }
        fn on_brightness_discount_changed(&self, discount: f32) -> RetResult<()> {
            self.push(ConfigChange::BrightnessDiscount(discount))
        }
        fn on_content_timeout_changed(&self, timeout: u32) -> RetResult<()> {
            self.push(ConfigChange::ContentTimeout(timeout))
        }
        fn on_daltonization_color_filter_changed(&self, filter: u32) -> RetResult<()> {
            self.push(ConfigChange::DaltonizationColorFilter(filter))
        }
        fn on_mouse_auto_click_changed(&self, delay: i32) -> RetResult<()> {
            self.push(ConfigChange::MouseAutoClick(delay))
        }
        fn on_shortkey_target_changed(&self, target: &str) -> RetResult<()> {
            self.push(ConfigChange::ShortkeyTarget(target.to_owned()))
        }
        fn on_click_response_time_changed(&self, time: u32) -> RetResult<()> {
            self.push(ConfigChange::ClickResponseTime(time))
        }
        fn on_ignore_repeat_click_time_changed(&self, time: u32) -> RetResult<()> {
            self.push(ConfigChange::IgnoreRepeatClickTime(time))
        }
    }

    #[test_timeout::timeout]
    fn config_changes_arrive_in_order() {
        let (tx, rx) = mpsc::channel();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            done: Mutex::new(tx),
        });
        let endpoint = host(
            ConfigObserverStub::new(Arc::clone(&recorder)),
            CallerIdentity::new(7, 7),
            TransportConfig::default(),
        );
        let proxy = ConfigObserverProxy::new(endpoint.remote());

        let changes = vec![
            ConfigChange::AudioBalance(-0.5),
            ConfigChange::ShortkeyTarget("com.example.reader/Reader".into()),
            ConfigChange::MouseAutoClick(-1),
            ConfigChange::ClickResponseTime(300),
        ];
        for change in &changes {
            change.deliver(&proxy).unwrap();
        }
        for _ in &changes {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(*recorder.seen.lock(), changes);
    }

    #[test_timeout::timeout]
    fn trait_object_observer_can_be_hosted() {
        let (tx, rx) = mpsc::channel();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            done: Mutex::new(tx),
        });
        let inner: Arc<dyn ConfigObserver> = recorder.clone();
        let endpoint = host(
            ConfigObserverStub::new(inner),
            CallerIdentity::new(7, 7),
            TransportConfig::default(),
        );
        let proxy = ConfigObserverProxy::new(endpoint.remote());

        ConfigChange::ContentTimeout(10).deliver(&proxy).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(*recorder.seen.lock(), vec![ConfigChange::ContentTimeout(10)]);
    }
}
