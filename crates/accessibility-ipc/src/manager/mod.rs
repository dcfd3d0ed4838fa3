//! In-process accessibility manager.
//!
//! Keeps the element operators registered by application windows, the
//! installed and enabled abilities with their channels, and every observer
//! list. Remote callers reach it through [`AccessibilityManager::host`].
//! Observer and operator registrations are dropped when their endpoint dies.

mod channel;

pub use channel::ChannelHandler;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Weak};

use ipc_transport::{CallerIdentity, Endpoint, ObjectId, RemoteObject};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::IpcConfig;
use crate::dispatch::host;
use crate::error::{RetError, RetResult};
use crate::interfaces::{
    AbilityChannelProxy, AbilityChannelStub, AbilityClient, CaptionObserver, ConfigChange,
    ConfigObserver, ElementOperator, EnableAbilityListsObserver, ManagerService,
    ManagerServiceStub, StateObserver,
};
use crate::model::{
    capability, state, AbilityInfo, AbilityStateType, CaptionProperty, EventInfo, GesturePath,
    KeyEvent, RegistrationPara, WindowInfo, WireEnum, ROOT_TREE_ID,
};

/// Ability id the debug harness connects under.
pub const UI_TEST_ABILITY_ID: &str = "ui_test_ability";

const UI_TEST_CAPABILITIES: u32 = capability::RETRIEVE
    | capability::TOUCH_GUIDE
    | capability::KEY_EVENT_OBSERVER
    | capability::ZOOM
    | capability::GESTURE;

/// Key events kept while waiting for, or holding, an answer. Oldest go first.
const KEY_EVENT_BACKLOG: usize = 64;
/// Most recent injected gestures kept for inspection.
const GESTURE_BACKLOG: usize = 64;

/// Current value of every accessibility setting pushed to config observers.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessibilitySettings {
    pub config_state: u32,
    pub audio_balance: f32,
    pub brightness_discount: f32,
    pub content_timeout: u32,
    pub daltonization_color_filter: u32,
    pub mouse_auto_click: i32,
    pub shortkey_target: String,
    pub click_response_time: u32,
    pub ignore_repeat_click_time: u32,
}

impl Default for AccessibilitySettings {
    fn default() -> Self {
        Self {
            config_state: 0,
            audio_balance: 0.0,
            brightness_discount: 1.0,
            content_timeout: 0,
            daltonization_color_filter: 0,
            mouse_auto_click: -1,
            shortkey_target: String::new(),
            click_response_time: 0,
            ignore_repeat_click_time: 0,
        }
    }
}

impl AccessibilitySettings {
    /// Applies `change`; returns whether the stored value moved.
    pub fn apply(&mut self, change: &ConfigChange) -> bool {
        fn set<T: PartialEq + Clone>(slot: &mut T, value: &T) -> bool {
            if slot == value {
                return false;
            }
            *slot = value.clone();
            true
        }
        match change {
            ConfigChange::State(v) => set(&mut self.config_state, v),
            ConfigChange::AudioBalance(v) => set(&mut self.audio_balance, v),
            ConfigChange::BrightnessDiscount(v) => set(&mut self.brightness_discount, v),
            ConfigChange::ContentTimeout(v) => set(&mut self.content_timeout, v),
            ConfigChange::DaltonizationColorFilter(v) => {
                set(&mut self.daltonization_color_filter, v)
            }
            ConfigChange::MouseAutoClick(v) => set(&mut self.mouse_auto_click, v),
            ConfigChange::ShortkeyTarget(v) => set(&mut self.shortkey_target, v),
            ConfigChange::ClickResponseTime(v) => set(&mut self.click_response_time, v),
            ConfigChange::IgnoreRepeatClickTime(v) => set(&mut self.ignore_repeat_click_time, v),
        }
    }

    /// Every setting as a change, in observer code order.
    pub fn changes(&self) -> Vec<ConfigChange> {
        vec![
            ConfigChange::State(self.config_state),
            ConfigChange::AudioBalance(self.audio_balance),
            ConfigChange::BrightnessDiscount(self.brightness_discount),
            ConfigChange::ContentTimeout(self.content_timeout),
            ConfigChange::DaltonizationColorFilter(self.daltonization_color_filter),
            ConfigChange::MouseAutoClick(self.mouse_auto_click),
            ConfigChange::ShortkeyTarget(self.shortkey_target.clone()),
            ConfigChange::ClickResponseTime(self.click_response_time),
            ConfigChange::IgnoreRepeatClickTime(self.ignore_repeat_click_time),
        ]
    }
}

fn log_delivery(what: &'static str, result: RetResult<()>) {
    if let Err(err) = result {
        debug!(target: "a11y::manager", what, error = %err, "notification not delivered");
    }
}

struct Registered<T: ?Sized> {
    object: Option<ObjectId>,
    observer: Arc<T>,
}

struct ObserverList<T: ?Sized> {
    entries: Vec<Registered<T>>,
}

impl<T: ?Sized> Default for ObserverList<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T: ?Sized> ObserverList<T> {
    fn add(&mut self, object: Option<ObjectId>, observer: Arc<T>) {
        if let Some(id) = object {
            self.entries.retain(|entry| entry.object != Some(id));
        }
        self.entries.push(Registered { object, observer });
    }

    fn remove(&mut self, id: ObjectId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.object != Some(id));
        before != self.entries.len()
    }

    fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.observer))
            .collect()
    }
}

struct OperatorEntry {
    object: Option<ObjectId>,
    operator: Arc<dyn ElementOperator>,
}

struct Connection {
    ability_id: String,
    capabilities: u32,
    event_types: u32,
    target_bundles: Vec<String>,
    client: Arc<dyn AbilityClient>,
    client_object: Option<ObjectId>,
    endpoint: Endpoint,
}

#[derive(Default)]
struct ManagerState {
    operators: HashMap<(i32, i32), OperatorEntry>,
    next_tree_id: i32,
    windows: BTreeMap<i32, WindowInfo>,
    active_window: Option<i32>,
    focused_window: Option<i32>,
    state: u32,
    installed: BTreeMap<String, AbilityInfo>,
    /// Ability id to the capabilities it was enabled with.
    enabled: BTreeMap<String, u32>,
    connections: BTreeMap<i32, Connection>,
    next_channel_id: i32,
    caption: CaptionProperty,
    settings: AccessibilitySettings,
    key_sequence: i32,
    key_results: VecDeque<(i32, Option<bool>)>,
    gestures: VecDeque<GesturePath>,
    state_observers: ObserverList<dyn StateObserver>,
    config_observers: ObserverList<dyn ConfigObserver>,
    caption_observers: ObserverList<dyn CaptionObserver>,
    list_observers: ObserverList<dyn EnableAbilityListsObserver>,
}

impl ManagerState {
    fn compute_state(&self) -> u32 {
        let mut bits = 0;
        for capabilities in self
            .connections
            .values()
            .map(|connection| connection.capabilities)
            .chain(self.enabled.values().copied())
        {
            bits |= state::ACCESSIBILITY_ENABLED;
            if capabilities & capability::TOUCH_GUIDE != 0 {
                bits |= state::TOUCH_GUIDE;
            }
            if capabilities & capability::KEY_EVENT_OBSERVER != 0 {
                bits |= state::KEY_EVENT_OBSERVER;
            }
            if capabilities & capability::GESTURE != 0 {
                bits |= state::GESTURE;
            }
        }
        bits
    }

    fn connection_for(&self, ability_id: &str) -> Option<i32> {
        self.connections
            .iter()
            .find(|(_, connection)| connection.ability_id == ability_id)
            .map(|(channel_id, _)| *channel_id)
    }
}

pub struct AccessibilityManager {
    this: Weak<AccessibilityManager>,
    identity: CallerIdentity,
    config: IpcConfig,
    state: Mutex<ManagerState>,
}

impl AccessibilityManager {
    /// `identity` is what the manager's endpoints and channels run as.
    pub fn new(identity: CallerIdentity, config: IpcConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            identity,
            config,
            state: Mutex::new(ManagerState {
                next_tree_id: ROOT_TREE_ID + 1,
                next_channel_id: 1,
                ..ManagerState::default()
            }),
        })
    }

    /// Hosts the manager service on a new endpoint.
    pub fn host(self: &Arc<Self>) -> Endpoint {
        host(
            ManagerServiceStub::new(Arc::clone(self)),
            self.identity.clone(),
            self.config.transport(),
        )
    }

    pub fn install_ability(&self, info: AbilityInfo) {
        info!(target: "a11y::manager", ability = %info.id, "ability installed");
        let observers = {
            let mut state = self.state.lock();
            state.installed.insert(info.id.clone(), info);
            state.list_observers.snapshot()
        };
        for observer in observers {
            log_delivery("install list", observer.on_install_ability_lists_changed());
        }
    }

    pub fn update_window(&self, window: WindowInfo) {
        let mut state = self.state.lock();
        if window.active {
            state.active_window = Some(window.window_id);
        }
        if window.focused {
            state.focused_window = Some(window.window_id);
        }
        state.windows.insert(window.window_id, window);
    }

    pub fn remove_window(&self, window_id: i32) -> Option<WindowInfo> {
        let mut state = self.state.lock();
        if state.active_window == Some(window_id) {
            state.active_window = None;
        }
        if state.focused_window == Some(window_id) {
            state.focused_window = None;
        }
        state.windows.remove(&window_id)
    }

    pub fn update_config(&self, change: ConfigChange) {
        let observers = {
            let mut state = self.state.lock();
            if !state.settings.apply(&change) {
                return;
            }
            state.config_observers.snapshot()
        };
        debug!(target: "a11y::manager", ?change, observers = observers.len(), "config changed");
        for observer in observers {
            log_delivery("config", change.deliver(observer.as_ref()));
        }
    }

    pub fn settings(&self) -> AccessibilitySettings {
        self.state.lock().settings.clone()
    }

    pub fn current_state(&self) -> u32 {
        self.state.lock().state
    }

    /// Connects a client to an enabled ability: hosts its channel and hands
    /// it over through `init`. Returns the channel id.
    pub fn connect_ability(&self, ability_id: &str, client: Arc<dyn AbilityClient>) -> RetResult<i32> {
        let (capabilities, event_types) = {
            let state = self.state.lock();
            let Some(info) = state.installed.get(ability_id) else {
                return Err(RetError::NotInstalled);
            };
            let Some(granted) = state.enabled.get(ability_id) else {
                return Err(RetError::NotEnabled);
            };
            (*granted, info.event_types)
        };
        self.attach(ability_id, capabilities, event_types, client)
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Sends a key event to every connection observing keys. Returns the
    /// sequence number answers are filed under.
    pub fn dispatch_key_event(&self, key_event: KeyEvent) -> i32 {
        let (sequence, targets) = {
            let mut state = self.state.lock();
            state.key_sequence = state.key_sequence.wrapping_add(1);
            let sequence = state.key_sequence;
            state.key_results.retain(|(pending, _)| *pending != sequence);
            state.key_results.push_back((sequence, None));
            if state.key_results.len() > KEY_EVENT_BACKLOG {
                state.key_results.pop_front();
            }
            let targets: Vec<_> = state
                .connections
                .values()
                .filter(|connection| connection.capabilities & capability::KEY_EVENT_OBSERVER != 0)
                .map(|connection| Arc::clone(&connection.client))
                .collect();
            (state.key_sequence, targets)
        };
        for client in targets {
            log_delivery("key event", client.on_key_pressed_event(key_event, sequence));
        }
        sequence
    }

    /// Removes and returns the answer filed for `sequence`, if one arrived.
    pub fn take_key_event_result(&self, sequence: i32) -> Option<bool> {
        let mut state = self.state.lock();
        let index = state
            .key_results
            .iter()
            .position(|(pending, handled)| *pending == sequence && handled.is_some())?;
        state.key_results.remove(index).and_then(|(_, handled)| handled)
    }

    pub fn injected_gestures(&self) -> Vec<GesturePath> {
        self.state.lock().gestures.iter().cloned().collect()
    }

    pub(crate) fn operator(&self, window_id: i32, tree_id: i32) -> Option<Arc<dyn ElementOperator>> {
        self.state
            .lock()
            .operators
            .get(&(window_id, tree_id))
            .map(|entry| Arc::clone(&entry.operator))
    }

    pub(crate) fn window(&self, window_id: i32) -> Option<WindowInfo> {
        self.state.lock().windows.get(&window_id).cloned()
    }

    pub(crate) fn windows(&self) -> Vec<WindowInfo> {
        self.state.lock().windows.values().cloned().collect()
    }

    /// The first answer for a dispatched sequence wins; anything else is
    /// dropped.
    pub(crate) fn record_key_result(&self, sequence: i32, handled: bool) {
        let mut state = self.state.lock();
        match state
            .key_results
            .iter_mut()
            .find(|(pending, answer)| *pending == sequence && answer.is_none())
        {
            Some((_, answer)) => *answer = Some(handled),
            None => debug!(target: "a11y::manager", sequence, "key result for no pending event"),
        }
    }

    pub(crate) fn record_gesture(&self, path: GesturePath) {
        let mut state = self.state.lock();
        state.gestures.push_back(path);
        if state.gestures.len() > GESTURE_BACKLOG {
            state.gestures.pop_front();
        }
    }

    pub(crate) fn set_target_bundles(&self, channel_id: i32, bundle_names: Vec<String>) -> RetResult<()> {
        let mut state = self.state.lock();
        let connection = state
            .connections
            .get_mut(&channel_id)
            .ok_or(RetError::NoConnection)?;
        connection.target_bundles = bundle_names;
        Ok(())
    }

    fn attach(
        &self,
        ability_id: &str,
        capabilities: u32,
        event_types: u32,
        client: Arc<dyn AbilityClient>,
    ) -> RetResult<i32> {
        let client_object = client.as_object();
        let (channel_id, channel) = {
            let mut state = self.state.lock();
            if state.connection_for(ability_id).is_some() {
                return Err(RetError::ConnectionExist);
            }
            let channel_id = state.next_channel_id;
            state.next_channel_id += 1;
            let handler = ChannelHandler::new(self.this.clone(), channel_id, capabilities);
            let endpoint = host(
                AbilityChannelStub::new(Arc::new(handler)),
                self.identity.clone(),
                self.config.transport(),
            );
            let channel = AbilityChannelProxy::shared(endpoint.remote());
            state.connections.insert(
                channel_id,
                Connection {
                    ability_id: ability_id.to_string(),
                    capabilities,
                    event_types,
                    target_bundles: Vec::new(),
                    client: Arc::clone(&client),
                    client_object: client_object.as_ref().map(RemoteObject::id),
                    endpoint,
                },
            );
            (channel_id, channel)
        };
        info!(target: "a11y::manager", ability = ability_id, channel_id, "ability connected");
        self.refresh_state();
        self.watch(client_object, move |manager, object| {
            let stale = {
                let mut state = manager.state.lock();
                let matches = state
                    .connections
                    .get(&channel_id)
                    .is_some_and(|connection| connection.client_object == Some(object));
                if matches {
                    state.connections.remove(&channel_id)
                } else {
                    None
                }
            };
            if stale.is_some() {
                info!(target: "a11y::manager", channel_id, "ability client died");
                drop(stale);
                manager.refresh_state();
            }
        });
        if let Err(err) = client.init(channel, channel_id) {
            warn!(target: "a11y::manager", ability = ability_id, channel_id, error = %err, "ability init failed");
            let stale = self.state.lock().connections.remove(&channel_id);
            drop(stale);
            self.refresh_state();
            return Err(err);
        }
        Ok(channel_id)
    }

    fn detach(&self, channel_id: i32) {
        let Some(connection) = self.state.lock().connections.remove(&channel_id) else {
            return;
        };
        log_delivery("disconnect", connection.client.disconnect(channel_id));
        info!(
            target: "a11y::manager",
            ability = %connection.ability_id,
            channel_id,
            channel = %connection.endpoint.id(),
            "ability disconnected"
        );
        drop(connection);
        self.refresh_state();
    }

    /// Recomputes the state bits and notifies state observers when they move.
    fn refresh_state(&self) {
        let (bits, observers) = {
            let mut state = self.state.lock();
            let bits = state.compute_state();
            if bits == state.state {
                return;
            }
            state.state = bits;
            (bits, state.state_observers.snapshot())
        };
        debug!(target: "a11y::manager", state = bits, "state changed");
        for observer in observers {
            log_delivery("state", observer.on_state_changed(bits));
        }
    }

    fn notify_enable_lists(&self) {
        let observers = self.state.lock().list_observers.snapshot();
        for observer in observers {
            log_delivery("enable list", observer.on_enable_ability_lists_changed());
        }
    }

    /// Runs `prune` when `object`'s endpoint dies. Must not be called with
    /// the state lock held; the recipient runs inline for dead objects.
    fn watch<F>(&self, object: Option<RemoteObject>, prune: F)
    where
        F: FnOnce(&AccessibilityManager, ObjectId) + Send + 'static,
    {
        let Some(object) = object else {
            return;
        };
        let manager = self.this.clone();
        object.add_death_recipient(move |id| {
            if let Some(manager) = manager.upgrade() {
                prune(&manager, id);
            }
        });
    }
}

impl ManagerService for AccessibilityManager {
    fn send_event(&self, event: EventInfo) -> RetResult<()> {
        let mask = event.event_type.value() as u32;
        let targets: Vec<_> = {
            let state = self.state.lock();
            state
                .connections
                .values()
                .filter(|connection| connection.event_types & mask != 0)
                .filter(|connection| {
                    connection.target_bundles.is_empty()
                        || connection.target_bundles.contains(&event.bundle_name)
                })
                .map(|connection| Arc::clone(&connection.client))
                .collect()
        };
        debug!(
            target: "a11y::manager",
            event = ?event.event_type,
            window_id = event.window_id,
            receivers = targets.len(),
            "event"
        );
        for client in targets {
            log_delivery("accessibility event", client.on_accessibility_event(event.clone()));
        }
        Ok(())
    }

    fn register_state_observer(&self, observer: Arc<dyn StateObserver>) -> RetResult<u32> {
        let object = observer.as_object();
        let bits = {
            let mut state = self.state.lock();
            state
                .state_observers
                .add(object.as_ref().map(RemoteObject::id), observer);
            state.state
        };
        self.watch(object, |manager, id| {
            manager.state.lock().state_observers.remove(id);
        });
        Ok(bits)
    }

    fn get_ability_list(
        &self,
        ability_types: u32,
        selection: AbilityStateType,
    ) -> RetResult<Vec<AbilityInfo>> {
        let state = self.state.lock();
        let abilities = state
            .installed
            .values()
            .filter(|info| ability_types == u32::MAX || info.ability_types & ability_types != 0)
            .filter(|info| {
                let enabled = state.enabled.contains_key(&info.id);
                match selection {
                    AbilityStateType::Enabled => enabled,
                    AbilityStateType::Disabled => !enabled,
                    AbilityStateType::Installed => true,
                }
            })
            .cloned()
            .collect();
        Ok(abilities)
    }

    fn register_element_operator(
        &self,
        window_id: i32,
        operator: Arc<dyn ElementOperator>,
    ) -> RetResult<()> {
        let object = operator.as_object();
        let replaced = self.state.lock().operators.insert(
            (window_id, ROOT_TREE_ID),
            OperatorEntry {
                object: object.as_ref().map(RemoteObject::id),
                operator,
            },
        );
        debug!(
            target: "a11y::manager",
            window_id,
            replaced = replaced.is_some(),
            "element operator registered"
        );
        self.watch_operator(object, window_id, ROOT_TREE_ID);
        Ok(())
    }

    fn register_element_operator_with_parameter(
        &self,
        parameter: RegistrationPara,
        operator: Arc<dyn ElementOperator>,
    ) -> RetResult<i32> {
        let (tree_id, parent) = {
            let mut state = self.state.lock();
            let parent = state
                .operators
                .get(&(parameter.parent_window_id, parameter.parent_tree_id))
                .map(|entry| Arc::clone(&entry.operator))
                .ok_or(RetError::NoWindowConnection)?;
            let tree_id = state.next_tree_id;
            state.next_tree_id += 1;
            (tree_id, parent)
        };
        // Both sides learn about the new tree before it becomes routable, so
        // a failed handshake leaves nothing registered.
        operator.set_belong_tree_id(tree_id)?;
        operator.set_parent_window_id(parameter.parent_window_id)?;
        parent.set_child_tree_id_and_win_id(parameter.element_id, tree_id, parameter.window_id)?;

        let object = operator.as_object();
        self.state.lock().operators.insert(
            (parameter.window_id, tree_id),
            OperatorEntry {
                object: object.as_ref().map(RemoteObject::id),
                operator,
            },
        );
        debug!(
            target: "a11y::manager",
            window_id = parameter.window_id,
            tree_id,
            parent_window_id = parameter.parent_window_id,
            "embedded element operator registered"
        );
        self.watch_operator(object, parameter.window_id, tree_id);
        Ok(tree_id)
    }

    fn deregister_element_operator(&self, window_id: i32) -> RetResult<()> {
        let mut state = self.state.lock();
        let before = state.operators.len();
        state.operators.retain(|(window, _), _| *window != window_id);
        if state.operators.len() == before {
            return Err(RetError::NoWindowConnection);
        }
        debug!(target: "a11y::manager", window_id, "element operators deregistered");
        Ok(())
    }

    fn get_enabled_abilities(&self) -> RetResult<Vec<String>> {
        Ok(self.state.lock().enabled.keys().cloned().collect())
    }

    fn enable_abilities(&self, name: &str, capabilities: u32) -> RetResult<()> {
        {
            let mut state = self.state.lock();
            let info = state.installed.get(name).ok_or(RetError::NotInstalled)?;
            if capabilities & !info.capabilities != 0 {
                return Err(RetError::NoCapability);
            }
            if state.enabled.contains_key(name) {
                return Err(RetError::ConnectionExist);
            }
            state.enabled.insert(name.to_string(), capabilities);
        }
        info!(target: "a11y::manager", ability = name, capabilities, "ability enabled");
        self.refresh_state();
        self.notify_enable_lists();
        Ok(())
    }

    fn disable_ability(&self, name: &str) -> RetResult<()> {
        let channel_id = {
            let mut state = self.state.lock();
            if state.enabled.remove(name).is_none() {
                return Err(RetError::NotEnabled);
            }
            state.connection_for(name)
        };
        info!(target: "a11y::manager", ability = name, "ability disabled");
        if let Some(channel_id) = channel_id {
            self.detach(channel_id);
        }
        self.refresh_state();
        self.notify_enable_lists();
        Ok(())
    }

    fn enable_ui_test_ability(&self, client: Arc<dyn AbilityClient>) -> RetResult<()> {
        self.attach(UI_TEST_ABILITY_ID, UI_TEST_CAPABILITIES, u32::MAX, client)
            .map(|_| ())
    }

    fn disable_ui_test_ability(&self) -> RetResult<()> {
        let channel_id = self
            .state
            .lock()
            .connection_for(UI_TEST_ABILITY_ID)
            .ok_or(RetError::NoConnection)?;
        self.detach(channel_id);
        Ok(())
    }

    fn get_active_window(&self) -> RetResult<i32> {
        Ok(self.state.lock().active_window.unwrap_or(-1))
    }

    fn register_config_observer(&self, observer: Arc<dyn ConfigObserver>) -> RetResult<()> {
        let object = observer.as_object();
        let current = {
            let mut state = self.state.lock();
            state
                .config_observers
                .add(object.as_ref().map(RemoteObject::id), Arc::clone(&observer));
            state.settings.changes()
        };
        self.watch(object, |manager, id| {
            manager.state.lock().config_observers.remove(id);
        });
        for change in current {
            if let Err(err) = change.deliver(observer.as_ref()) {
                warn!(target: "a11y::manager", error = %err, "config observer unreachable");
                break;
            }
        }
        Ok(())
    }

    fn register_enable_ability_lists_observer(
        &self,
        observer: Arc<dyn EnableAbilityListsObserver>,
    ) -> RetResult<()> {
        let object = observer.as_object();
        self.state
            .lock()
            .list_observers
            .add(object.as_ref().map(RemoteObject::id), observer);
        self.watch(object, |manager, id| {
            manager.state.lock().list_observers.remove(id);
        });
        Ok(())
    }

    fn register_caption_observer(&self, observer: Arc<dyn CaptionObserver>) -> RetResult<()> {
        let object = observer.as_object();
        self.state
            .lock()
            .caption_observers
            .add(object.as_ref().map(RemoteObject::id), observer);
        self.watch(object, |manager, id| {
            manager.state.lock().caption_observers.remove(id);
        });
        Ok(())
    }

    fn get_caption_property(&self) -> RetResult<CaptionProperty> {
        Ok(self.state.lock().caption.clone())
    }

    fn set_caption_property(&self, property: CaptionProperty) -> RetResult<()> {
        let observers = {
            let mut state = self.state.lock();
            if state.caption == property {
                return Ok(());
            }
            state.caption = property.clone();
            state.caption_observers.snapshot()
        };
        for observer in observers {
            log_delivery("caption", observer.on_property_changed(property.clone()));
        }
        Ok(())
    }

    fn get_focused_window_id(&self) -> RetResult<i32> {
        Ok(self.state.lock().focused_window.unwrap_or(-1))
    }
}

impl AccessibilityManager {
    fn watch_operator(&self, object: Option<RemoteObject>, window_id: i32, tree_id: i32) {
        self.watch(object, move |manager, id| {
            let mut state = manager.state.lock();
            let matches = state
                .operators
                .get(&(window_id, tree_id))
                .is_some_and(|entry| entry.object == Some(id));
            if matches {
                state.operators.remove(&(window_id, tree_id));
                debug!(target: "a11y::manager", window_id, tree_id, "element operator died");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::{
        AbilityChannel, ElementOperatorProxy, ManagerServiceProxy, StateObserverStub,
    };
    use crate::model::ElementInfo;
    use crate::snapshot::SnapshotOperator;
    use crate::permission::WRITE_ACCESSIBILITY_CONFIG;
    use ipc_transport::{IdentityScope, TransportConfig};
    use std::sync::mpsc;
    use std::time::Duration;

    fn system() -> CallerIdentity {
        CallerIdentity::new(1, 1000).with_system_app()
    }

    struct StateRecorder(Mutex<mpsc::Sender<u32>>);

    impl StateObserver for StateRecorder {
        fn on_state_changed(&self, state: u32) -> RetResult<()> {
            let _ = self.0.lock().send(state);
            Ok(())
        }
    }

    struct NullClient;

    impl AbilityClient for NullClient {
        fn init(&self, _channel: Arc<dyn AbilityChannel>, _channel_id: i32) -> RetResult<()> {
            Ok(())
        }
        fn disconnect(&self, _channel_id: i32) -> RetResult<()> {
            Ok(())
        }
        fn on_accessibility_event(&self, _event: EventInfo) -> RetResult<()> {
            Ok(())
        }
        fn on_key_pressed_event(&self, _key_event: KeyEvent, _sequence: i32) -> RetResult<()> {
            Ok(())
        }
    }

    #[test_timeout::timeout]
    fn settings_only_report_real_changes() {
        let mut settings = AccessibilitySettings::default();
        assert!(!settings.apply(&ConfigChange::MouseAutoClick(-1)));
        assert!(settings.apply(&ConfigChange::ShortkeyTarget("reader".into())));
        assert_eq!(settings.changes().len(), 9);
        assert_eq!(settings.changes()[6], ConfigChange::ShortkeyTarget("reader".into()));
    }

    #[test_timeout::timeout]
    fn enabling_requires_install_and_known_capabilities() {
        let manager = AccessibilityManager::new(system(), IpcConfig::default());
        assert_eq!(
            manager.enable_abilities("com.example/Reader", capability::RETRIEVE),
            Err(RetError::NotInstalled)
        );
        manager.install_ability(AbilityInfo::new("com.example", "Reader", capability::RETRIEVE));
        assert_eq!(
            manager.enable_abilities("com.example/Reader", capability::GESTURE),
            Err(RetError::NoCapability)
        );
        manager
            .enable_abilities("com.example/Reader", capability::RETRIEVE)
            .unwrap();
        assert_eq!(
            manager.get_enabled_abilities().unwrap(),
            vec!["com.example/Reader".to_string()]
        );
        assert_eq!(manager.current_state(), state::ACCESSIBILITY_ENABLED);

        let disabled = manager
            .get_ability_list(u32::MAX, AbilityStateType::Disabled)
            .unwrap();
        assert!(disabled.is_empty());
        manager.disable_ability("com.example/Reader").unwrap();
        assert_eq!(manager.current_state(), 0);
        assert_eq!(
            manager.disable_ability("com.example/Reader"),
            Err(RetError::NotEnabled)
        );
    }

    #[test_timeout::timeout]
    fn state_observer_is_notified_and_pruned_on_death() {
        let manager = AccessibilityManager::new(system(), IpcConfig::default());
        let (tx, rx) = mpsc::channel();
        let endpoint = host(
            StateObserverStub::new(Arc::new(StateRecorder(Mutex::new(tx)))),
            CallerIdentity::new(40, 20010040),
            TransportConfig::default(),
        );
        let observer = crate::interfaces::StateObserverProxy::shared(endpoint.remote());
        assert_eq!(manager.register_state_observer(observer).unwrap(), 0);

        manager.install_ability(AbilityInfo::new("com.example", "Reader", capability::GESTURE));
        manager
            .enable_abilities("com.example/Reader", capability::GESTURE)
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            state::ACCESSIBILITY_ENABLED | state::GESTURE
        );

        drop(endpoint);
        assert!(manager.state.lock().state_observers.entries.is_empty());
    }

    #[test_timeout::timeout]
    fn ui_test_ability_needs_debug_harness_over_ipc() {
        let manager = AccessibilityManager::new(system(), IpcConfig::default());
        let endpoint = manager.host();
        let proxy = ManagerServiceProxy::new(endpoint.remote());
        let client_endpoint = host(
            crate::interfaces::AbilityClientStub::new(Arc::new(NullClient)),
            CallerIdentity::new(60, 20010060),
            TransportConfig::default(),
        );
        let client = crate::interfaces::AbilityClientProxy::shared(client_endpoint.remote());

        {
            let _caller = IdentityScope::enter(CallerIdentity::new(60, 20010060));
            assert_eq!(
                proxy.enable_ui_test_ability(Arc::clone(&client)),
                Err(RetError::NoPermission)
            );
        }
        assert_eq!(manager.connection_count(), 0);

        let _harness = IdentityScope::enter(CallerIdentity::new(61, 20010061).with_debug_harness());
        proxy.enable_ui_test_ability(Arc::clone(&client)).unwrap();
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(
            proxy.enable_ui_test_ability(client),
            Err(RetError::ConnectionExist)
        );
        proxy.disable_ui_test_ability().unwrap();
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(proxy.disable_ui_test_ability(), Err(RetError::NoConnection));
    }

    #[test_timeout::timeout]
    fn caption_write_needs_system_app_with_permission() {
        let manager = AccessibilityManager::new(system(), IpcConfig::default());
        let endpoint = manager.host();
        let proxy = ManagerServiceProxy::new(endpoint.remote());
        let property = CaptionProperty {
            enabled: true,
            font_scale: 150,
            ..CaptionProperty::default()
        };

        {
            let _caller = IdentityScope::enter(CallerIdentity::new(70, 20010070).with_system_app());
            assert_eq!(
                proxy.set_caption_property(property.clone()),
                Err(RetError::NoPermission)
            );
        }
        let _settings = IdentityScope::enter(
            CallerIdentity::new(71, 1000)
                .with_system_app()
                .with_permission(WRITE_ACCESSIBILITY_CONFIG),
        );
        proxy.set_caption_property(property.clone()).unwrap();
        assert_eq!(manager.get_caption_property().unwrap(), property);
    }

    #[test_timeout::timeout]
    fn key_results_are_consumed_once_and_bounded() {
        let manager = AccessibilityManager::new(system(), IpcConfig::default());
        manager.record_key_result(1, true);
        assert_eq!(manager.take_key_event_result(1), None);

        manager.state.lock().key_sequence = i32::MAX;
        let sequence = manager.dispatch_key_event(KeyEvent::default());
        assert_eq!(sequence, i32::MIN);
        manager.record_key_result(sequence, true);
        manager.record_key_result(sequence, false);
        assert_eq!(manager.take_key_event_result(sequence), Some(true));
        assert_eq!(manager.take_key_event_result(sequence), None);

        for _ in 0..KEY_EVENT_BACKLOG * 2 {
            let sequence = manager.dispatch_key_event(KeyEvent::default());
            manager.record_key_result(sequence, true);
        }
        assert_eq!(manager.state.lock().key_results.len(), KEY_EVENT_BACKLOG);

        for _ in 0..GESTURE_BACKLOG + 5 {
            manager.record_gesture(GesturePath::default());
        }
        assert_eq!(manager.injected_gestures().len(), GESTURE_BACKLOG);
    }

    #[test_timeout::timeout]
    fn failed_embedding_handshake_registers_nothing() {
        let config = IpcConfig::default();
        let manager = AccessibilityManager::new(system(), config.clone());
        let parent = SnapshotOperator::new(1, vec![ElementInfo::new(1, 10)]);
        manager.register_element_operator(1, parent.clone()).unwrap();

        let child = SnapshotOperator::new(2, vec![ElementInfo::new(2, 20)]);
        let endpoint = child.host(system(), &config);
        let unreachable = ElementOperatorProxy::shared(endpoint.remote());
        endpoint.shutdown();

        let parameter = RegistrationPara {
            window_id: 2,
            parent_window_id: 1,
            parent_tree_id: ROOT_TREE_ID,
            element_id: 10,
        };
        assert_eq!(
            manager.register_element_operator_with_parameter(parameter, unreachable),
            Err(RetError::IpcFailed)
        );
        assert!(manager
            .state
            .lock()
            .operators
            .keys()
            .all(|(window_id, _)| *window_id != 2));
        assert_eq!(parent.element(10).unwrap().child_tree_id, 0);

        let tree_id = manager
            .register_element_operator_with_parameter(parameter, child.clone())
            .unwrap();
        assert!(manager.operator(2, tree_id).is_some());
        assert_eq!(child.belong_tree_id(), tree_id);
        assert_eq!(child.parent_window_id(), 1);
        assert_eq!(parent.element(10).unwrap().child_tree_id, tree_id);
    }
}
