//! The channel the manager hands to each connected accessibility service.
//!
//! Search calls are blocking so the service learns immediately whether the
//! request was routed; the elements themselves come back through the
//! callback carried by the request.

use std::collections::BTreeMap;
use std::sync::Arc;

use ipc_transport::{CallContext, CallMode, Parcel, RemoteObject, StubError};
use tracing::debug;

use super::element_operator_callback::{ElementOperatorCallback, ElementOperatorCallbackProxy};
use crate::codec::{ParcelExt, MAX_ALLOW_SIZE};
use crate::dispatch::{
    object_of, read_required_object, write_result, write_ret, InterfaceStub, ProxyCore, RouteSpec,
};
use crate::error::RetResult;
use crate::model::{
    ActionType, ElementBasicInfo, FocusMoveDirection, FocusType, GesturePath, SearchMode, WindowInfo,
};

pub const DESCRIPTOR: &str = "OHOS.Accessibility.IAccessibleAbilityChannel";

pub mod codes {
    pub const SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID: u32 = 400;
    pub const SEARCH_ELEMENT_INFOS_BY_TEXT: u32 = 401;
    pub const FIND_FOCUSED_ELEMENT_INFO: u32 = 402;
    pub const FOCUS_MOVE_SEARCH: u32 = 403;
    pub const EXECUTE_ACTION: u32 = 404;
    pub const GET_CURSOR_POSITION: u32 = 405;
    pub const GET_WINDOW: u32 = 406;
    pub const GET_WINDOWS: u32 = 407;
    pub const SET_ON_KEY_PRESS_EVENT_RESULT: u32 = 408;
    pub const SEND_SIMULATE_GESTURE_PATH: u32 = 409;
    pub const SET_TARGET_BUNDLE_NAME: u32 = 410;
}

pub trait AbilityChannel: Send + Sync + 'static {
    fn search_element_info_by_accessibility_id(
        &self,
        target: ElementBasicInfo,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
        mode: SearchMode,
        is_filter: bool,
        system_api: bool,
    ) -> RetResult<()>;

    fn search_element_infos_by_text(
        &self,
        window_id: i32,
        element_id: i64,
        text: &str,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()>;

    fn find_focused_element_info(
        &self,
        window_id: i32,
        element_id: i64,
        focus_type: FocusType,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()>;

    fn focus_move_search(
        &self,
        window_id: i32,
        element_id: i64,
        direction: FocusMoveDirection,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()>;

    #[allow(clippy::too_many_arguments)]
    fn execute_action(
        &self,
        window_id: i32,
        element_id: i64,
        action: ActionType,
        arguments: &BTreeMap<String, String>,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()>;

    fn get_cursor_position(
        &self,
        window_id: i32,
        element_id: i64,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()>;

    fn get_window(&self, window_id: i32) -> RetResult<WindowInfo>;

    fn get_windows(&self) -> RetResult<Vec<WindowInfo>>;

    fn set_on_key_press_event_result(&self, handled: bool, sequence: i32) -> RetResult<()>;

    fn send_simulate_gesture(&self, path: GesturePath) -> RetResult<()>;

    fn set_target_bundle_name(&self, bundle_names: Vec<String>) -> RetResult<()>;

    fn as_object(&self) -> Option<RemoteObject> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct AbilityChannelProxy {
    core: ProxyCore,
}

impl AbilityChannelProxy {
    pub fn new(remote: RemoteObject) -> Self {
        Self {
            core: ProxyCore::new(remote, DESCRIPTOR),
        }
    }

    pub fn shared(remote: RemoteObject) -> Arc<dyn AbilityChannel> {
        Arc::new(Self::new(remote))
    }
}

impl AbilityChannel for AbilityChannelProxy {
    fn search_element_info_by_accessibility_id(
        &self,
        target: ElementBasicInfo,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
        mode: SearchMode,
        is_filter: bool,
        system_api: bool,
    ) -> RetResult<()> {
        let callback = object_of(callback.as_object())?;
        self.core.call_ret(
            codes::SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID,
            "search_element_info_by_accessibility_id",
            |data| {
                data.write_parcelable(&target)?;
                data.write_i32(request_id)?;
                data.write_remote_object(Some(&callback))?;
                data.write_enum(mode)?;
                data.write_bool(is_filter)?;
                data.write_bool(system_api)
            },
        )
    }

    fn search_element_infos_by_text(
        &self,
        window_id: i32,
        element_id: i64,
        text: &str,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        let callback = object_of(callback.as_object())?;
        self.core.call_ret(
            codes::SEARCH_ELEMENT_INFOS_BY_TEXT,
            "search_element_infos_by_text",
            |data| {
                data.write_i32(window_id)?;
                data.write_i64(element_id)?;
                data.write_string(text)?;
                data.write_i32(request_id)?;
                data.write_remote_object(Some(&callback))
            },
        )
    }

    fn find_focused_element_info(
        &self,
        window_id: i32,
        element_id: i64,
        focus_type: FocusType,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        let callback = object_of(callback.as_object())?;
        self.core.call_ret(
            codes::FIND_FOCUSED_ELEMENT_INFO,
            "find_focused_element_info",
            |data| {
                data.write_i32(window_id)?;
                data.write_i64(element_id)?;
                data.write_enum(focus_type)?;
                data.write_i32(request_id)?;
                data.write_remote_object(Some(&callback))
            },
        )
    }

    fn focus_move_search(
        &self,
        window_id: i32,
        element_id: i64,
        direction: FocusMoveDirection,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        let callback = object_of(callback.as_object())?;
        self.core
            .call_ret(codes::FOCUS_MOVE_SEARCH, "focus_move_search", |data| {
                data.write_i32(window_id)?;
                data.write_i64(element_id)?;
                data.write_enum(direction)?;
                data.write_i32(request_id)?;
                data.write_remote_object(Some(&callback))
            })
    }

    fn execute_action(
        &self,
        window_id: i32,
        element_id: i64,
        action: ActionType,
        arguments: &BTreeMap<String, String>,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        let callback = object_of(callback.as_object())?;
        self.core.call_ret(codes::EXECUTE_ACTION, "execute_action", |data| {
            data.write_i32(window_id)?;
            data.write_i64(element_id)?;
            data.write_enum(action)?;
            data.write_string_map(arguments)?;
            data.write_i32(request_id)?;
            data.write_remote_object(Some(&callback))
        })
    }

    fn get_cursor_position(
        &self,
        window_id: i32,
        element_id: i64,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        let callback = object_of(callback.as_object())?;
        self.core
            .call_ret(codes::GET_CURSOR_POSITION, "get_cursor_position", |data| {
                data.write_i32(window_id)?;
                data.write_i64(element_id)?;
                data.write_i32(request_id)?;
                data.write_remote_object(Some(&callback))
            })
    }

    fn get_window(&self, window_id: i32) -> RetResult<WindowInfo> {
        self.core.call(
            codes::GET_WINDOW,
            "get_window",
            |data| data.write_i32(window_id),
            |reply| reply.read_parcelable(),
        )
    }

    fn get_windows(&self) -> RetResult<Vec<WindowInfo>> {
        self.core.call(
            codes::GET_WINDOWS,
            "get_windows",
            |_| Ok(()),
            |reply| reply.read_parcelable_vec(MAX_ALLOW_SIZE),
        )
    }

    fn set_on_key_press_event_result(&self, handled: bool, sequence: i32) -> RetResult<()> {
        self.core.send(
            codes::SET_ON_KEY_PRESS_EVENT_RESULT,
            "set_on_key_press_event_result",
            CallMode::OneWay,
            |data| {
                data.write_bool(handled)?;
                data.write_i32(sequence)
            },
        )
    }

    fn send_simulate_gesture(&self, path: GesturePath) -> RetResult<()> {
        self.core.call_ret(
            codes::SEND_SIMULATE_GESTURE_PATH,
            "send_simulate_gesture",
            |data| data.write_parcelable(&path),
        )
    }

    fn set_target_bundle_name(&self, bundle_names: Vec<String>) -> RetResult<()> {
        self.core.call_ret(
            codes::SET_TARGET_BUNDLE_NAME,
            "set_target_bundle_name",
            |data| data.write_string_vec(&bundle_names),
        )
    }

    fn as_object(&self) -> Option<RemoteObject> {
        Some(self.core.remote().clone())
    }
}

pub struct AbilityChannelStub<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: AbilityChannel + ?Sized> AbilityChannelStub<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

fn callback_from(data: &mut Parcel) -> Result<Arc<dyn ElementOperatorCallback>, StubError> {
    Ok(ElementOperatorCallbackProxy::shared(read_required_object(data)?))
}

impl<T: AbilityChannel + ?Sized> InterfaceStub for AbilityChannelStub<T> {
    const DESCRIPTOR: &'static str = DESCRIPTOR;
    const ROUTES: &'static [RouteSpec] = &[
        RouteSpec::open(
            codes::SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID,
            "search_element_info_by_accessibility_id",
        ),
        RouteSpec::open(codes::SEARCH_ELEMENT_INFOS_BY_TEXT, "search_element_infos_by_text"),
        RouteSpec::open(codes::FIND_FOCUSED_ELEMENT_INFO, "find_focused_element_info"),
        RouteSpec::open(codes::FOCUS_MOVE_SEARCH, "focus_move_search"),
        RouteSpec::open(codes::EXECUTE_ACTION, "execute_action"),
        RouteSpec::open(codes::GET_CURSOR_POSITION, "get_cursor_position"),
        RouteSpec::open(codes::GET_WINDOW, "get_window"),
        RouteSpec::open(codes::GET_WINDOWS, "get_windows"),
        RouteSpec::open(codes::SET_ON_KEY_PRESS_EVENT_RESULT, "set_on_key_press_event_result"),
        RouteSpec::open(codes::SEND_SIMULATE_GESTURE_PATH, "send_simulate_gesture"),
        RouteSpec::open(codes::SET_TARGET_BUNDLE_NAME, "set_target_bundle_name"),
    ];

    fn handle(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: &mut Parcel,
        _ctx: &CallContext,
    ) -> Result<(), StubError> {
        match code {
            codes::SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID => {
                let target = data.read_parcelable()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                let mode = data.read_enum()?;
                let is_filter = data.read_bool()?;
                let system_api = data.read_bool()?;
                let result = self.inner.search_element_info_by_accessibility_id(
                    target, request_id, callback, mode, is_filter, system_api,
                );
                write_ret(reply, result)
            }
            codes::SEARCH_ELEMENT_INFOS_BY_TEXT => {
                let window_id = data.read_i32()?;
                let element_id = data.read_i64()?;
                let text = data.read_string()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                let result = self.inner.search_element_infos_by_text(
                    window_id, element_id, &text, request_id, callback,
                );
                write_ret(reply, result)
            }
            codes::FIND_FOCUSED_ELEMENT_INFO => {
                let window_id = data.read_i32()?;
                let element_id = data.read_i64()?;
                let focus_type = data.read_enum()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                let result = self.inner.find_focused_element_info(
                    window_id, element_id, focus_type, request_id, callback,
                );
                write_ret(reply, result)
            }
            codes::FOCUS_MOVE_SEARCH => {
                let window_id = data.read_i32()?;
                let element_id = data.read_i64()?;
                let direction = data.read_enum()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                let result = self.inner.focus_move_search(
                    window_id, element_id, direction, request_id, callback,
                );
                write_ret(reply, result)
            }
            codes::EXECUTE_ACTION => {
                let window_id = data.read_i32()?;
                let element_id = data.read_i64()?;
                let action = data.read_enum()?;
                let arguments = data.read_string_map()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                let result = self.inner.execute_action(
                    window_id, element_id, action, &arguments, request_id, callback,
                );
                write_ret(reply, result)
            }
            codes::GET_CURSOR_POSITION => {
                let window_id = data.read_i32()?;
                let element_id = data.read_i64()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                let result = self
                    .inner
                    .get_cursor_position(window_id, element_id, request_id, callback);
                write_ret(reply, result)
            }
            codes::GET_WINDOW => {
                let window_id = data.read_i32()?;
                write_result(reply, self.inner.get_window(window_id), |reply, window| {
                    reply.write_parcelable(&window)
                })
            }
            codes::GET_WINDOWS => write_result(reply, self.inner.get_windows(), |reply, windows| {
                reply.write_parcelable_vec(&windows)
            }),
            codes::SET_ON_KEY_PRESS_EVENT_RESULT => {
                let handled = data.read_bool()?;
                let sequence = data.read_i32()?;
                if let Err(err) = self.inner.set_on_key_press_event_result(handled, sequence) {
                    debug!(target: "a11y::dispatch", interface = DESCRIPTOR, code, error = %err, "one-way call failed");
                }
                Ok(())
            }
            codes::SEND_SIMULATE_GESTURE_PATH => {
                let path = data.read_parcelable()?;
                write_ret(reply, self.inner.send_simulate_gesture(path))
            }
            codes::SET_TARGET_BUNDLE_NAME => {
                let bundle_names = data.read_string_vec(MAX_ALLOW_SIZE)?;
                write_ret(reply, self.inner.set_target_bundle_name(bundle_names))
            }
            other => Err(StubError::UnknownTransaction(other)),
        }
    }
}
