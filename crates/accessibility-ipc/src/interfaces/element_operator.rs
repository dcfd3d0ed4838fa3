//! Operations an application window exposes on its UI tree.
//!
//! Searches never answer inline: the operator replies later through the
//! [`ElementOperatorCallback`] passed with the request, tagged with the
//! request id. Search requests are sent deferred so bursts of them reach the
//! window's worker together.

use std::collections::BTreeMap;
use std::sync::Arc;

use ipc_transport::{CallContext, CallMode, Parcel, RemoteObject, StubError};
use tracing::debug;

use super::element_operator_callback::{ElementOperatorCallback, ElementOperatorCallbackProxy};
use crate::codec::ParcelExt;
use crate::dispatch::{object_of, read_required_object, InterfaceStub, ProxyCore, RouteSpec};
use crate::error::RetResult;
use crate::model::{ActionType, FocusMoveDirection, FocusType, SearchMode};

pub const DESCRIPTOR: &str = "OHOS.Accessibility.IAccessibilityElementOperator";

pub mod codes {
    pub const SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID: u32 = 200;
    pub const SEARCH_ELEMENT_INFOS_BY_TEXT: u32 = 201;
    pub const FIND_FOCUSED_ELEMENT_INFO: u32 = 202;
    pub const FOCUS_MOVE_SEARCH: u32 = 203;
    pub const EXECUTE_ACTION: u32 = 204;
    pub const GET_CURSOR_POSITION: u32 = 205;
    pub const CLEAR_FOCUS: u32 = 206;
    pub const OUTSIDE_TOUCH: u32 = 207;
    pub const SET_CHILD_TREE_ID_AND_WIN_ID: u32 = 208;
    pub const SET_BELONG_TREE_ID: u32 = 209;
    pub const SET_PARENT_WINDOW_ID: u32 = 210;
    pub const SEARCH_DEFAULT_FOCUS_BY_WINDOW_ID: u32 = 211;
}

pub trait ElementOperator: Send + Sync + 'static {
    fn search_element_info_by_accessibility_id(
        &self,
        element_id: i64,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
        mode: SearchMode,
        is_filter: bool,
    ) -> RetResult<()>;

    fn search_element_infos_by_text(
        &self,
        element_id: i64,
        text: &str,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()>;

    fn find_focused_element_info(
        &self,
        element_id: i64,
        focus_type: FocusType,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()>;

    fn focus_move_search(
        &self,
        element_id: i64,
        direction: FocusMoveDirection,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()>;

    fn execute_action(
        &self,
        element_id: i64,
        action: ActionType,
        arguments: &BTreeMap<String, String>,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()>;

    fn get_cursor_position(
        &self,
        element_id: i64,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()>;

    fn clear_focus(&self) -> RetResult<()>;

    fn outside_touch(&self) -> RetResult<()>;

    fn set_child_tree_id_and_win_id(&self, element_id: i64, tree_id: i32, child_window_id: i32) -> RetResult<()>;

    fn set_belong_tree_id(&self, tree_id: i32) -> RetResult<()>;

    fn set_parent_window_id(&self, parent_window_id: i32) -> RetResult<()>;

    fn search_default_focus_by_window_id(
        &self,
        window_id: i32,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
        page_id: i32,
    ) -> RetResult<()>;

    fn as_object(&self) -> Option<RemoteObject> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ElementOperatorProxy {
    core: ProxyCore,
}

impl ElementOperatorProxy {
    pub fn new(remote: RemoteObject) -> Self {
        Self {
            core: ProxyCore::new(remote, DESCRIPTOR),
        }
    }

    pub fn shared(remote: RemoteObject) -> Arc<dyn ElementOperator> {
        Arc::new(Self::new(remote))
    }

    fn search<F>(
        &self,
        code: u32,
        name: &'static str,
        callback: &Arc<dyn ElementOperatorCallback>,
        write: F,
    ) -> RetResult<()>
    where
        F: FnOnce(&mut Parcel, &RemoteObject) -> Result<(), ipc_transport::ParcelError>,
    {
        let callback = object_of(callback.as_object())?;
        self.core
            .send(code, name, CallMode::OneWayDeferred, |data| write(data, &callback))
    }
}

impl ElementOperator for ElementOperatorProxy {
    fn search_element_info_by_accessibility_id(
        &self,
        element_id: i64,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
        mode: SearchMode,
        is_filter: bool,
    ) -> RetResult<()> {
        self.search(
            codes::SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID,
            "search_element_info_by_accessibility_id",
            &callback,
            |data, callback| {
                data.write_i64(element_id)?;
                data.write_i32(request_id)?;
                data.write_remote_object(Some(callback))?;
                data.write_enum(mode)?;
                data.write_bool(is_filter)
            },
        )
    }

    fn search_element_infos_by_text(
        &self,
        element_id: i64,
        text: &str,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        self.search(
            codes::SEARCH_ELEMENT_INFOS_BY_TEXT,
            "search_element_infos_by_text",
            &callback,
            |data, callback| {
                data.write_i64(element_id)?;
                data.write_string(text)?;
                data.write_i32(request_id)?;
                data.write_remote_object(Some(callback))
            },
        )
    }

    fn find_focused_element_info(
        &self,
        element_id: i64,
        focus_type: FocusType,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        self.search(
            codes::FIND_FOCUSED_ELEMENT_INFO,
            "find_focused_element_info",
            &callback,
            |data, callback| {
                data.write_i64(element_id)?;
                data.write_enum(focus_type)?;
                data.write_i32(request_id)?;
                data.write_remote_object(Some(callback))
            },
        )
    }

    fn focus_move_search(
        &self,
        element_id: i64,
        direction: FocusMoveDirection,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        self.search(
            codes::FOCUS_MOVE_SEARCH,
            "focus_move_search",
            &callback,
            |data, callback| {
                data.write_i64(element_id)?;
                data.write_enum(direction)?;
                data.write_i32(request_id)?;
                data.write_remote_object(Some(callback))
            },
        )
    }

    fn execute_action(
        &self,
        element_id: i64,
        action: ActionType,
        arguments: &BTreeMap<String, String>,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        self.search(codes::EXECUTE_ACTION, "execute_action", &callback, |data, callback| {
            data.write_i64(element_id)?;
            data.write_enum(action)?;
            data.write_string_map(arguments)?;
            data.write_i32(request_id)?;
            data.write_remote_object(Some(callback))
        })
    }

    fn get_cursor_position(
        &self,
        element_id: i64,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        self.search(
            codes::GET_CURSOR_POSITION,
            "get_cursor_position",
            &callback,
            |data, callback| {
                data.write_i64(element_id)?;
                data.write_i32(request_id)?;
                data.write_remote_object(Some(callback))
            },
        )
    }

    fn clear_focus(&self) -> RetResult<()> {
        self.core
            .send(codes::CLEAR_FOCUS, "clear_focus", CallMode::OneWay, |_| Ok(()))
    }

    fn outside_touch(&self) -> RetResult<()> {
        self.core
            .send(codes::OUTSIDE_TOUCH, "outside_touch", CallMode::OneWay, |_| Ok(()))
    }

    fn set_child_tree_id_and_win_id(&self, element_id: i64, tree_id: i32, child_window_id: i32) -> RetResult<()> {
        self.core.send(
            codes::SET_CHILD_TREE_ID_AND_WIN_ID,
            "set_child_tree_id_and_win_id",
            CallMode::OneWay,
            |data| {
                data.write_i64(element_id)?;
                data.write_i32(tree_id)?;
                data.write_i32(child_window_id)
            },
        )
    }

    fn set_belong_tree_id(&self, tree_id: i32) -> RetResult<()> {
        self.core
            .send(codes::SET_BELONG_TREE_ID, "set_belong_tree_id", CallMode::OneWay, |data| {
                data.write_i32(tree_id)
            })
    }

    fn set_parent_window_id(&self, parent_window_id: i32) -> RetResult<()> {
        self.core.send(
            codes::SET_PARENT_WINDOW_ID,
            "set_parent_window_id",
            CallMode::OneWay,
            |data| data.write_i32(parent_window_id),
        )
    }

    fn search_default_focus_by_window_id(
        &self,
        window_id: i32,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
        page_id: i32,
    ) -> RetResult<()> {
        self.search(
            codes::SEARCH_DEFAULT_FOCUS_BY_WINDOW_ID,
            "search_default_focus_by_window_id",
            &callback,
            |data, callback| {
                data.write_i32(window_id)?;
                data.write_i32(request_id)?;
                data.write_remote_object(Some(callback))?;
                data.write_i32(page_id)
            },
        )
    }

    fn as_object(&self) -> Option<RemoteObject> {
        Some(self.core.remote().clone())
    }
}

pub struct ElementOperatorStub<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: ElementOperator + ?Sized> ElementOperatorStub<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

fn callback_from(data: &mut Parcel) -> Result<Arc<dyn ElementOperatorCallback>, StubError> {
    Ok(ElementOperatorCallbackProxy::shared(read_required_object(data)?))
}

impl<T: ElementOperator + ?Sized> InterfaceStub for ElementOperatorStub<T> {
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
        RouteSpec::open(codes::CLEAR_FOCUS, "clear_focus"),
        RouteSpec::open(codes::OUTSIDE_TOUCH, "outside_touch"),
        RouteSpec::open(codes::SET_CHILD_TREE_ID_AND_WIN_ID, "set_child_tree_id_and_win_id"),
        RouteSpec::open(codes::SET_BELONG_TREE_ID, "set_belong_tree_id"),
        RouteSpec::open(codes::SET_PARENT_WINDOW_ID, "set_parent_window_id"),
        RouteSpec::open(
            codes::SEARCH_DEFAULT_FOCUS_BY_WINDOW_ID,
            "search_default_focus_by_window_id",
        ),
    ];

    fn handle(
        &self,
        code: u32,
        data: &mut Parcel,
        _reply: &mut Parcel,
        _ctx: &CallContext,
    ) -> Result<(), StubError> {
        let result = match code {
            codes::SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID => {
                let element_id = data.read_i64()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                let mode = data.read_enum()?;
                let is_filter = data.read_bool()?;
                self.inner.search_element_info_by_accessibility_id(
                    element_id, request_id, callback, mode, is_filter,
                )
            }
            codes::SEARCH_ELEMENT_INFOS_BY_TEXT => {
                let element_id = data.read_i64()?;
                let text = data.read_string()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                self.inner
                    .search_element_infos_by_text(element_id, &text, request_id, callback)
            }
            codes::FIND_FOCUSED_ELEMENT_INFO => {
                let element_id = data.read_i64()?;
                let focus_type = data.read_enum()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                self.inner
                    .find_focused_element_info(element_id, focus_type, request_id, callback)
            }
            codes::FOCUS_MOVE_SEARCH => {
                let element_id = data.read_i64()?;
                let direction = data.read_enum()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                self.inner
                    .focus_move_search(element_id, direction, request_id, callback)
            }
            codes::EXECUTE_ACTION => {
                let element_id = data.read_i64()?;
                let action = data.read_enum()?;
                let arguments = data.read_string_map()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                self.inner
                    .execute_action(element_id, action, &arguments, request_id, callback)
            }
            codes::GET_CURSOR_POSITION => {
                let element_id = data.read_i64()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                self.inner.get_cursor_position(element_id, request_id, callback)
            }
            codes::CLEAR_FOCUS => self.inner.clear_focus(),
            codes::OUTSIDE_TOUCH => self.inner.outside_touch(),
            codes::SET_CHILD_TREE_ID_AND_WIN_ID => {
                let element_id = data.read_i64()?;
                let tree_id = data.read_i32()?;
                let child_window_id = data.read_i32()?;
                self.inner
                    .set_child_tree_id_and_win_id(element_id, tree_id, child_window_id)
            }
            codes::SET_BELONG_TREE_ID => {
                let tree_id = data.read_i32()?;
                self.inner.set_belong_tree_id(tree_id)
            }
            codes::SET_PARENT_WINDOW_ID => {
                let parent_window_id = data.read_i32()?;
                self.inner.set_parent_window_id(parent_window_id)
            }
            codes::SEARCH_DEFAULT_FOCUS_BY_WINDOW_ID => {
                let window_id = data.read_i32()?;
                let request_id = data.read_i32()?;
                let callback = callback_from(data)?;
                let page_id = data.read_i32()?;
                self.inner
                    .search_default_focus_by_window_id(window_id, request_id, callback, page_id)
            }
            other => return Err(StubError::UnknownTransaction(other)),
        };
        if let Err(err) = result {
            debug!(target: "a11y::dispatch", interface = DESCRIPTOR, code, error = %err, "one-way call failed");
        }
        Ok(())
    }
}
