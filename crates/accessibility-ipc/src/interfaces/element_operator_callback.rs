//! Answers to element searches, sent back by whoever owns the UI tree.
//!
//! Every message starts with the request id the search was issued under.
//! Collections of elements travel as a batch blob.

use std::sync::Arc;

use ipc_transport::{CallContext, CallMode, Parcel, RemoteObject, StubError};
use tracing::debug;

use crate::codec::{read_batch, write_batch};
use crate::dispatch::{InterfaceStub, ProxyCore, RouteSpec};
use crate::error::RetResult;
use crate::model::ElementInfo;

pub const DESCRIPTOR: &str = "OHOS.Accessibility.IAccessibilityElementOperatorCallback";

pub mod codes {
    pub const SET_SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID_RESULT: u32 = 100;
    pub const SET_SEARCH_ELEMENT_INFO_BY_TEXT_RESULT: u32 = 101;
    pub const SET_FIND_FOCUSED_ELEMENT_INFO_RESULT: u32 = 102;
    pub const SET_FOCUS_MOVE_SEARCH_RESULT: u32 = 103;
    pub const SET_EXECUTE_ACTION_RESULT: u32 = 104;
    pub const SET_CURSOR_RESULT: u32 = 105;
    pub const SET_SEARCH_DEFAULT_FOCUS_BY_WINDOW_ID_RESULT: u32 = 106;
}

pub trait ElementOperatorCallback: Send + Sync + 'static {
    fn set_search_element_info_by_accessibility_id_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()>;

    fn set_search_element_info_by_text_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()>;

    fn set_find_focused_element_info_result(&self, info: ElementInfo, request_id: i32) -> RetResult<()>;

    fn set_focus_move_search_result(&self, info: ElementInfo, request_id: i32) -> RetResult<()>;

    fn set_execute_action_result(&self, succeeded: bool, request_id: i32) -> RetResult<()>;

    fn set_cursor_result(&self, position: i32, request_id: i32) -> RetResult<()>;

    fn set_search_default_focus_by_window_id_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()>;

    /// Remote object to hand to peers. `None` for callbacks that are not
    /// hosted on an endpoint.
    fn as_object(&self) -> Option<RemoteObject> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ElementOperatorCallbackProxy {
    core: ProxyCore,
}

impl ElementOperatorCallbackProxy {
    pub fn new(remote: RemoteObject) -> Self {
        Self {
            core: ProxyCore::new(remote, DESCRIPTOR),
        }
    }

    pub fn shared(remote: RemoteObject) -> Arc<dyn ElementOperatorCallback> {
        Arc::new(Self::new(remote))
    }

    fn send_batch(&self, code: u32, name: &'static str, infos: &[ElementInfo], request_id: i32) -> RetResult<()> {
        self.core.send(code, name, CallMode::OneWay, |data| {
            data.write_i32(request_id)?;
            write_batch(data, infos)
        })
    }
}

impl ElementOperatorCallback for ElementOperatorCallbackProxy {
    fn set_search_element_info_by_accessibility_id_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()> {
        self.send_batch(
            codes::SET_SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID_RESULT,
            "set_search_element_info_by_accessibility_id_result",
            &infos,
            request_id,
        )
    }

    fn set_search_element_info_by_text_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()> {
        self.send_batch(
            codes::SET_SEARCH_ELEMENT_INFO_BY_TEXT_RESULT,
            "set_search_element_info_by_text_result",
            &infos,
            request_id,
        )
    }

    fn set_find_focused_element_info_result(&self, info: ElementInfo, request_id: i32) -> RetResult<()> {
        self.core.send(
            codes::SET_FIND_FOCUSED_ELEMENT_INFO_RESULT,
            "set_find_focused_element_info_result",
            CallMode::OneWay,
            |data| {
                data.write_i32(request_id)?;
                data.write_parcelable(&info)
            },
        )
    }

    fn set_focus_move_search_result(&self, info: ElementInfo, request_id: i32) -> RetResult<()> {
        self.core.send(
            codes::SET_FOCUS_MOVE_SEARCH_RESULT,
            "set_focus_move_search_result",
            CallMode::OneWay,
            |data| {
                data.write_i32(request_id)?;
                data.write_parcelable(&info)
            },
        )
    }

    fn set_execute_action_result(&self, succeeded: bool, request_id: i32) -> RetResult<()> {
        self.core.send(
            codes::SET_EXECUTE_ACTION_RESULT,
            "set_execute_action_result",
            CallMode::OneWay,
            |data| {
                data.write_i32(request_id)?;
                data.write_bool(succeeded)
            },
        )
    }

    fn set_cursor_result(&self, position: i32, request_id: i32) -> RetResult<()> {
        self.core.send(codes::SET_CURSOR_RESULT, "set_cursor_result", CallMode::OneWay, |data| {
            data.write_i32(request_id)?;
            data.write_i32(position)
        })
    }

    fn set_search_default_focus_by_window_id_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()> {
        self.send_batch(
            codes::SET_SEARCH_DEFAULT_FOCUS_BY_WINDOW_ID_RESULT,
            "set_search_default_focus_by_window_id_result",
            &infos,
            request_id,
        )
    }

    fn as_object(&self) -> Option<RemoteObject> {
        Some(self.core.remote().clone())
    }
}

pub struct ElementOperatorCallbackStub<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: ElementOperatorCallback + ?Sized> ElementOperatorCallbackStub<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T: ElementOperatorCallback + ?Sized> InterfaceStub for ElementOperatorCallbackStub<T> {
    const DESCRIPTOR: &'static str = DESCRIPTOR;
    const ROUTES: &'static [RouteSpec] = &[
        RouteSpec::open(
            codes::SET_SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID_RESULT,
            "set_search_element_info_by_accessibility_id_result",
        ),
        RouteSpec::open(
            codes::SET_SEARCH_ELEMENT_INFO_BY_TEXT_RESULT,
            "set_search_element_info_by_text_result",
        ),
        RouteSpec::open(
            codes::SET_FIND_FOCUSED_ELEMENT_INFO_RESULT,
            "set_find_focused_element_info_result",
        ),
        RouteSpec::open(codes::SET_FOCUS_MOVE_SEARCH_RESULT, "set_focus_move_search_result"),
        RouteSpec::open(codes::SET_EXECUTE_ACTION_RESULT, "set_execute_action_result"),
        RouteSpec::open(codes::SET_CURSOR_RESULT, "set_cursor_result"),
        RouteSpec::open(
            codes::SET_SEARCH_DEFAULT_FOCUS_BY_WINDOW_ID_RESULT,
            "set_search_default_focus_by_window_id_result",
        ),
    ];

    fn handle(
        &self,
        code: u32,
        data: &mut Parcel,
        _reply: &mut Parcel,
        _ctx: &CallContext,
    ) -> Result<(), StubError> {
        let request_id = data.read_i32()?;
        let result = match code {
            codes::SET_SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID_RESULT => {
                let infos = read_batch(data)?;
                self.inner
                    .set_search_element_info_by_accessibility_id_result(infos, request_id)
            }
            codes::SET_SEARCH_ELEMENT_INFO_BY_TEXT_RESULT => {
                let infos = read_batch(data)?;
                self.inner.set_search_element_info_by_text_result(infos, request_id)
            }
            codes::SET_FIND_FOCUSED_ELEMENT_INFO_RESULT => {
                let info = data.read_parcelable()?;
                self.inner.set_find_focused_element_info_result(info, request_id)
            }
            codes::SET_FOCUS_MOVE_SEARCH_RESULT => {
                let info = data.read_parcelable()?;
                self.inner.set_focus_move_search_result(info, request_id)
            }
            codes::SET_EXECUTE_ACTION_RESULT => {
                let succeeded = data.read_bool()?;
                self.inner.set_execute_action_result(succeeded, request_id)
            }
            codes::SET_CURSOR_RESULT => {
                let position = data.read_i32()?;
                self.inner.set_cursor_result(position, request_id)
            }
            codes::SET_SEARCH_DEFAULT_FOCUS_BY_WINDOW_ID_RESULT => {
                let infos = read_batch(data)?;
                self.inner
                    .set_search_default_focus_by_window_id_result(infos, request_id)
            }
            other => return Err(StubError::UnknownTransaction(other)),
        };
        if let Err(err) = result {
            debug!(target: "a11y::dispatch", interface = DESCRIPTOR, code, error = %err, "one-way call failed");
        }
        Ok(())
    }
}
