//! Accessibility-service side of a connection.
//!
//! [`AbilitySession`] is the [`AbilityClient`] a service hosts. Once the
//! manager hands it a channel, it turns each asynchronous element search into
//! a blocking query: the answer comes back on a callback endpoint hosted just
//! for that call and is matched by request id.

use std::collections::BTreeMap;
use std::sync::Arc;

use ipc_transport::{CallerIdentity, Endpoint};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::IpcConfig;
use crate::correlation::{CorrelationTable, Fulfiller};
use crate::dispatch::host;
use crate::error::{RetError, RetResult};
use crate::interfaces::{
    AbilityChannel, AbilityClient, AbilityClientStub, ElementOperatorCallback,
    ElementOperatorCallbackProxy, ElementOperatorCallbackStub,
};
use crate::model::{
    ActionType, ElementBasicInfo, ElementInfo, EventInfo, FocusMoveDirection, FocusType,
    GesturePath, KeyEvent, SearchMode, WindowInfo, ROOT_TREE_ID,
};

const EVENT_BACKLOG: usize = 256;

/// What an element operator answered.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackResult {
    Elements(Vec<ElementInfo>),
    Element(ElementInfo),
    Action(bool),
    Cursor(i32),
}

type KeyHandler = Box<dyn Fn(&KeyEvent) -> bool + Send + Sync>;

/// Callback hosted for exactly one request.
struct CorrelatedCallback {
    request_id: i32,
    fulfiller: Mutex<Option<Fulfiller<CallbackResult>>>,
}

impl CorrelatedCallback {
    fn new(fulfiller: Fulfiller<CallbackResult>) -> Self {
        Self {
            request_id: fulfiller.key().request_id,
            fulfiller: Mutex::new(Some(fulfiller)),
        }
    }

    fn answer(&self, request_id: i32, result: CallbackResult) -> RetResult<()> {
        if request_id != self.request_id {
            warn!(
                target: "a11y::session",
                expected = self.request_id,
                received = request_id,
                "callback for a different request"
            );
            return Err(RetError::InvalidParam);
        }
        let Some(fulfiller) = self.fulfiller.lock().take() else {
            debug!(target: "a11y::session", request_id, "duplicate callback ignored");
            return Err(RetError::Failed);
        };
        fulfiller.fulfill(result).map_err(|err| {
            debug!(target: "a11y::session", request_id, error = %err, "late callback dropped");
            RetError::from(err)
        })
    }
}

impl ElementOperatorCallback for CorrelatedCallback {
    fn set_search_element_info_by_accessibility_id_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()> {
        self.answer(request_id, CallbackResult::Elements(infos))
    }

    fn set_search_element_info_by_text_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()> {
        self.answer(request_id, CallbackResult::Elements(infos))
    }

    fn set_find_focused_element_info_result(&self, info: ElementInfo, request_id: i32) -> RetResult<()> {
        self.answer(request_id, CallbackResult::Element(info))
    }

    fn set_focus_move_search_result(&self, info: ElementInfo, request_id: i32) -> RetResult<()> {
        self.answer(request_id, CallbackResult::Element(info))
    }

    fn set_execute_action_result(&self, succeeded: bool, request_id: i32) -> RetResult<()> {
        self.answer(request_id, CallbackResult::Action(succeeded))
    }

    fn set_cursor_result(&self, position: i32, request_id: i32) -> RetResult<()> {
        self.answer(request_id, CallbackResult::Cursor(position))
    }

    fn set_search_default_focus_by_window_id_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()> {
        self.answer(request_id, CallbackResult::Elements(infos))
    }
}

pub struct AbilitySession {
    identity: CallerIdentity,
    config: IpcConfig,
    pending: Arc<CorrelationTable<CallbackResult>>,
    channel: Mutex<Option<(i32, Arc<dyn AbilityChannel>)>>,
    events: broadcast::Sender<EventInfo>,
    key_handler: Mutex<Option<KeyHandler>>,
}

impl AbilitySession {
    /// `identity` is what the session's callback endpoints run as.
    pub fn new(identity: CallerIdentity, config: IpcConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BACKLOG);
        Arc::new(Self {
            identity,
            config,
            pending: CorrelationTable::new(),
            channel: Mutex::new(None),
            events,
            key_handler: Mutex::new(None),
        })
    }

    /// Hosts the session as an ability client.
    pub fn host(self: &Arc<Self>) -> Endpoint {
        host(
            AbilityClientStub::new(Arc::clone(self)),
            self.identity.clone(),
            self.config.transport(),
        )
    }

    pub fn channel_id(&self) -> Option<i32> {
        self.channel.lock().as_ref().map(|(channel_id, _)| *channel_id)
    }

    pub fn is_connected(&self) -> bool {
        self.channel.lock().is_some()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EventInfo> {
        self.events.subscribe()
    }

    /// Decides whether key events are consumed. Without a handler every key
    /// is reported unhandled.
    pub fn set_key_event_handler<F>(&self, handler: F)
    where
        F: Fn(&KeyEvent) -> bool + Send + Sync + 'static,
    {
        *self.key_handler.lock() = Some(Box::new(handler));
    }

    pub fn outstanding_queries(&self) -> usize {
        self.pending.outstanding()
    }

    pub fn search_element_info_by_accessibility_id(
        &self,
        target: ElementBasicInfo,
        mode: SearchMode,
    ) -> RetResult<Vec<ElementInfo>> {
        let result = self.query(
            target.window_id,
            target.tree_id,
            "search_element_info_by_accessibility_id",
            |channel, request_id, callback| {
                channel.search_element_info_by_accessibility_id(
                    target, request_id, callback, mode, false, false,
                )
            },
        )?;
        match result {
            CallbackResult::Elements(infos) if infos.is_empty() => {
                Err(RetError::InvalidElementInfoFromAce)
            }
            CallbackResult::Elements(infos) => Ok(infos),
            other => unexpected(other),
        }
    }

    pub fn search_element_infos_by_text(
        &self,
        window_id: i32,
        element_id: i64,
        text: &str,
    ) -> RetResult<Vec<ElementInfo>> {
        let result = self.query(
            window_id,
            ROOT_TREE_ID,
            "search_element_infos_by_text",
            |channel, request_id, callback| {
                channel.search_element_infos_by_text(window_id, element_id, text, request_id, callback)
            },
        )?;
        match result {
            CallbackResult::Elements(infos) => Ok(infos),
            other => unexpected(other),
        }
    }

    pub fn find_focused_element_info(
        &self,
        window_id: i32,
        element_id: i64,
        focus_type: FocusType,
    ) -> RetResult<ElementInfo> {
        let result = self.query(
            window_id,
            ROOT_TREE_ID,
            "find_focused_element_info",
            |channel, request_id, callback| {
                channel.find_focused_element_info(window_id, element_id, focus_type, request_id, callback)
            },
        )?;
        single_element(result)
    }

    pub fn focus_move_search(
        &self,
        window_id: i32,
        element_id: i64,
        direction: FocusMoveDirection,
    ) -> RetResult<ElementInfo> {
        let result = self.query(
            window_id,
            ROOT_TREE_ID,
            "focus_move_search",
            |channel, request_id, callback| {
                channel.focus_move_search(window_id, element_id, direction, request_id, callback)
            },
        )?;
        single_element(result)
    }

    pub fn execute_action(
        &self,
        window_id: i32,
        element_id: i64,
        action: ActionType,
        arguments: &BTreeMap<String, String>,
    ) -> RetResult<()> {
        let result = self.query(
            window_id,
            ROOT_TREE_ID,
            "execute_action",
            |channel, request_id, callback| {
                channel.execute_action(window_id, element_id, action, arguments, request_id, callback)
            },
        )?;
        match result {
            CallbackResult::Action(true) => Ok(()),
            CallbackResult::Action(false) => Err(RetError::PerformActionFailedByAce),
            other => unexpected(other),
        }
    }

    pub fn get_cursor_position(&self, window_id: i32, element_id: i64) -> RetResult<i32> {
        let result = self.query(
            window_id,
            ROOT_TREE_ID,
            "get_cursor_position",
            |channel, request_id, callback| {
                channel.get_cursor_position(window_id, element_id, request_id, callback)
            },
        )?;
        match result {
            CallbackResult::Cursor(position) => Ok(position),
            other => unexpected(other),
        }
    }

    pub fn get_window(&self, window_id: i32) -> RetResult<WindowInfo> {
        self.channel()?.get_window(window_id)
    }

    pub fn get_windows(&self) -> RetResult<Vec<WindowInfo>> {
        self.channel()?.get_windows()
    }

    pub fn inject_gesture(&self, path: GesturePath) -> RetResult<()> {
        self.channel()?.send_simulate_gesture(path)
    }

    pub fn set_target_bundle_names(&self, bundle_names: Vec<String>) -> RetResult<()> {
        self.channel()?.set_target_bundle_name(bundle_names)
    }

    fn channel(&self) -> RetResult<Arc<dyn AbilityChannel>> {
        self.channel
            .lock()
            .as_ref()
            .map(|(_, channel)| Arc::clone(channel))
            .ok_or(RetError::NoConnection)
    }

    /// Registers a pending call, hosts its callback, lets `issue` send the
    /// request and waits for the matching answer.
    fn query<F>(&self, window_id: i32, tree_id: i32, op: &'static str, issue: F) -> RetResult<CallbackResult>
    where
        F: FnOnce(&dyn AbilityChannel, i32, Arc<dyn ElementOperatorCallback>) -> RetResult<()>,
    {
        let channel = self.channel()?;
        let (pending, fulfiller) = self.pending.register(window_id, tree_id)?;
        let request_id = pending.request_id();
        let callback = host(
            ElementOperatorCallbackStub::new(Arc::new(CorrelatedCallback::new(fulfiller))),
            self.identity.clone(),
            self.config.transport(),
        );
        if let Err(err) = issue(
            channel.as_ref(),
            request_id,
            ElementOperatorCallbackProxy::shared(callback.remote()),
        ) {
            debug!(target: "a11y::session", op, request_id, error = %err, "query not sent");
            pending.abandon();
            return Err(err);
        }
        let answer = pending.wait(self.config.search_timeout);
        if let Err(err) = &answer {
            warn!(
                target: "a11y::session",
                op,
                window_id,
                request_id,
                error = %err,
                "query failed"
            );
        }
        Ok(answer?)
    }
}

fn single_element(result: CallbackResult) -> RetResult<ElementInfo> {
    match result {
        CallbackResult::Element(info) if info.is_undefined() => Err(RetError::InvalidElementInfoFromAce),
        CallbackResult::Element(info) => Ok(info),
        other => unexpected(other),
    }
}

fn unexpected<T>(result: CallbackResult) -> RetResult<T> {
    warn!(target: "a11y::session", ?result, "answer of the wrong kind");
    Err(RetError::Failed)
}

impl AbilityClient for AbilitySession {
    fn init(&self, channel: Arc<dyn AbilityChannel>, channel_id: i32) -> RetResult<()> {
        info!(target: "a11y::session", channel_id, "channel ready");
        *self.channel.lock() = Some((channel_id, channel));
        Ok(())
    }

    fn disconnect(&self, channel_id: i32) -> RetResult<()> {
        let mut channel = self.channel.lock();
        match channel.as_ref() {
            Some((current, _)) if *current == channel_id => {
                *channel = None;
                info!(target: "a11y::session", channel_id, "channel closed");
                Ok(())
            }
            _ => Err(RetError::NoConnection),
        }
    }

    fn on_accessibility_event(&self, event: EventInfo) -> RetResult<()> {
        // no subscribers is fine
        let _ = self.events.send(event);
        Ok(())
    }

    fn on_key_pressed_event(&self, key_event: KeyEvent, sequence: i32) -> RetResult<()> {
        let handled = self
            .key_handler
            .lock()
            .as_ref()
            .is_some_and(|handler| handler(&key_event));
        self.channel()?.set_on_key_press_event_result(handled, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationError;

    #[test_timeout::timeout]
    fn queries_without_a_channel_fail_fast() {
        let session = AbilitySession::new(CallerIdentity::new(9, 9), IpcConfig::default());
        assert!(!session.is_connected());
        assert_eq!(
            session.get_cursor_position(1, 1),
            Err(RetError::NoConnection)
        );
        assert_eq!(session.outstanding_queries(), 0);
    }

    #[test_timeout::timeout]
    fn callback_accepts_one_matching_answer() {
        let table = CorrelationTable::new();
        let (pending, fulfiller) = table.register(3, 0).unwrap();
        let request_id = pending.request_id();
        let callback = CorrelatedCallback::new(fulfiller);

        assert_eq!(
            callback.set_cursor_result(4, request_id + 1),
            Err(RetError::InvalidParam)
        );
        callback.set_cursor_result(4, request_id).unwrap();
        assert_eq!(callback.set_cursor_result(5, request_id), Err(RetError::Failed));
        assert_eq!(
            pending.wait(std::time::Duration::from_secs(1)),
            Ok(CallbackResult::Cursor(4))
        );
    }

    #[test_timeout::timeout]
    fn answer_after_timeout_is_stale() {
        let table = CorrelationTable::new();
        let (pending, fulfiller) = table.register(3, 0).unwrap();
        let request_id = pending.request_id();
        let callback = CorrelatedCallback::new(fulfiller);
        assert_eq!(
            pending.wait(std::time::Duration::from_millis(10)),
            Err(CorrelationError::TimedOut)
        );
        assert_eq!(
            callback.set_execute_action_result(true, request_id),
            Err(RetError::Failed)
        );
    }

    #[test_timeout::timeout]
    fn single_element_answers_are_validated() {
        assert_eq!(
            single_element(CallbackResult::Element(ElementInfo::undefined())),
            Err(RetError::InvalidElementInfoFromAce)
        );
        assert_eq!(
            single_element(CallbackResult::Cursor(1)),
            Err(RetError::Failed)
        );
        let node = ElementInfo::new(1, 7);
        assert_eq!(single_element(CallbackResult::Element(node.clone())), Ok(node));
    }
}
