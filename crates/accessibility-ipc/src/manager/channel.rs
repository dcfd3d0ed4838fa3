use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use super::AccessibilityManager;
use crate::error::{RetError, RetResult};
use crate::interfaces::{AbilityChannel, ElementOperator, ElementOperatorCallback};
use crate::model::{
    capability, ActionType, ElementBasicInfo, FocusMoveDirection, FocusType, GesturePath,
    SearchMode, WindowInfo, ROOT_TREE_ID,
};

/// Manager side of one connected ability's channel.
///
/// Searches are routed to the window's registered element operator with the
/// ability's callback passed through untouched, so answers go straight back
/// to the ability.
pub struct ChannelHandler {
    manager: Weak<AccessibilityManager>,
    channel_id: i32,
    capabilities: u32,
}

impl ChannelHandler {
    pub(crate) fn new(manager: Weak<AccessibilityManager>, channel_id: i32, capabilities: u32) -> Self {
        Self {
            manager,
            channel_id,
            capabilities,
        }
    }

    pub fn channel_id(&self) -> i32 {
        self.channel_id
    }

    fn manager(&self) -> RetResult<Arc<AccessibilityManager>> {
        self.manager.upgrade().ok_or(RetError::NoConnection)
    }

    fn require(&self, needed: u32, op: &'static str) -> RetResult<()> {
        if self.capabilities & needed == needed {
            return Ok(());
        }
        warn!(
            target: "a11y::channel",
            channel_id = self.channel_id,
            op,
            capabilities = self.capabilities,
            needed,
            "capability missing"
        );
        Err(RetError::NoCapability)
    }

    fn operator(&self, window_id: i32, tree_id: i32, op: &'static str) -> RetResult<Arc<dyn ElementOperator>> {
        self.require(capability::RETRIEVE, op)?;
        self.manager()?.operator(window_id, tree_id).ok_or_else(|| {
            debug!(
                target: "a11y::channel",
                channel_id = self.channel_id,
                window_id,
                tree_id,
                op,
                "no element operator for window"
            );
            RetError::NoWindowConnection
        })
    }
}

impl AbilityChannel for ChannelHandler {
    fn search_element_info_by_accessibility_id(
        &self,
        target: ElementBasicInfo,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
        mode: SearchMode,
        is_filter: bool,
        _system_api: bool,
    ) -> RetResult<()> {
        self.operator(target.window_id, target.tree_id, "search_element_info_by_accessibility_id")?
            .search_element_info_by_accessibility_id(
                target.element_id,
                request_id,
                callback,
                mode,
                is_filter,
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
        self.operator(window_id, ROOT_TREE_ID, "search_element_infos_by_text")?
            .search_element_infos_by_text(element_id, text, request_id, callback)
    }

    fn find_focused_element_info(
        &self,
        window_id: i32,
        element_id: i64,
        focus_type: FocusType,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        self.operator(window_id, ROOT_TREE_ID, "find_focused_element_info")?
            .find_focused_element_info(element_id, focus_type, request_id, callback)
    }

    fn focus_move_search(
        &self,
        window_id: i32,
        element_id: i64,
        direction: FocusMoveDirection,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        self.operator(window_id, ROOT_TREE_ID, "focus_move_search")?
            .focus_move_search(element_id, direction, request_id, callback)
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
        self.operator(window_id, ROOT_TREE_ID, "execute_action")?
            .execute_action(element_id, action, arguments, request_id, callback)
    }

    fn get_cursor_position(
        &self,
        window_id: i32,
        element_id: i64,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        self.operator(window_id, ROOT_TREE_ID, "get_cursor_position")?
            .get_cursor_position(element_id, request_id, callback)
    }

    fn get_window(&self, window_id: i32) -> RetResult<WindowInfo> {
        self.require(capability::RETRIEVE, "get_window")?;
        self.manager()?
            .window(window_id)
            .ok_or(RetError::NoWindowConnection)
    }

    fn get_windows(&self) -> RetResult<Vec<WindowInfo>> {
        self.require(capability::RETRIEVE, "get_windows")?;
        Ok(self.manager()?.windows())
    }

    fn set_on_key_press_event_result(&self, handled: bool, sequence: i32) -> RetResult<()> {
        self.require(capability::KEY_EVENT_OBSERVER, "set_on_key_press_event_result")?;
        self.manager()?.record_key_result(sequence, handled);
        Ok(())
    }

    fn send_simulate_gesture(&self, path: GesturePath) -> RetResult<()> {
        self.require(capability::GESTURE, "send_simulate_gesture")?;
        if path.points.is_empty() || path.duration_ms <= 0 {
            return Err(RetError::InvalidParam);
        }
        self.manager()?.record_gesture(path);
        Ok(())
    }

    fn set_target_bundle_name(&self, bundle_names: Vec<String>) -> RetResult<()> {
        self.manager()?.set_target_bundles(self.channel_id, bundle_names)
    }
}
