//! An [`ElementOperator`] over a fixed in-memory element tree.
//!
//! Stands in for an application window: the probe binary and the
//! integration tests register it with the manager and query it end to end.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use ipc_transport::{CallerIdentity, Endpoint};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::codec::MAX_ALLOW_SIZE;
use crate::config::IpcConfig;
use crate::dispatch::host;
use crate::error::RetResult;
use crate::interfaces::{ElementOperator, ElementOperatorCallback, ElementOperatorStub};
use crate::model::{
    ActionType, ElementInfo, FocusMoveDirection, FocusType, SearchMode, ROOT_TREE_ID, UNDEFINED_ID,
};

/// Argument keys understood by [`ActionType::SetText`],
/// [`ActionType::SetSelection`] and [`ActionType::SetCursorPosition`].
pub mod action_args {
    pub const SET_TEXT: &str = "setText";
    pub const SELECT_TEXT_START: &str = "selectTextBegin";
    pub const SELECT_TEXT_END: &str = "selectTextEnd";
    pub const CURSOR_OFFSET: &str = "offset";
}

struct Tree {
    nodes: BTreeMap<i64, ElementInfo>,
    root: i64,
    belong_tree_id: i32,
    parent_window_id: i32,
    input_focus: Option<i64>,
    accessibility_focus: Option<i64>,
    cursors: HashMap<i64, i32>,
    performed: Vec<(i64, ActionType)>,
    outside_touches: u32,
}

impl Tree {
    fn resolve(&self, element_id: i64) -> i64 {
        if element_id == UNDEFINED_ID {
            self.root
        } else {
            element_id
        }
    }

    fn children(&self, element_id: i64) -> impl Iterator<Item = &ElementInfo> {
        self.nodes
            .get(&element_id)
            .into_iter()
            .flat_map(|node| node.child_ids.iter())
            .filter_map(|child| self.nodes.get(child))
    }

    /// Pre-order walk from `start`, `start` included. Each node is visited
    /// at most once.
    fn descendants(&self, start: i64) -> Vec<&ElementInfo> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push(node);
            stack.extend(node.child_ids.iter().rev());
        }
        out
    }

    fn prefetch(&self, element_id: i64, mode: SearchMode, is_filter: bool) -> Vec<ElementInfo> {
        let Some(target) = self.nodes.get(&element_id) else {
            return Vec::new();
        };
        let mut out = vec![target.clone()];
        let mut seen = HashSet::from([element_id]);
        let keep = |node: &&ElementInfo| !is_filter || node.visible;

        if mode.contains(SearchMode::PREFETCH_PREDECESSORS) {
            let mut parent = target.parent_id;
            while let Some(node) = self.nodes.get(&parent) {
                if !seen.insert(parent) {
                    break;
                }
                out.push(node.clone());
                parent = node.parent_id;
            }
        }
        if mode.contains(SearchMode::PREFETCH_SIBLINGS) {
            out.extend(
                self.children(target.parent_id)
                    .filter(|node| node.element_id != element_id)
                    .filter(keep)
                    .cloned(),
            );
        }
        if mode.contains(SearchMode::PREFETCH_RECURSIVE_CHILDREN) {
            let mut visited = HashSet::from([element_id]);
            let mut queue: VecDeque<i64> = target.child_ids.iter().copied().collect();
            while let Some(id) = queue.pop_front() {
                if out.len() >= MAX_ALLOW_SIZE {
                    break;
                }
                if !visited.insert(id) {
                    continue;
                }
                if let Some(node) = self.nodes.get(&id) {
                    queue.extend(node.child_ids.iter().copied());
                    if keep(&node) {
                        out.push(node.clone());
                    }
                }
            }
        } else if mode.contains(SearchMode::PREFETCH_CHILDREN) {
            out.extend(self.children(element_id).filter(keep).cloned());
        }
        out.truncate(MAX_ALLOW_SIZE);
        out
    }

    fn focus_move(&self, element_id: i64, direction: FocusMoveDirection) -> Option<ElementInfo> {
        let order: Vec<&ElementInfo> = self
            .descendants(self.root)
            .into_iter()
            .filter(|node| node.focusable && node.visible)
            .collect();
        let from = self.nodes.get(&element_id)?;
        match direction {
            FocusMoveDirection::Forward | FocusMoveDirection::Backward => {
                let position = order.iter().position(|node| node.element_id == element_id);
                let next = match (direction, position) {
                    (FocusMoveDirection::Forward, Some(index)) => order.get(index + 1),
                    (FocusMoveDirection::Forward, None) => order.first(),
                    (_, Some(index)) => index.checked_sub(1).and_then(|index| order.get(index)),
                    (_, None) => order.last(),
                };
                next.map(|node| (*node).clone())
            }
            FocusMoveDirection::Invalid => None,
            _ => {
                let (x, y) = center(from);
                order
                    .into_iter()
                    .filter(|node| node.element_id != element_id)
                    .filter(|node| {
                        let (nx, ny) = center(node);
                        match direction {
                            FocusMoveDirection::Up => ny < y,
                            FocusMoveDirection::Down => ny > y,
                            FocusMoveDirection::Left => nx < x,
                            _ => nx > x,
                        }
                    })
                    .min_by_key(|node| {
                        let (nx, ny) = center(node);
                        (nx - x).pow(2) + (ny - y).pow(2)
                    })
                    .cloned()
            }
        }
    }

    fn perform(&mut self, element_id: i64, action: ActionType, arguments: &BTreeMap<String, String>) -> bool {
        let Some(node) = self.nodes.get(&element_id) else {
            return false;
        };
        if !node.enabled || !node.supports(action) {
            return false;
        }
        let editable = node.editable;
        let applied = match action {
            ActionType::Focus => {
                if let Some(previous) = self.input_focus.replace(element_id) {
                    self.set_flag(previous, |node| node.focused = false);
                }
                self.set_flag(element_id, |node| node.focused = true)
            }
            ActionType::ClearFocus => {
                if self.input_focus == Some(element_id) {
                    self.input_focus = None;
                }
                self.set_flag(element_id, |node| node.focused = false)
            }
            ActionType::AccessibilityFocus => {
                if let Some(previous) = self.accessibility_focus.replace(element_id) {
                    self.set_flag(previous, |node| node.accessibility_focused = false);
                }
                self.set_flag(element_id, |node| node.accessibility_focused = true)
            }
            ActionType::ClearAccessibilityFocus => {
                if self.accessibility_focus == Some(element_id) {
                    self.accessibility_focus = None;
                }
                self.set_flag(element_id, |node| node.accessibility_focused = false)
            }
            ActionType::Select => self.set_flag(element_id, |node| node.selected = true),
            ActionType::ClearSelection => self.set_flag(element_id, |node| node.selected = false),
            ActionType::SetText => match arguments.get(action_args::SET_TEXT) {
                Some(text) if editable => {
                    let text = text.clone();
                    self.set_flag(element_id, move |node| node.text = text)
                }
                _ => false,
            },
            ActionType::SetSelection => {
                let bound = |key: &str| arguments.get(key).and_then(|raw| raw.parse::<i32>().ok());
                match (
                    bound(action_args::SELECT_TEXT_START),
                    bound(action_args::SELECT_TEXT_END),
                ) {
                    (Some(begin), Some(end)) if begin <= end => self.set_flag(element_id, |node| {
                        node.begin_index = begin;
                        node.end_index = end;
                    }),
                    _ => false,
                }
            }
            ActionType::SetCursorPosition => {
                match arguments
                    .get(action_args::CURSOR_OFFSET)
                    .and_then(|raw| raw.parse::<i32>().ok())
                {
                    Some(offset) if offset >= 0 => {
                        self.cursors.insert(element_id, offset);
                        true
                    }
                    _ => false,
                }
            }
            _ => true,
        };
        if applied {
            self.performed.push((element_id, action));
        }
        applied
    }

    fn set_flag(&mut self, element_id: i64, update: impl FnOnce(&mut ElementInfo)) -> bool {
        match self.nodes.get_mut(&element_id) {
            Some(node) => {
                update(node);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("element {0} appears more than once")]
    DuplicateElement(i64),
    #[error("element {0} is its own parent or child")]
    SelfReference(i64),
    #[error("element {0} is part of a {1} cycle")]
    Cycle(i64, &'static str),
}

/// Rejects element sets that are not a forest: duplicate ids, nodes that
/// point at themselves, and cycles through either `child_ids` or
/// `parent_id`.
pub fn check_tree(nodes: &[ElementInfo]) -> Result<(), TreeError> {
    let mut ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !ids.insert(node.element_id) {
            return Err(TreeError::DuplicateElement(node.element_id));
        }
        if node.parent_id == node.element_id || node.child_ids.contains(&node.element_id) {
            return Err(TreeError::SelfReference(node.element_id));
        }
    }

    let children: HashMap<i64, Vec<i64>> = nodes
        .iter()
        .map(|node| {
            let edges = node.child_ids.iter().copied().filter(|id| ids.contains(id)).collect();
            (node.element_id, edges)
        })
        .collect();
    if let Some(id) = first_cycle(&children) {
        return Err(TreeError::Cycle(id, "child"));
    }

    let parents: HashMap<i64, Vec<i64>> = nodes
        .iter()
        .map(|node| {
            let edges = ids.contains(&node.parent_id).then_some(node.parent_id);
            (node.element_id, edges.into_iter().collect())
        })
        .collect();
    match first_cycle(&parents) {
        Some(id) => Err(TreeError::Cycle(id, "parent")),
        None => Ok(()),
    }
}

// Kahn's algorithm: whatever cannot be peeled off in topological order sits
// on (or behind) a cycle.
fn first_cycle(edges: &HashMap<i64, Vec<i64>>) -> Option<i64> {
    let mut incoming: HashMap<i64, usize> = edges.keys().map(|id| (*id, 0)).collect();
    for targets in edges.values() {
        for target in targets {
            if let Some(count) = incoming.get_mut(target) {
                *count += 1;
            }
        }
    }
    let mut ready: Vec<i64> = incoming
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut peeled = 0;
    while let Some(id) = ready.pop() {
        peeled += 1;
        for target in edges.get(&id).into_iter().flatten() {
            if let Some(count) = incoming.get_mut(target) {
                *count -= 1;
                if *count == 0 {
                    ready.push(*target);
                }
            }
        }
    }
    if peeled == incoming.len() {
        return None;
    }
    incoming
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(id, _)| id)
        .min()
}

fn center(node: &ElementInfo) -> (i64, i64) {
    let rect = &node.rect;
    (
        (rect.left_top_x as i64 + rect.right_bottom_x as i64) / 2,
        (rect.left_top_y as i64 + rect.right_bottom_y as i64) / 2,
    )
}

pub struct SnapshotOperator {
    window_id: i32,
    tree: Mutex<Tree>,
}

impl SnapshotOperator {
    /// The root is the first node without a parent in the set, or the first
    /// node if every node has one.
    pub fn new(window_id: i32, nodes: Vec<ElementInfo>) -> Arc<Self> {
        let root = nodes
            .iter()
            .find(|node| !nodes.iter().any(|other| other.element_id == node.parent_id))
            .or(nodes.first())
            .map(|node| node.element_id)
            .unwrap_or(UNDEFINED_ID);
        let input_focus = nodes.iter().find(|node| node.focused).map(|node| node.element_id);
        let accessibility_focus = nodes
            .iter()
            .find(|node| node.accessibility_focused)
            .map(|node| node.element_id);
        let nodes = nodes
            .into_iter()
            .map(|node| (node.element_id, node))
            .collect();
        Arc::new(Self {
            window_id,
            tree: Mutex::new(Tree {
                nodes,
                root,
                belong_tree_id: ROOT_TREE_ID,
                parent_window_id: UNDEFINED_ID as i32,
                input_focus,
                accessibility_focus,
                cursors: HashMap::new(),
                performed: Vec::new(),
                outside_touches: 0,
            }),
        })
    }

    pub fn host(self: &Arc<Self>, identity: CallerIdentity, config: &IpcConfig) -> Endpoint {
        host(ElementOperatorStub::new(Arc::clone(self)), identity, config.transport())
    }

    pub fn window_id(&self) -> i32 {
        self.window_id
    }

    pub fn element(&self, element_id: i64) -> Option<ElementInfo> {
        self.tree.lock().nodes.get(&element_id).cloned()
    }

    pub fn belong_tree_id(&self) -> i32 {
        self.tree.lock().belong_tree_id
    }

    pub fn parent_window_id(&self) -> i32 {
        self.tree.lock().parent_window_id
    }

    /// Actions that took effect, oldest first.
    pub fn performed(&self) -> Vec<(i64, ActionType)> {
        self.tree.lock().performed.clone()
    }

    pub fn outside_touches(&self) -> u32 {
        self.tree.lock().outside_touches
    }
}

impl ElementOperator for SnapshotOperator {
    fn search_element_info_by_accessibility_id(
        &self,
        element_id: i64,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
        mode: SearchMode,
        is_filter: bool,
    ) -> RetResult<()> {
        let infos = {
            let tree = self.tree.lock();
            tree.prefetch(tree.resolve(element_id), mode, is_filter)
        };
        trace!(
            target: "a11y::snapshot",
            window_id = self.window_id,
            element_id,
            request_id,
            count = infos.len(),
            "search by id"
        );
        callback.set_search_element_info_by_accessibility_id_result(infos, request_id)
    }

    fn search_element_infos_by_text(
        &self,
        element_id: i64,
        text: &str,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        let infos: Vec<ElementInfo> = if text.is_empty() {
            Vec::new()
        } else {
            let tree = self.tree.lock();
            tree.descendants(tree.resolve(element_id))
                .into_iter()
                .filter(|node| node.text.contains(text) || node.accessibility_text.contains(text))
                .take(MAX_ALLOW_SIZE)
                .cloned()
                .collect()
        };
        callback.set_search_element_info_by_text_result(infos, request_id)
    }

    fn find_focused_element_info(
        &self,
        element_id: i64,
        focus_type: FocusType,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        let info = {
            let tree = self.tree.lock();
            let scope = tree.resolve(element_id);
            let focused = match focus_type {
                FocusType::Input => tree.input_focus,
                FocusType::Accessibility => tree.accessibility_focus,
            };
            focused
                .filter(|focused| tree.descendants(scope).iter().any(|node| node.element_id == *focused))
                .and_then(|focused| tree.nodes.get(&focused).cloned())
                .unwrap_or_else(ElementInfo::undefined)
        };
        callback.set_find_focused_element_info_result(info, request_id)
    }

    fn focus_move_search(
        &self,
        element_id: i64,
        direction: FocusMoveDirection,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        let info = self
            .tree
            .lock()
            .focus_move(element_id, direction)
            .unwrap_or_else(ElementInfo::undefined);
        callback.set_focus_move_search_result(info, request_id)
    }

    fn execute_action(
        &self,
        element_id: i64,
        action: ActionType,
        arguments: &BTreeMap<String, String>,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        let succeeded = self.tree.lock().perform(element_id, action, arguments);
        debug!(
            target: "a11y::snapshot",
            window_id = self.window_id,
            element_id,
            ?action,
            succeeded,
            "action"
        );
        callback.set_execute_action_result(succeeded, request_id)
    }

    fn get_cursor_position(
        &self,
        element_id: i64,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        let position = {
            let tree = self.tree.lock();
            match tree.nodes.get(&element_id) {
                Some(node) => tree
                    .cursors
                    .get(&element_id)
                    .copied()
                    .unwrap_or(node.text.chars().count() as i32),
                None => -1,
            }
        };
        callback.set_cursor_result(position, request_id)
    }

    fn clear_focus(&self) -> RetResult<()> {
        let mut tree = self.tree.lock();
        if let Some(previous) = tree.input_focus.take() {
            tree.set_flag(previous, |node| node.focused = false);
        }
        Ok(())
    }

    fn outside_touch(&self) -> RetResult<()> {
        self.tree.lock().outside_touches += 1;
        Ok(())
    }

    fn set_child_tree_id_and_win_id(&self, element_id: i64, tree_id: i32, child_window_id: i32) -> RetResult<()> {
        self.tree.lock().set_flag(element_id, |node| {
            node.child_tree_id = tree_id;
            node.child_window_id = child_window_id;
        });
        Ok(())
    }

    fn set_belong_tree_id(&self, tree_id: i32) -> RetResult<()> {
        let mut tree = self.tree.lock();
        tree.belong_tree_id = tree_id;
        for node in tree.nodes.values_mut() {
            node.belong_tree_id = tree_id;
        }
        Ok(())
    }

    fn set_parent_window_id(&self, parent_window_id: i32) -> RetResult<()> {
        let mut tree = self.tree.lock();
        tree.parent_window_id = parent_window_id;
        for node in tree.nodes.values_mut() {
            node.parent_window_id = parent_window_id;
        }
        Ok(())
    }

    fn search_default_focus_by_window_id(
        &self,
        window_id: i32,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
        page_id: i32,
    ) -> RetResult<()> {
        let infos: Vec<ElementInfo> = if window_id == self.window_id {
            let tree = self.tree.lock();
            tree.descendants(tree.root)
                .into_iter()
                .find(|node| node.focusable && node.visible && (page_id < 0 || node.page_id == page_id))
                .cloned()
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };
        callback.set_search_default_focus_by_window_id_result(infos, request_id)
    }
}
