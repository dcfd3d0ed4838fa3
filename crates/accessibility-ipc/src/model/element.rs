use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::enums::ActionType;

/// Element id meaning "no element". A search answer carrying it is malformed.
pub const UNDEFINED_ID: i64 = -1;
/// Tree id of a window's root tree.
pub const ROOT_TREE_ID: i32 = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left_top_x: i32,
    pub left_top_y: i32,
    pub right_bottom_x: i32,
    pub right_bottom_y: i32,
}

impl Rect {
    pub fn new(left_top_x: i32, left_top_y: i32, right_bottom_x: i32, right_bottom_y: i32) -> Self {
        Self {
            left_top_x,
            left_top_y,
            right_bottom_x,
            right_bottom_y,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.left_top_x..self.right_bottom_x).contains(&x)
            && (self.left_top_y..self.right_bottom_y).contains(&y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeInfo {
    pub min: f64,
    pub max: f64,
    pub current: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridInfo {
    pub row_count: i32,
    pub column_count: i32,
    pub selection_mode: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridItemInfo {
    pub heading: bool,
    pub column_index: i32,
    pub row_index: i32,
    pub column_span: i32,
    pub row_span: i32,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessibleAction {
    pub action_type: ActionType,
    pub description: String,
}

impl AccessibleAction {
    pub fn new(action_type: ActionType, description: impl Into<String>) -> Self {
        Self {
            action_type,
            description: description.into(),
        }
    }
}

/// Framework-specific properties that have no dedicated field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraElementInfo {
    pub string_values: BTreeMap<String, String>,
    pub int_values: BTreeMap<String, i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanInfo {
    pub span_id: i32,
    pub span_text: String,
    pub accessibility_text: String,
    pub accessibility_description: String,
    pub accessibility_level: String,
}

/// One node of an application's UI tree, as seen by accessibility services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementInfo {
    pub page_id: i32,
    pub window_id: i32,
    pub element_id: i64,
    #[serde(default = "undefined_id")]
    pub parent_id: i64,
    pub belong_tree_id: i32,
    pub child_tree_id: i32,
    pub child_window_id: i32,
    pub parent_window_id: i32,
    pub main_window_id: i32,

    pub bundle_name: String,
    pub component_type: String,
    pub text: String,
    pub hint_text: String,
    pub description: String,
    pub component_resource_id: String,
    pub accessibility_text: String,
    pub accessibility_description: String,
    pub accessibility_level: String,
    pub latest_content: String,
    pub error: String,
    pub text_type: String,

    pub child_ids: Vec<i64>,

    pub text_length_limit: i32,
    pub current_index: i32,
    pub begin_index: i32,
    pub end_index: i32,
    pub items_length: i32,
    pub input_type: i32,
    pub live_region: i32,
    pub label_id: i64,
    pub navi_destination_id: i64,
    pub offset: f32,
    pub text_move_step: i32,

    pub checkable: bool,
    pub checked: bool,
    pub focusable: bool,
    pub focused: bool,
    pub visible: bool,
    pub accessibility_focused: bool,
    pub selected: bool,
    pub clickable: bool,
    pub long_clickable: bool,
    pub enabled: bool,
    pub password: bool,
    pub scrollable: bool,
    pub editable: bool,
    pub multi_line: bool,
    pub deletable: bool,
    pub hinting: bool,
    pub essential: bool,
    pub content_invalid: bool,
    pub accessibility_group: bool,
    pub accessibility_visible: bool,
    pub active: bool,
    pub valid: bool,

    pub rect: Rect,
    pub range: RangeInfo,
    pub grid: GridInfo,
    pub grid_item: GridItemInfo,
    pub actions: Vec<AccessibleAction>,
    pub extra: ExtraElementInfo,
    pub spans: Vec<SpanInfo>,
}

fn undefined_id() -> i64 {
    UNDEFINED_ID
}

impl ElementInfo {
    pub fn new(window_id: i32, element_id: i64) -> Self {
        Self {
            window_id,
            element_id,
            parent_id: UNDEFINED_ID,
            visible: true,
            enabled: true,
            valid: true,
            ..Self::default()
        }
    }

    /// The placeholder an operator answers with when nothing matched.
    pub fn undefined() -> Self {
        Self::new(-1, UNDEFINED_ID)
    }

    pub fn is_undefined(&self) -> bool {
        self.element_id == UNDEFINED_ID
    }

    pub fn supports(&self, action: ActionType) -> bool {
        self.actions.iter().any(|entry| entry.action_type == action)
    }
}
