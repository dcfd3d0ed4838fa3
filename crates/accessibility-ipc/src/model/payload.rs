use serde::{Deserialize, Serialize};

use super::element::{ElementInfo, Rect, ROOT_TREE_ID, UNDEFINED_ID};
use super::enums::{EventType, TextMoveUnit, WindowType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub window_id: i32,
    pub window_type: WindowType,
    pub layer: i32,
    pub bounds: Rect,
    pub active: bool,
    pub focused: bool,
    pub accessibility_focused: bool,
    pub display_id: u64,
    pub inner_window_id: i32,
    pub main_window_id: i32,
    pub bundle_name: String,
    pub touch_hot_areas: Vec<Rect>,
}

impl WindowInfo {
    pub fn application(window_id: i32, bundle_name: impl Into<String>, bounds: Rect) -> Self {
        Self {
            window_id,
            window_type: WindowType::Application,
            layer: 0,
            bounds,
            active: false,
            focused: false,
            accessibility_focused: false,
            display_id: 0,
            inner_window_id: 0,
            main_window_id: window_id,
            bundle_name: bundle_name.into(),
            touch_hot_areas: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub event_type: EventType,
    pub window_id: i32,
    pub element_id: i64,
    pub page_id: i32,
    pub bundle_name: String,
    pub component_type: String,
    pub text_move_unit: TextMoveUnit,
    pub gesture_type: i32,
    pub window_change_types: i32,
    pub contents: Vec<String>,
    pub description: String,
    pub before_text: String,
    pub latest_content: String,
    pub timestamp_ms: i64,
    pub request_focus_element_id: i64,
    pub element_info: Option<ElementInfo>,
}

impl EventInfo {
    pub fn new(event_type: EventType, window_id: i32, element_id: i64) -> Self {
        Self {
            event_type,
            window_id,
            element_id,
            page_id: 0,
            bundle_name: String::new(),
            component_type: String::new(),
            text_move_unit: TextMoveUnit::Invalid,
            gesture_type: 0,
            window_change_types: 0,
            contents: Vec::new(),
            description: String::new(),
            before_text: String::new(),
            latest_content: String::new(),
            timestamp_ms: 0,
            request_focus_element_id: UNDEFINED_ID,
            element_info: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key_code: i32,
    pub action: i32,
    pub action_time: i64,
    pub device_id: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GesturePoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GesturePath {
    pub points: Vec<GesturePoint>,
    pub duration_ms: i64,
}

/// Static description of an installed accessibility ability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityInfo {
    pub id: String,
    pub name: String,
    pub bundle_name: String,
    pub module_name: String,
    pub description: String,
    pub ability_types: u32,
    pub capabilities: u32,
    pub event_types: u32,
    pub target_bundle_names: Vec<String>,
    pub is_important: bool,
}

impl AbilityInfo {
    pub fn new(bundle_name: impl Into<String>, name: impl Into<String>, capabilities: u32) -> Self {
        let bundle_name = bundle_name.into();
        let name = name.into();
        Self {
            id: format!("{bundle_name}/{name}"),
            name,
            bundle_name,
            capabilities,
            event_types: u32::MAX,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionProperty {
    pub enabled: bool,
    pub font_family: String,
    pub font_scale: i32,
    pub font_color: u32,
    pub font_edge_type: String,
    pub background_color: u32,
    pub window_color: u32,
}

/// Addresses one element inside one tree of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementBasicInfo {
    pub window_id: i32,
    pub tree_id: i32,
    pub element_id: i64,
}

impl ElementBasicInfo {
    pub fn root(window_id: i32, element_id: i64) -> Self {
        Self {
            window_id,
            tree_id: ROOT_TREE_ID,
            element_id,
        }
    }
}

/// Where an embedded element operator attaches in its parent's tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPara {
    pub window_id: i32,
    pub parent_window_id: i32,
    pub parent_tree_id: i32,
    pub element_id: i64,
}
