//! Values exchanged between accessibility services, the manager and
//! application windows.

mod element;
mod enums;
mod payload;

pub use element::{
    AccessibleAction, ElementInfo, ExtraElementInfo, GridInfo, GridItemInfo, RangeInfo, Rect,
    SpanInfo, ROOT_TREE_ID, UNDEFINED_ID,
};
pub use enums::{
    capability, state, AbilityStateType, ActionType, EventType, FocusMoveDirection, FocusType,
    SearchMode, TextMoveUnit, WindowType, WireEnum,
};
pub use payload::{
    AbilityInfo, CaptionProperty, ElementBasicInfo, EventInfo, GesturePath, GesturePoint,
    KeyEvent, RegistrationPara, WindowInfo,
};
