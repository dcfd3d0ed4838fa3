use serde::{Deserialize, Serialize};

/// A closed set of values carried on the wire as `i32`.
pub trait WireEnum: Sized + Copy {
    const KIND: &'static str;

    fn value(self) -> i32;

    fn from_value(value: i32) -> Option<Self>;
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(i32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl WireEnum for $name {
            const KIND: &'static str = stringify!($name);

            fn value(self) -> i32 {
                self as i32
            }

            fn from_value(value: i32) -> Option<Self> {
                $(
                    if value == $value {
                        return Some($name::$variant);
                    }
                )+
                None
            }
        }
    };
}

wire_enum! {
    /// Operations an element may be asked to perform.
    ActionType {
        Invalid = 0,
        Focus = 0x1,
        ClearFocus = 0x2,
        Select = 0x4,
        ClearSelection = 0x8,
        Click = 0x10,
        LongClick = 0x20,
        AccessibilityFocus = 0x40,
        ClearAccessibilityFocus = 0x80,
        ScrollForward = 0x100,
        ScrollBackward = 0x200,
        Copy = 0x400,
        Paste = 0x800,
        Cut = 0x1000,
        SetSelection = 0x2000,
        SetText = 0x4000,
        SetCursorPosition = 0x10_0000,
        NextText = 0x20_0000,
        PreviousText = 0x40_0000,
        Unfold = 0x80_0000,
        Fold = 0x100_0000,
        NextHtmlItem = 0x200_0000,
        PreviousHtmlItem = 0x400_0000,
        Delete = 0x800_0000,
        Common = 0x1000_0000,
    }
}

wire_enum! {
    FocusType {
        Input = 1,
        Accessibility = 2,
    }
}

wire_enum! {
    FocusMoveDirection {
        Invalid = 0,
        Up = 0x1,
        Down = 0x2,
        Left = 0x4,
        Right = 0x8,
        Forward = 0x10,
        Backward = 0x20,
    }
}

wire_enum! {
    TextMoveUnit {
        Invalid = 0,
        Char = 0x1,
        Word = 0x2,
        Line = 0x4,
        Page = 0x8,
        Paragraph = 0x10,
    }
}

wire_enum! {
    WindowType {
        Invalid = 0,
        Application = 1,
        System = 2,
    }
}

wire_enum! {
    EventType {
        Invalid = 0,
        Clicked = 0x1,
        LongClicked = 0x2,
        Selected = 0x4,
        Focused = 0x8,
        TextUpdate = 0x10,
        PageStateUpdate = 0x20,
        PageContentUpdate = 0x40,
        Scrolled = 0x80,
        HoverEnter = 0x100,
        HoverExit = 0x200,
        TouchGuideGestureBegin = 0x400,
        TouchGuideGestureEnd = 0x800,
        TextSelectionUpdate = 0x2000,
        AccessibilityFocused = 0x8000,
        AccessibilityFocusCleared = 0x1_0000,
        TextMoveUnit = 0x2_0000,
        TouchGuideBegin = 0x4_0000,
        TouchGuideEnd = 0x8_0000,
        TouchBegin = 0x10_0000,
        TouchEnd = 0x20_0000,
        WindowUpdate = 0x40_0000,
        Interrupt = 0x80_0000,
        Gesture = 0x100_0000,
        RequestFocusForAccessibility = 0x200_0000,
        Announce = 0x400_0000,
    }
}

wire_enum! {
    /// Which ability list a query selects.
    AbilityStateType {
        Enabled = 1,
        Disabled = 2,
        Installed = 3,
    }
}

/// Prefetch flags for element searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchMode(u32);

impl SearchMode {
    pub const NONE: SearchMode = SearchMode(0);
    pub const PREFETCH_PREDECESSORS: SearchMode = SearchMode(0x1);
    pub const PREFETCH_SIBLINGS: SearchMode = SearchMode(0x2);
    pub const PREFETCH_CHILDREN: SearchMode = SearchMode(0x4);
    pub const PREFETCH_RECURSIVE_CHILDREN: SearchMode = SearchMode(0x8);

    const KNOWN: u32 = 0xf;

    /// Returns `None` if any undefined bit is set.
    pub fn from_bits(bits: u32) -> Option<Self> {
        (bits & !Self::KNOWN == 0).then_some(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: SearchMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SearchMode {
    type Output = SearchMode;

    fn bitor(self, rhs: Self) -> Self {
        SearchMode(self.0 | rhs.0)
    }
}

impl WireEnum for SearchMode {
    const KIND: &'static str = "SearchMode";

    fn value(self) -> i32 {
        self.0 as i32
    }

    fn from_value(value: i32) -> Option<Self> {
        u32::try_from(value).ok().and_then(Self::from_bits)
    }
}

/// Capability bits granted to an accessibility ability.
pub mod capability {
    pub const RETRIEVE: u32 = 0x1;
    pub const TOUCH_GUIDE: u32 = 0x2;
    pub const KEY_EVENT_OBSERVER: u32 = 0x8;
    pub const ZOOM: u32 = 0x10;
    pub const GESTURE: u32 = 0x20;
}

/// Bits of the accessibility state broadcast to state observers.
pub mod state {
    pub const ACCESSIBILITY_ENABLED: u32 = 0x1;
    pub const TOUCH_GUIDE: u32 = 0x2;
    pub const KEY_EVENT_OBSERVER: u32 = 0x4;
    pub const GESTURE: u32 = 0x8;
}
