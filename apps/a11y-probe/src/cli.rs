use accessibility_ipc::model::{ActionType, FocusMoveDirection, FocusType, SearchMode};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::logging::LogLevel;

#[derive(Debug, Parser)]
#[command(
    name = "a11y-probe",
    about = "Drive accessibility queries through an in-process manager, window and service",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = LogLevel::Warn, env = "A11Y_LOG_LEVEL", global = true)]
    pub log_level: LogLevel,

    /// Write logs to a file instead of stderr.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// TOML file with IPC timing overrides.
    #[arg(long, env = "A11Y_IPC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// JSON array of element records to serve; a small built-in page otherwise.
    #[arg(long, global = true)]
    pub tree: Option<PathBuf>,

    /// Window id the element tree is served under.
    #[arg(long, default_value_t = 1, global = true)]
    pub window_id: i32,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch an element and the relatives selected by --prefetch.
    Dump {
        /// Element to start from; the root when omitted.
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        element_id: i64,
        #[arg(long, value_enum, default_value_t = Prefetch::Recursive)]
        prefetch: Prefetch,
    },
    /// Elements under --element-id whose text contains TEXT.
    FindText {
        text: String,
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        element_id: i64,
    },
    /// The element holding input or accessibility focus.
    Focused {
        #[arg(long, value_enum, default_value_t = Focus::Accessibility)]
        kind: Focus,
    },
    /// Where focus would move from --element-id.
    FocusMove {
        #[arg(long)]
        element_id: i64,
        #[arg(long, value_enum)]
        direction: Direction,
    },
    /// Perform an action, then print the element afterwards.
    Action {
        #[arg(long)]
        element_id: i64,
        #[arg(long, value_enum)]
        action: Action,
        /// Action argument as KEY=VALUE; may repeat.
        #[arg(long = "arg", value_parser = parse_key_value)]
        args: Vec<(String, String)>,
    },
    /// Cursor position inside an element.
    Cursor {
        #[arg(long)]
        element_id: i64,
    },
    /// Windows known to the manager.
    Windows,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Prefetch {
    None,
    Predecessors,
    Siblings,
    Children,
    Recursive,
}

impl From<Prefetch> for SearchMode {
    fn from(value: Prefetch) -> Self {
        match value {
            Prefetch::None => SearchMode::NONE,
            Prefetch::Predecessors => SearchMode::PREFETCH_PREDECESSORS,
            Prefetch::Siblings => SearchMode::PREFETCH_SIBLINGS,
            Prefetch::Children => SearchMode::PREFETCH_CHILDREN,
            Prefetch::Recursive => SearchMode::PREFETCH_RECURSIVE_CHILDREN,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Focus {
    Input,
    Accessibility,
}

impl From<Focus> for FocusType {
    fn from(value: Focus) -> Self {
        match value {
            Focus::Input => FocusType::Input,
            Focus::Accessibility => FocusType::Accessibility,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Backward,
}

impl From<Direction> for FocusMoveDirection {
    fn from(value: Direction) -> Self {
        match value {
            Direction::Up => FocusMoveDirection::Up,
            Direction::Down => FocusMoveDirection::Down,
            Direction::Left => FocusMoveDirection::Left,
            Direction::Right => FocusMoveDirection::Right,
            Direction::Forward => FocusMoveDirection::Forward,
            Direction::Backward => FocusMoveDirection::Backward,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Action {
    Focus,
    ClearFocus,
    Select,
    ClearSelection,
    Click,
    LongClick,
    AccessibilityFocus,
    ClearAccessibilityFocus,
    ScrollForward,
    ScrollBackward,
    SetText,
    SetSelection,
    SetCursorPosition,
}

impl From<Action> for ActionType {
    fn from(value: Action) -> Self {
        match value {
            Action::Focus => ActionType::Focus,
            Action::ClearFocus => ActionType::ClearFocus,
            Action::Select => ActionType::Select,
            Action::ClearSelection => ActionType::ClearSelection,
            Action::Click => ActionType::Click,
            Action::LongClick => ActionType::LongClick,
            Action::AccessibilityFocus => ActionType::AccessibilityFocus,
            Action::ClearAccessibilityFocus => ActionType::ClearAccessibilityFocus,
            Action::ScrollForward => ActionType::ScrollForward,
            Action::ScrollBackward => ActionType::ScrollBackward,
            Action::SetText => ActionType::SetText,
            Action::SetSelection => ActionType::SetSelection,
            Action::SetCursorPosition => ActionType::SetCursorPosition,
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))
}
