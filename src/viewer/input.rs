//! Input processing layer: key events → host action codes → logical actions.
//!
//! Pure logic, no I/O. All functions are deterministic and testable.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::state::Action;

/// Navigation codes a host delivers. Several codes share one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    PageUp,
    PageDown,
    NextItem,
    PrevItem,
    NavBack,
    PreviousMenu,
}

impl HostAction {
    /// Numeric code, stable across releases.
    pub fn code(self) -> u32 {
        match self {
            HostAction::MoveLeft => 1,
            HostAction::MoveRight => 2,
            HostAction::MoveUp => 3,
            HostAction::MoveDown => 4,
            HostAction::PageUp => 5,
            HostAction::PageDown => 6,
            HostAction::NextItem => 14,
            HostAction::PrevItem => 15,
            HostAction::NavBack => 92,
            HostAction::PreviousMenu => 10,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => HostAction::MoveLeft,
            2 => HostAction::MoveRight,
            3 => HostAction::MoveUp,
            4 => HostAction::MoveDown,
            5 => HostAction::PageUp,
            6 => HostAction::PageDown,
            14 => HostAction::NextItem,
            15 => HostAction::PrevItem,
            92 => HostAction::NavBack,
            10 => HostAction::PreviousMenu,
            _ => return None,
        })
    }

    /// Page up/down pan by the same step as up/down.
    pub fn action(self) -> Action {
        match self {
            HostAction::MoveRight | HostAction::NextItem => Action::NextPage,
            HostAction::MoveLeft | HostAction::PrevItem => Action::PrevPage,
            HostAction::MoveUp | HostAction::PageUp => Action::PanUp,
            HostAction::MoveDown | HostAction::PageDown => Action::PanDown,
            HostAction::NavBack | HostAction::PreviousMenu => Action::Close,
        }
    }
}

/// Map an opaque host action code to a logical action.
pub fn map_code(code: u32) -> Option<Action> {
    HostAction::from_code(code).map(HostAction::action)
}

/// Map a terminal key event to a host action.
///
/// Returns `None` for unknown keys and key releases.
pub fn map_key_event(key: KeyEvent) -> Option<HostAction> {
    let KeyEvent {
        code,
        modifiers,
        kind,
        ..
    } = key;
    if kind == KeyEventKind::Release {
        return None;
    }

    match (code, modifiers) {
        // 終了
        (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => Some(HostAction::NavBack),
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(HostAction::PreviousMenu),

        // ページ送り
        (KeyCode::Right, _) | (KeyCode::Char('l'), _) => Some(HostAction::MoveRight),
        (KeyCode::Char('n'), _) | (KeyCode::Char(' '), _) => Some(HostAction::NextItem),
        (KeyCode::Left, _) | (KeyCode::Char('h'), _) => Some(HostAction::MoveLeft),
        (KeyCode::Char('p'), _) | (KeyCode::Backspace, _) => Some(HostAction::PrevItem),

        // スクロール
        (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(HostAction::MoveUp),
        (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(HostAction::MoveDown),
        (KeyCode::PageUp, _) => Some(HostAction::PageUp),
        (KeyCode::PageDown, _) => Some(HostAction::PageDown),

        _ => None,
    }
}
