use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::event::Gesture;
use crate::tree::node::NodeId;

/// Ctrl on most platforms, Cmd (reported as SUPER) on macOS.
fn is_command(key: &KeyEvent) -> bool {
    key.modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER)
}

/// Map a key press to a gesture given the selected row, if any.
///
/// Keys that need a selection map to nothing without one.
pub fn map_key(key: KeyEvent, selected: Option<NodeId>) -> Option<Gesture> {
    match key.code {
        KeyCode::Char('x') | KeyCode::Char('X') if is_command(&key) => selected.map(Gesture::Cut),
        KeyCode::Char('v') | KeyCode::Char('V') if is_command(&key) => Some(Gesture::Paste),
        KeyCode::Char('r') if is_command(&key) => Some(Gesture::Refresh),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Gesture::Quit)
        }
        KeyCode::Char('q') if key.modifiers.is_empty() => Some(Gesture::Quit),
        KeyCode::F(5) => Some(Gesture::Refresh),
        KeyCode::Esc => selected.map(Gesture::Deselect),
        KeyCode::Delete => selected.map(Gesture::Delete),
        KeyCode::Enter | KeyCode::Right => selected.map(Gesture::Open),
        KeyCode::Backspace | KeyCode::Left => Some(Gesture::Back),
        KeyCode::Down | KeyCode::Char('j') => Some(Gesture::SelectNext),
        KeyCode::Up | KeyCode::Char('k') => Some(Gesture::SelectPrevious),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn cut_needs_selection() {
        assert_eq!(map_key(ctrl('x'), Some(NodeId(4))), Some(Gesture::Cut(NodeId(4))));
        assert_eq!(map_key(ctrl('x'), None), None);
    }

    #[test]
    fn command_key_works_like_ctrl() {
        let cmd_v = KeyEvent::new(KeyCode::Char('v'), KeyModifiers::SUPER);
        assert_eq!(map_key(cmd_v, None), Some(Gesture::Paste));
        assert_eq!(map_key(ctrl('v'), None), Some(Gesture::Paste));
    }

    #[test]
    fn plain_letters_are_not_clipboard_keys() {
        assert_eq!(map_key(key(KeyCode::Char('x')), Some(NodeId(1))), None);
        assert_eq!(map_key(key(KeyCode::Char('v')), None), None);
    }

    #[test]
    fn escape_deselects() {
        assert_eq!(
            map_key(key(KeyCode::Esc), Some(NodeId(2))),
            Some(Gesture::Deselect(NodeId(2)))
        );
        assert_eq!(map_key(key(KeyCode::Esc), None), None);
    }

    #[test]
    fn navigation_keys() {
        assert_eq!(map_key(key(KeyCode::Enter), Some(NodeId(3))), Some(Gesture::Open(NodeId(3))));
        assert_eq!(map_key(key(KeyCode::Backspace), None), Some(Gesture::Back));
        assert_eq!(map_key(key(KeyCode::Down), None), Some(Gesture::SelectNext));
        assert_eq!(map_key(key(KeyCode::Char('k')), None), Some(Gesture::SelectPrevious));
        assert_eq!(map_key(key(KeyCode::Delete), Some(NodeId(5))), Some(Gesture::Delete(NodeId(5))));
    }

    #[test]
    fn quit_keys() {
        assert_eq!(map_key(key(KeyCode::Char('q')), None), Some(Gesture::Quit));
        assert_eq!(map_key(ctrl('c'), None), Some(Gesture::Quit));
        assert_eq!(map_key(key(KeyCode::F(5)), None), Some(Gesture::Refresh));
    }
}
