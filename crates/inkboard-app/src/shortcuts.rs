//! Keyboard shortcut registry and documentation.

use inkboard_core::Brush;

/// What a shortcut does to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    Undo,
    Redo,
    SelectBrush(Brush),
    /// Drop strokes in progress.
    Cancel,
}

/// A keyboard shortcut definition.
#[derive(Debug, Clone)]
pub struct Shortcut {
    pub key: &'static str,
    pub ctrl: bool,
    pub shift: bool,
    pub action: ShortcutAction,
    pub description: &'static str,
}

impl Shortcut {
    pub const fn new(
        key: &'static str,
        ctrl: bool,
        shift: bool,
        action: ShortcutAction,
        description: &'static str,
    ) -> Self {
        Self {
            key,
            ctrl,
            shift,
            action,
            description,
        }
    }

    /// Format the shortcut for display (e.g., "Ctrl+Z").
    pub fn format(&self) -> String {
        let mut parts = Vec::new();
        if self.ctrl {
            parts.push("Ctrl");
        }
        if self.shift {
            parts.push("Shift");
        }
        parts.push(self.key);
        parts.join("+")
    }
}

/// Registry of all keyboard shortcuts.
pub struct ShortcutRegistry;

impl ShortcutRegistry {
    /// Get all registered shortcuts.
    pub fn all() -> Vec<Shortcut> {
        vec![
            Shortcut::new("Z", true, false, ShortcutAction::Undo, "Undo"),
            Shortcut::new("Z", true, true, ShortcutAction::Redo, "Redo"),
            Shortcut::new("Y", true, false, ShortcutAction::Redo, "Redo"),
            Shortcut::new("P", false, false, ShortcutAction::SelectBrush(Brush::Pen), "Pen"),
            Shortcut::new("E", false, false, ShortcutAction::SelectBrush(Brush::Eraser), "Eraser"),
            Shortcut::new("S", false, false, ShortcutAction::SelectBrush(Brush::Stamp), "Stamp"),
            Shortcut::new("Escape", false, false, ShortcutAction::Cancel, "Cancel strokes in progress"),
        ]
    }

    /// Find the shortcut for a chord such as "ctrl+shift+z". Case and spacing are ignored.
    pub fn lookup(chord: &str) -> Option<Shortcut> {
        let mut ctrl = false;
        let mut shift = false;
        let mut key = None;
        for part in chord.split('+').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" | "cmd" => ctrl = true,
                "shift" => shift = true,
                _ => key = Some(part),
            }
        }
        let key = key?;
        Self::all()
            .into_iter()
            .find(|s| s.ctrl == ctrl && s.shift == shift && s.key.eq_ignore_ascii_case(key))
    }

    /// Print all shortcuts to console.
    pub fn print_all() {
        println!("\n=== Keyboard Shortcuts ===");
        for shortcut in Self::all() {
            println!("  {:20} {}", shortcut.format(), shortcut.description);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let redo = Shortcut::new("Z", true, true, ShortcutAction::Redo, "Redo");
        assert_eq!(redo.format(), "Ctrl+Shift+Z");
    }

    #[test]
    fn test_lookup() {
        assert_eq!(ShortcutRegistry::lookup("Ctrl+Z").map(|s| s.action), Some(ShortcutAction::Undo));
        assert_eq!(ShortcutRegistry::lookup("ctrl + shift + z").map(|s| s.action), Some(ShortcutAction::Redo));
        assert_eq!(
            ShortcutRegistry::lookup("e").map(|s| s.action),
            Some(ShortcutAction::SelectBrush(Brush::Eraser))
        );
        assert!(ShortcutRegistry::lookup("Ctrl+Q").is_none());
        assert!(ShortcutRegistry::lookup("Ctrl").is_none());
    }
}
