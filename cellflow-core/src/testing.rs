//! Test utilities for cellflow widgets
//!
//! - [`key`]: Create `KeyEvent` from string (e.g., `key("ctrl+u")`)
//! - [`ChangeRecorder`]: Record every write a store notifies
//! - [`RenderHarness`]: Render into an in-memory terminal and read it back
//! - Assertion macros for verifying emitted intents
//!
//! # Example
//!
//! ```
//! use cellflow_core::testing::ChangeRecorder;
//! use cellflow_core::Store;
//!
//! let mut store = Store::create([("a", 0_i64), ("b", 0)]).unwrap();
//! let recorder = ChangeRecorder::attach(&mut store);
//!
//! store.set("b", 2).unwrap();
//! store.set("a", 1).unwrap();
//!
//! assert_eq!(recorder.names(), ["b", "a"]);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers};
use ratatui::{backend::TestBackend, buffer::Buffer, Frame, Terminal};

use crate::cell::CellValue;
use crate::error::StoreError;
use crate::store::{Store, SubscriptionHandle};

/// Create a `KeyEvent` from a key string.
///
/// Accepts a single character, a named key (`enter`, `esc`, `tab`,
/// `backspace`, `delete`, `left`, `right`, `up`, `down`, `home`, `end`,
/// `space`), optionally prefixed by `ctrl+`, `alt+` or `shift+`.
///
/// # Examples
///
/// ```
/// use cellflow_core::testing::key;
/// use crossterm::event::{KeyCode, KeyModifiers};
///
/// let k = key("q");
/// assert_eq!(k.code, KeyCode::Char('q'));
///
/// let k = key("ctrl+u");
/// assert_eq!(k.code, KeyCode::Char('u'));
/// assert!(k.modifiers.contains(KeyModifiers::CONTROL));
/// ```
///
/// # Panics
///
/// Panics if the key string cannot be parsed.
pub fn key(s: &str) -> KeyEvent {
    let mut modifiers = KeyModifiers::empty();
    let mut rest = s;
    loop {
        if let Some(tail) = rest.strip_prefix("ctrl+") {
            modifiers |= KeyModifiers::CONTROL;
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("alt+") {
            modifiers |= KeyModifiers::ALT;
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("shift+") {
            modifiers |= KeyModifiers::SHIFT;
            rest = tail;
        } else {
            break;
        }
    }

    let code = match rest {
        "enter" => KeyCode::Enter,
        "esc" => KeyCode::Esc,
        "tab" if modifiers.contains(KeyModifiers::SHIFT) => KeyCode::BackTab,
        "tab" => KeyCode::Tab,
        "backspace" => KeyCode::Backspace,
        "delete" => KeyCode::Delete,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "space" => KeyCode::Char(' '),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyCode::Char(c),
                _ => panic!("Invalid key string: {:?}", s),
            }
        }
    };

    KeyEvent {
        code,
        modifiers,
        kind: KeyEventKind::Press,
        state: KeyEventState::empty(),
    }
}

/// Create a `KeyEvent` for a character with no modifiers.
pub fn char_key(c: char) -> KeyEvent {
    KeyEvent {
        code: KeyCode::Char(c),
        modifiers: KeyModifiers::empty(),
        kind: KeyEventKind::Press,
        state: KeyEventState::empty(),
    }
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedChange<V> {
    pub name: String,
    pub value: V,
    pub version: u64,
}

/// Records the writes a store notifies, for later assertions.
pub struct ChangeRecorder<V> {
    changes: Rc<RefCell<Vec<RecordedChange<V>>>>,
    handle: SubscriptionHandle,
}

impl<V: CellValue> ChangeRecorder<V> {
    /// Record every write to any cell.
    pub fn attach(store: &mut Store<V>) -> Self {
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        let handle = store.subscribe_to_any_change(move |change| {
            sink.borrow_mut().push(RecordedChange {
                name: change.name.to_string(),
                value: change.value.clone(),
                version: change.version,
            });
        });
        Self { changes, handle }
    }

    /// Record writes to the given cells only.
    pub fn watch<I, S>(store: &mut Store<V>, deps: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        let handle = store.subscribe(deps, move |change| {
            sink.borrow_mut().push(RecordedChange {
                name: change.name.to_string(),
                value: change.value.clone(),
                version: change.version,
            });
        })?;
        Ok(Self { changes, handle })
    }

    /// All recorded writes so far.
    pub fn changes(&self) -> Vec<RecordedChange<V>> {
        self.changes.borrow().clone()
    }

    /// Names of the written cells, in notification order.
    pub fn names(&self) -> Vec<String> {
        self.changes.borrow().iter().map(|c| c.name.clone()).collect()
    }

    /// How many writes to `name` were seen.
    pub fn count(&self, name: &str) -> usize {
        self.changes.borrow().iter().filter(|c| c.name == name).count()
    }

    /// Take all recorded writes, leaving the recorder empty.
    pub fn drain(&self) -> Vec<RecordedChange<V>> {
        std::mem::take(&mut *self.changes.borrow_mut())
    }

    /// Stop recording.
    pub fn stop(&self) {
        self.handle.cancel();
    }
}

/// Renders into a ratatui `TestBackend` for assertions on screen content.
pub struct RenderHarness {
    terminal: Terminal<TestBackend>,
}

impl RenderHarness {
    /// Create a harness with the given terminal size.
    ///
    /// # Panics
    ///
    /// Panics if the test terminal cannot be created.
    pub fn new(width: u16, height: u16) -> Self {
        let terminal = Terminal::new(TestBackend::new(width, height))
            .unwrap_or_else(|e| panic!("test terminal: {e}"));
        Self { terminal }
    }

    /// Draw one frame and return the resulting buffer.
    pub fn render<F: FnOnce(&mut Frame)>(&mut self, draw: F) -> Buffer {
        let mut draw = Some(draw);
        self.terminal
            .draw(|frame| {
                if let Some(draw) = draw.take() {
                    draw(frame);
                }
            })
            .unwrap_or_else(|e| panic!("test draw: {e}"));
        self.terminal.backend().buffer().clone()
    }

    /// Draw one frame and return its text, one line per row, trailing
    /// spaces trimmed.
    pub fn render_to_string_plain<F: FnOnce(&mut Frame)>(&mut self, draw: F) -> String {
        let buffer = self.render(draw);
        buffer_to_string_plain(&buffer)
    }
}

/// Convert a buffer to plain text, one line per row.
pub fn buffer_to_string_plain(buffer: &Buffer) -> String {
    let area = buffer.area;
    let mut lines = Vec::with_capacity(area.height as usize);
    for y in area.top()..area.bottom() {
        let mut line = String::new();
        for x in area.left()..area.right() {
            line.push_str(buffer[(x, y)].symbol());
        }
        lines.push(line.trim_end().to_string());
    }
    lines.join("\n")
}

/// Assert that a specific intent was emitted.
///
/// # Example
///
/// ```ignore
/// let intents: Vec<_> = component.handle_event(&event, props).into_iter().collect();
/// assert_emitted!(intents, Intent::Regenerate);
/// ```
#[macro_export]
macro_rules! assert_emitted {
    ($intents:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            $intents.iter().any(|i| matches!(i, $pattern $(if $guard)?)),
            "Expected intent matching `{}` to be emitted, but got: {:?}",
            stringify!($pattern),
            $intents
        );
    };
}

/// Assert that a specific intent was NOT emitted.
#[macro_export]
macro_rules! assert_not_emitted {
    ($intents:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            !$intents.iter().any(|i| matches!(i, $pattern $(if $guard)?)),
            "Expected intent matching `{}` NOT to be emitted, but it was: {:?}",
            stringify!($pattern),
            $intents
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::widgets::Paragraph;

    #[test]
    fn test_key_simple() {
        let k = key("q");
        assert_eq!(k.code, KeyCode::Char('q'));
        assert_eq!(k.modifiers, KeyModifiers::empty());
    }

    #[test]
    fn test_key_with_modifiers() {
        let k = key("ctrl+alt+x");
        assert_eq!(k.code, KeyCode::Char('x'));
        assert!(k.modifiers.contains(KeyModifiers::CONTROL));
        assert!(k.modifiers.contains(KeyModifiers::ALT));
    }

    #[test]
    fn test_key_special() {
        assert_eq!(key("esc").code, KeyCode::Esc);
        assert_eq!(key("enter").code, KeyCode::Enter);
        assert_eq!(key("shift+tab").code, KeyCode::BackTab);
        assert_eq!(key("space").code, KeyCode::Char(' '));
        assert_eq!(char_key('x'), key("x"));
    }

    #[test]
    #[should_panic(expected = "Invalid key string")]
    fn test_key_invalid() {
        key("nope");
    }

    #[test]
    fn test_recorder_watch_and_drain() {
        let mut store = Store::create([("a", 0_i64), ("b", 0)]).unwrap();
        let recorder = ChangeRecorder::watch(&mut store, ["a"]).unwrap();

        store.set("a", 1).unwrap();
        store.set("b", 1).unwrap();
        store.set("a", 2).unwrap();

        assert_eq!(recorder.count("a"), 2);
        assert_eq!(recorder.count("b"), 0);
        let drained = recorder.drain();
        assert_eq!(
            drained[1],
            RecordedChange {
                name: "a".into(),
                value: 2,
                version: 2
            }
        );
        assert!(recorder.changes().is_empty());

        recorder.stop();
        store.set("a", 3).unwrap();
        assert!(recorder.changes().is_empty());
    }

    #[test]
    fn test_render_harness() {
        let mut harness = RenderHarness::new(12, 2);
        let output = harness.render_to_string_plain(|frame| {
            frame.render_widget(Paragraph::new("hello"), frame.area())
        });
        assert_eq!(output, "hello\n");
    }

    #[test]
    fn test_assert_macros() {
        #[derive(Debug)]
        enum Intent {
            Foo,
            Bar(i32),
        }
        let intents = vec![Intent::Foo, Intent::Bar(42)];

        assert_emitted!(intents, Intent::Foo);
        assert_emitted!(intents, Intent::Bar(42));
        assert_not_emitted!(intents, Intent::Bar(99));
    }
}
