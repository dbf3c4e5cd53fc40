//! Single-line labelled input field

use cellflow_core::{Component, EventKind};
use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Props for FieldInput component
pub struct FieldInputProps<'a, I> {
    /// Title shown in the border
    pub label: &'a str,
    /// Current input value
    pub value: &'a str,
    /// Placeholder text when empty
    pub placeholder: &'a str,
    /// Whether this component has focus
    pub is_focused: bool,
    /// Whether a character may be typed into the current value
    pub accept: fn(&str, char) -> bool,
    /// Callback when value changes
    pub on_change: fn(String) -> I,
}

/// Accept any character.
pub fn any_char(_: &str, _: char) -> bool {
    true
}

/// Accept digits, and a decimal point if the value has none yet.
pub fn decimal_char(value: &str, c: char) -> bool {
    c.is_ascii_digit() || (c == '.' && !value.contains('.'))
}

/// A single-line input with cursor
///
/// Handles typing, backspace, delete, and cursor movement.
/// Emits on_change for each edit that changes the value.
#[derive(Default)]
pub struct FieldInput {
    /// Cursor position (byte index)
    cursor: usize,
}

impl FieldInput {
    /// Create a new FieldInput
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the cursor after the last character of `value`.
    pub fn move_to_end(&mut self, value: &str) {
        self.cursor = value.len();
    }

    /// Current cursor position (byte index)
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn clamp_cursor(&mut self, value: &str) {
        self.cursor = self.cursor.min(value.len());
        while self.cursor > 0 && !value.is_char_boundary(self.cursor) {
            self.cursor -= 1;
        }
    }

    fn move_cursor_left(&mut self, value: &str) {
        if let Some((i, _)) = value[..self.cursor].char_indices().next_back() {
            self.cursor = i;
        }
    }

    fn move_cursor_right(&mut self, value: &str) {
        if let Some(c) = value[self.cursor..].chars().next() {
            self.cursor += c.len_utf8();
        }
    }

    fn insert_char(&mut self, value: &str, c: char) -> String {
        let mut new_value = String::with_capacity(value.len() + c.len_utf8());
        new_value.push_str(&value[..self.cursor]);
        new_value.push(c);
        new_value.push_str(&value[self.cursor..]);
        self.cursor += c.len_utf8();
        new_value
    }

    /// Delete character before cursor (backspace)
    fn delete_char_before(&mut self, value: &str) -> Option<String> {
        let (start, _) = value[..self.cursor].char_indices().next_back()?;
        let mut new_value = String::with_capacity(value.len());
        new_value.push_str(&value[..start]);
        new_value.push_str(&value[self.cursor..]);
        self.cursor = start;
        Some(new_value)
    }

    /// Delete character at cursor (delete key)
    fn delete_char_at(&self, value: &str) -> Option<String> {
        let c = value[self.cursor..].chars().next()?;
        let mut new_value = String::with_capacity(value.len());
        new_value.push_str(&value[..self.cursor]);
        new_value.push_str(&value[self.cursor + c.len_utf8()..]);
        Some(new_value)
    }
}

impl<I> Component<I> for FieldInput {
    type Props<'a> = FieldInputProps<'a, I>;

    fn handle_event(
        &mut self,
        event: &EventKind,
        props: Self::Props<'_>,
    ) -> impl IntoIterator<Item = I> {
        if !props.is_focused {
            return None;
        }
        self.clamp_cursor(props.value);

        let Some(key) = event.key() else {
            return None;
        };
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('a') => {
                    self.cursor = 0;
                    None
                }
                KeyCode::Char('e') => {
                    self.cursor = props.value.len();
                    None
                }
                // Ctrl+U: clear line
                KeyCode::Char('u') if !props.value.is_empty() => {
                    self.cursor = 0;
                    Some((props.on_change)(String::new()))
                }
                _ => None,
            };
        }

        match key.code {
            KeyCode::Char(c) if (props.accept)(props.value, c) => {
                let new_value = self.insert_char(props.value, c);
                Some((props.on_change)(new_value))
            }
            KeyCode::Backspace => self
                .delete_char_before(props.value)
                .map(|v| (props.on_change)(v)),
            KeyCode::Delete => self
                .delete_char_at(props.value)
                .map(|v| (props.on_change)(v)),
            KeyCode::Left => {
                self.move_cursor_left(props.value);
                None
            }
            KeyCode::Right => {
                self.move_cursor_right(props.value);
                None
            }
            KeyCode::Home => {
                self.cursor = 0;
                None
            }
            KeyCode::End => {
                self.cursor = props.value.len();
                None
            }
            _ => None,
        }
    }

    fn render(&mut self, frame: &mut Frame, area: Rect, props: Self::Props<'_>) {
        self.clamp_cursor(props.value);

        let (text, style) = if props.value.is_empty() {
            (props.placeholder, Style::default().fg(Color::DarkGray))
        } else {
            (props.value, Style::default())
        };

        let border_style = if props.is_focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let paragraph = Paragraph::new(text).style(style).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(props.label),
        );
        frame.render_widget(paragraph, area);

        if props.is_focused {
            let width = props.value[..self.cursor].chars().count() as u16;
            let cursor_x = area.x.saturating_add(1).saturating_add(width);
            if cursor_x < area.right().saturating_sub(1) && area.height > 2 {
                frame.set_cursor_position((cursor_x, area.y + 1));
            }
        }
    }
}
