//! Background colour changer widget
//!
//! A single `color` cell holds the name of the active palette entry; the
//! render fills the whole area with it.

use cellflow_core::{
    App, Component, EventKind, EventOutcome, Flow, Frame, Intent, LoggingMiddleware, Rect, Store,
    StoreError,
};
use crossterm::event::KeyCode;
use ratatui::{
    layout::{Alignment, Constraint, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Paragraph},
};

use crate::select_list::{SelectList, SelectListProps};
use crate::value::Value;

pub const COLOR: &str = "color";

/// A named background colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swatch {
    pub name: &'static str,
    pub color: Color,
}

pub static PALETTE: [Swatch; 11] = [
    Swatch {
        name: "red",
        color: Color::Rgb(220, 38, 38),
    },
    Swatch {
        name: "green",
        color: Color::Rgb(22, 163, 74),
    },
    Swatch {
        name: "blue",
        color: Color::Rgb(37, 99, 235),
    },
    Swatch {
        name: "olive",
        color: Color::Rgb(128, 128, 0),
    },
    Swatch {
        name: "gray",
        color: Color::Rgb(128, 128, 128),
    },
    Swatch {
        name: "yellow",
        color: Color::Rgb(250, 204, 21),
    },
    Swatch {
        name: "pink",
        color: Color::Rgb(255, 192, 203),
    },
    Swatch {
        name: "purple",
        color: Color::Rgb(128, 0, 128),
    },
    Swatch {
        name: "lavender",
        color: Color::Rgb(230, 230, 250),
    },
    Swatch {
        name: "white",
        color: Color::Rgb(255, 255, 255),
    },
    Swatch {
        name: "black",
        color: Color::Rgb(0, 0, 0),
    },
];

pub const DEFAULT_COLOR: &str = "olive";

/// Look up a palette entry by name (case-insensitive).
pub fn swatch(name: &str) -> Option<&'static Swatch> {
    PALETTE.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

fn index_of(name: &str) -> Option<usize> {
    PALETTE.iter().position(|s| s.name.eq_ignore_ascii_case(name))
}

/// Readable text colour on top of `background`.
fn contrast(background: Color) -> Color {
    match background {
        Color::Rgb(r, g, b) => {
            let luma = 299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b);
            if luma > 128_000 {
                Color::Black
            } else {
                Color::White
            }
        }
        _ => Color::White,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorIntent {
    /// Select the palette entry at this index
    Select(usize),
    Quit,
}

impl Intent for ColorIntent {
    fn name(&self) -> &'static str {
        match self {
            ColorIntent::Select(_) => "Select",
            ColorIntent::Quit => "Quit",
        }
    }
}

pub struct ColorChanger {
    store: Store<Value>,
    names: Vec<String>,
    list: SelectList,
}

impl ColorChanger {
    /// Start on the palette entry called `initial`, or the default one if
    /// there is none by that name.
    pub fn new(initial: &str) -> Result<Self, StoreError> {
        let initial = match swatch(initial) {
            Some(swatch) => swatch.name,
            None => {
                tracing::warn!(color = %initial, "unknown colour, using default");
                DEFAULT_COLOR
            }
        };
        let store = Store::create([(COLOR, Value::text(initial))])?
            .with_middleware(LoggingMiddleware::new());

        Ok(Self {
            store,
            names: PALETTE.iter().map(|s| s.name.to_string()).collect(),
            list: SelectList::new(),
        })
    }

    pub fn store(&self) -> &Store<Value> {
        &self.store
    }

    /// Name of the active colour.
    pub fn color_name(&self) -> &str {
        self.store
            .get(COLOR)
            .ok()
            .and_then(Value::as_text)
            .unwrap_or(DEFAULT_COLOR)
    }

    fn selected(&self) -> usize {
        index_of(self.color_name()).unwrap_or_default()
    }
}

impl App for ColorChanger {
    type Value = Value;
    type Intent = ColorIntent;

    fn store_mut(&mut self) -> &mut Store<Value> {
        &mut self.store
    }

    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let background = swatch(self.color_name()).map_or(Color::Reset, |s| s.color);
        let foreground = contrast(background);
        frame.render_widget(
            Block::default().style(Style::default().bg(background).fg(foreground)),
            area,
        );

        let [list_area, _, label_area] = Layout::horizontal([
            Constraint::Length(16),
            Constraint::Length(2),
            Constraint::Min(1),
        ])
        .areas(area);

        let selected = self.selected();
        self.list.render(
            frame,
            list_area,
            SelectListProps {
                title: "Colors",
                items: &self.names,
                selected,
                is_focused: true,
                on_select: ColorIntent::Select,
            },
        );

        let [_, label_row, _] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(1),
            Constraint::Fill(1),
        ])
        .areas(label_area);
        frame.render_widget(
            Paragraph::new(self.color_name().to_uppercase())
                .style(Style::default().fg(foreground).add_modifier(Modifier::BOLD))
                .alignment(Alignment::Center),
            label_row,
        );
    }

    fn map_event(&mut self, event: &EventKind) -> EventOutcome<ColorIntent> {
        if let Some(key) = event.key() {
            if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                return EventOutcome::intent(ColorIntent::Quit);
            }
        } else {
            return EventOutcome::ignored().with_render();
        }

        let props = SelectListProps {
            title: "Colors",
            items: &self.names,
            selected: self.selected(),
            is_focused: true,
            on_select: ColorIntent::Select,
        };
        EventOutcome::from_intents(self.list.handle_event(event, props))
    }

    fn apply(&mut self, intent: ColorIntent) -> Result<Flow, StoreError> {
        match intent {
            ColorIntent::Select(index) => {
                if let Some(swatch) = PALETTE.get(index) {
                    self.store.set(COLOR, Value::text(swatch.name))?;
                }
            }
            ColorIntent::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}
