//! Password generator widget
//!
//! `password` is a generator derivation over `length`, `numbers` and
//! `symbols`: it reruns whenever one of them changes and on an explicit
//! regenerate.

use cellflow_core::{
    App, EventKind, EventOutcome, Flow, Frame, Intent, LoggingMiddleware, Rect, Store, StoreError,
};
use crossterm::event::KeyCode;
use rand::Rng;
use ratatui::{
    layout::{Alignment, Constraint, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, LineGauge, Paragraph},
};

use crate::value::Value;

pub const LENGTH: &str = "length";
pub const NUMBERS: &str = "numbers";
pub const SYMBOLS: &str = "symbols";
pub const PASSWORD: &str = "password";

pub const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
pub const DIGITS: &str = "0123456789";
pub const SYMBOL_CHARS: &str = "!@#$%^&*-_+=[]{}~`";

/// Length bounds and character sets for generated passwords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub letters: String,
    pub digits: String,
    pub symbols: String,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 6,
            max_length: 100,
            letters: LETTERS.to_string(),
            digits: DIGITS.to_string(),
            symbols: SYMBOL_CHARS.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("invalid length bounds {min}..={max}")]
    LengthBounds { min: usize, max: usize },
    #[error("policy has no letters to draw from")]
    NoLetters,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PasswordPolicy {
    /// Check the bounds are non-empty and every alphabet has characters.
    ///
    /// Letters are always drawn from, so they must not be empty.
    pub fn validate(&self) -> Result<(), PasswordError> {
        if self.min_length == 0 || self.min_length > self.max_length {
            return Err(PasswordError::LengthBounds {
                min: self.min_length,
                max: self.max_length,
            });
        }
        if self.letters.is_empty() {
            return Err(PasswordError::NoLetters);
        }
        Ok(())
    }

    pub fn clamp(&self, length: usize) -> usize {
        length.max(self.min_length).min(self.max_length)
    }

    /// Characters a password may be drawn from.
    pub fn alphabet(&self, numbers: bool, symbols: bool) -> Vec<char> {
        let mut alphabet: Vec<char> = self.letters.chars().collect();
        if numbers {
            alphabet.extend(self.digits.chars());
        }
        if symbols {
            alphabet.extend(self.symbols.chars());
        }
        alphabet
    }
}

/// Draw `length` characters uniformly from `alphabet`.
pub fn generate<R: Rng + ?Sized>(rng: &mut R, alphabet: &[char], length: usize) -> String {
    if alphabet.is_empty() {
        return String::new();
    }
    (0..length)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())])
        .collect()
}

/// Initial values for a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordSettings {
    pub length: usize,
    pub numbers: bool,
    pub symbols: bool,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            length: 8,
            numbers: false,
            symbols: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordIntent {
    Regenerate,
    Lengthen(usize),
    Shorten(usize),
    ToggleNumbers,
    ToggleSymbols,
    Quit,
}

impl Intent for PasswordIntent {
    fn name(&self) -> &'static str {
        match self {
            PasswordIntent::Regenerate => "Regenerate",
            PasswordIntent::Lengthen(_) => "Lengthen",
            PasswordIntent::Shorten(_) => "Shorten",
            PasswordIntent::ToggleNumbers => "ToggleNumbers",
            PasswordIntent::ToggleSymbols => "ToggleSymbols",
            PasswordIntent::Quit => "Quit",
        }
    }
}

pub struct PasswordGenerator {
    store: Store<Value>,
    policy: PasswordPolicy,
}

impl PasswordGenerator {
    /// Build a generator backed by the thread-local random source.
    pub fn new(settings: PasswordSettings, policy: PasswordPolicy) -> Result<Self, PasswordError> {
        Self::with_rng(settings, policy, rand::rng())
    }

    /// Build a generator drawing from `rng`.
    ///
    /// Fails if `policy` does not pass [`PasswordPolicy::validate`].
    pub fn with_rng<R: Rng + 'static>(
        settings: PasswordSettings,
        policy: PasswordPolicy,
        mut rng: R,
    ) -> Result<Self, PasswordError> {
        policy.validate()?;

        let mut store = Store::create([
            (LENGTH, Value::Count(policy.clamp(settings.length))),
            (NUMBERS, Value::Flag(settings.numbers)),
            (SYMBOLS, Value::Flag(settings.symbols)),
            (PASSWORD, Value::text("")),
        ])?
        .with_middleware(LoggingMiddleware::new());

        let rules = policy.clone();
        store.register_generator([LENGTH, NUMBERS, SYMBOLS], PASSWORD, move |inputs| {
            let length = inputs.get(LENGTH)?.as_count();
            let numbers = inputs.get(NUMBERS)?.as_flag();
            let symbols = inputs.get(SYMBOLS)?.as_flag();
            let (Some(length), Some(numbers), Some(symbols)) = (length, numbers, symbols) else {
                return Ok(None);
            };

            let alphabet = rules.alphabet(numbers, symbols);
            let password = generate(&mut rng, &alphabet, rules.clamp(length));
            Ok(Some(Value::Text(password)))
        })?;

        Ok(Self { store, policy })
    }

    pub fn store(&self) -> &Store<Value> {
        &self.store
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    pub fn password(&self) -> &str {
        self.store
            .get(PASSWORD)
            .ok()
            .and_then(Value::as_text)
            .unwrap_or_default()
    }

    pub fn length(&self) -> usize {
        self.store
            .get(LENGTH)
            .ok()
            .and_then(Value::as_count)
            .unwrap_or(self.policy.min_length)
    }

    fn flag(&self, cell: &str) -> bool {
        self.store
            .get(cell)
            .ok()
            .and_then(Value::as_flag)
            .unwrap_or_default()
    }

    fn set_length(&mut self, length: usize) -> Result<(), StoreError> {
        let length = self.policy.clamp(length);
        if length == self.length() {
            return Ok(());
        }
        self.store.set(LENGTH, Value::Count(length))
    }

    fn toggle(&mut self, cell: &str) -> Result<(), StoreError> {
        let flag = self.flag(cell);
        self.store.set(cell, Value::Flag(!flag))
    }
}

impl App for PasswordGenerator {
    type Value = Value;
    type Intent = PasswordIntent;

    fn store_mut(&mut self) -> &mut Store<Value> {
        &mut self.store
    }

    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Password Generator ")
            .title_alignment(Alignment::Center);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let [password_area, length_area, flags_area, help_area] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .areas(inner);

        frame.render_widget(
            Paragraph::new(self.password().to_string())
                .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
                .block(Block::default().borders(Borders::ALL).title("Password")),
            password_area,
        );

        let length = self.length();
        let span = self.policy.max_length.saturating_sub(self.policy.min_length).max(1);
        let ratio = length.saturating_sub(self.policy.min_length) as f64 / span as f64;
        frame.render_widget(
            LineGauge::default()
                .label(format!("Length: {length} "))
                .filled_style(Style::default().fg(Color::Cyan))
                .ratio(ratio.clamp(0.0, 1.0)),
            length_area,
        );

        let checkbox = |on: bool, label: &'static str| {
            let mark = if on { "[x] " } else { "[ ] " };
            Span::raw(format!("{mark}{label}  "))
        };
        let flags = Line::from(vec![
            checkbox(self.flag(NUMBERS), "Numbers"),
            checkbox(self.flag(SYMBOLS), "Symbols"),
        ]);
        frame.render_widget(Paragraph::new(flags), flags_area);

        let help = Line::from(Span::styled(
            "r regenerate  +/- length  n numbers  s symbols  q quit",
            Style::default().fg(Color::DarkGray),
        ));
        frame.render_widget(Paragraph::new(help), help_area);
    }

    fn map_event(&mut self, event: &EventKind) -> EventOutcome<PasswordIntent> {
        let Some(key) = event.key() else {
            return EventOutcome::ignored().with_render();
        };

        let intent = match key.code {
            KeyCode::Char('r') | KeyCode::Enter => Some(PasswordIntent::Regenerate),
            KeyCode::Char('+') | KeyCode::Right => Some(PasswordIntent::Lengthen(1)),
            KeyCode::Char('-') | KeyCode::Left => Some(PasswordIntent::Shorten(1)),
            KeyCode::Up => Some(PasswordIntent::Lengthen(10)),
            KeyCode::Down => Some(PasswordIntent::Shorten(10)),
            KeyCode::Char('n') => Some(PasswordIntent::ToggleNumbers),
            KeyCode::Char('s') => Some(PasswordIntent::ToggleSymbols),
            KeyCode::Char('q') | KeyCode::Esc => Some(PasswordIntent::Quit),
            _ => None,
        };
        intent.into()
    }

    fn apply(&mut self, intent: PasswordIntent) -> Result<Flow, StoreError> {
        match intent {
            PasswordIntent::Regenerate => self.store.regenerate(PASSWORD)?,
            PasswordIntent::Lengthen(n) => self.set_length(self.length().saturating_add(n))?,
            PasswordIntent::Shorten(n) => self.set_length(self.length().saturating_sub(n))?,
            PasswordIntent::ToggleNumbers => self.toggle(NUMBERS)?,
            PasswordIntent::ToggleSymbols => self.toggle(SYMBOLS)?,
            PasswordIntent::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}
