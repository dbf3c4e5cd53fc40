//! Profile cards widget
//!
//! Records are inline data deserialized with serde. The `selected` cell
//! picks the highlighted card and `headline` is derived from it.

use std::path::Path;

use cellflow_core::{
    App, Component, EventKind, EventOutcome, Flow, Frame, Intent, LoggingMiddleware, Rect, Store,
    StoreError,
};
use crossterm::event::KeyCode;
use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use serde::{Deserialize, Serialize};

use crate::select_list::{SelectList, SelectListProps};
use crate::value::Value;

pub const SELECTED: &str = "selected";
pub const HEADLINE: &str = "headline";

const SAMPLE_PROFILES: &str = include_str!("profiles.json");

/// One profile card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub age: u32,
    pub job: String,
    pub location: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(alias = "avatar_url", alias = "avatarUrl", default)]
    pub avatar: String,
    #[serde(alias = "isOnline", default)]
    pub online: bool,
}

impl Profile {
    fn headline(&self) -> String {
        format!("{}, {} - {}", self.name, self.age, self.job)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to read profiles: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid profile data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no profiles to show")]
    Empty,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parse a JSON array of profiles.
pub fn parse_profiles(json: &str) -> Result<Vec<Profile>, ProfileError> {
    let profiles: Vec<Profile> = serde_json::from_str(json)?;
    if profiles.is_empty() {
        return Err(ProfileError::Empty);
    }
    Ok(profiles)
}

/// Read a JSON array of profiles from `path`.
pub fn load_profiles(path: &Path) -> Result<Vec<Profile>, ProfileError> {
    let json = std::fs::read_to_string(path)?;
    let profiles = parse_profiles(&json)?;
    tracing::info!(path = %path.display(), count = profiles.len(), "profiles loaded");
    Ok(profiles)
}

/// The built-in sample profiles.
pub fn sample_profiles() -> Result<Vec<Profile>, ProfileError> {
    parse_profiles(SAMPLE_PROFILES)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileIntent {
    Select(usize),
    Quit,
}

impl Intent for ProfileIntent {
    fn name(&self) -> &'static str {
        match self {
            ProfileIntent::Select(_) => "Select",
            ProfileIntent::Quit => "Quit",
        }
    }
}

pub struct ProfileCards {
    store: Store<Value>,
    profiles: Vec<Profile>,
    names: Vec<String>,
    list: SelectList,
}

impl ProfileCards {
    pub fn new(profiles: Vec<Profile>) -> Result<Self, ProfileError> {
        if profiles.is_empty() {
            return Err(ProfileError::Empty);
        }

        let mut store = Store::create([(SELECTED, Value::Count(0)), (HEADLINE, Value::text(""))])?
            .with_middleware(LoggingMiddleware::new());

        let headlines: Vec<String> = profiles.iter().map(Profile::headline).collect();
        store.register([SELECTED], HEADLINE, move |inputs| {
            Ok(inputs
                .get(SELECTED)?
                .as_count()
                .and_then(|i| headlines.get(i))
                .map(|h| Value::text(h.as_str())))
        })?;

        let names = profiles.iter().map(|p| p.name.clone()).collect();
        Ok(Self {
            store,
            profiles,
            names,
            list: SelectList::new(),
        })
    }

    pub fn store(&self) -> &Store<Value> {
        &self.store
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn selected(&self) -> usize {
        self.store
            .get(SELECTED)
            .ok()
            .and_then(Value::as_count)
            .unwrap_or_default()
    }

    pub fn headline(&self) -> &str {
        self.store
            .get(HEADLINE)
            .ok()
            .and_then(Value::as_text)
            .unwrap_or_default()
    }

    fn card(&self, profile: &Profile) -> Paragraph<'static> {
        let label = Style::default().fg(Color::DarkGray);
        let (status, status_color) = if profile.online {
            ("online", Color::Green)
        } else {
            ("offline", Color::DarkGray)
        };

        let lines = vec![
            Line::from(vec![
                Span::styled(profile.name.clone(), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw("  "),
                Span::styled(format!("* {status}"), Style::default().fg(status_color)),
            ]),
            Line::default(),
            Line::from(vec![Span::styled("Age       ", label), Span::raw(profile.age.to_string())]),
            Line::from(vec![Span::styled("Job       ", label), Span::raw(profile.job.clone())]),
            Line::from(vec![
                Span::styled("Location  ", label),
                Span::raw(profile.location.clone()),
            ]),
            Line::from(vec![
                Span::styled("Skills    ", label),
                Span::raw(profile.skills.join(", ")),
            ]),
            Line::from(vec![Span::styled("Avatar    ", label), Span::raw(profile.avatar.clone())]),
        ];

        Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(self.headline().to_string()),
            )
    }
}

impl App for ProfileCards {
    type Value = Value;
    type Intent = ProfileIntent;

    fn store_mut(&mut self) -> &mut Store<Value> {
        &mut self.store
    }

    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let [list_area, card_area] =
            Layout::horizontal([Constraint::Length(24), Constraint::Min(20)]).areas(area);

        let selected = self.selected();
        self.list.render(
            frame,
            list_area,
            SelectListProps {
                title: "Profiles",
                items: &self.names,
                selected,
                is_focused: true,
                on_select: ProfileIntent::Select,
            },
        );

        if let Some(profile) = self.profiles.get(selected) {
            frame.render_widget(self.card(profile), card_area);
        }
    }

    fn map_event(&mut self, event: &EventKind) -> EventOutcome<ProfileIntent> {
        match event.key() {
            Some(key) if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) => {
                return EventOutcome::intent(ProfileIntent::Quit);
            }
            Some(_) => {}
            None => return EventOutcome::ignored().with_render(),
        }

        let props = SelectListProps {
            title: "Profiles",
            items: &self.names,
            selected: self.selected(),
            is_focused: true,
            on_select: ProfileIntent::Select,
        };
        EventOutcome::from_intents(self.list.handle_event(event, props))
    }

    fn apply(&mut self, intent: ProfileIntent) -> Result<Flow, StoreError> {
        match intent {
            ProfileIntent::Select(index) if index < self.profiles.len() => {
                self.store.set(SELECTED, Value::Count(index))?;
            }
            ProfileIntent::Select(index) => {
                tracing::debug!(index, "ignoring selection past the last profile");
            }
            ProfileIntent::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}
