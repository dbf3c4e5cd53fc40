//! Runtime loop for cellflow widgets.
//!
//! Wires terminal input, intents and fetch resolutions into a single task
//! that owns the widget, so every store write happens on one thread of
//! control. The widget is redrawn only when its store changed or an event
//! asked for it.

use std::fmt::Debug;
use std::io;

use ratatui::backend::Backend;
use ratatui::layout::Rect;
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cell::CellValue;
use crate::error::StoreError;
use crate::fetch::Resolution;
use crate::input::{process_raw_event, spawn_event_poller, EventKind, PollerConfig, RawEvent};
use crate::render::RenderFlag;
use crate::store::Store;

/// Marker trait for user intents produced by input handling
///
/// Intents should be:
/// - Clone: they may be logged or replayed in tests
/// - Debug: for logging
/// - Send + 'static: they travel through a tokio channel
pub trait Intent: Clone + Debug + Send + 'static {
    /// Get the intent name for logging
    fn name(&self) -> &'static str;
}

/// Whether the loop should keep running after an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Result of mapping an event into intents plus an optional render hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventOutcome<I> {
    /// Intents to enqueue.
    pub intents: Vec<I>,
    /// Whether to force a re-render.
    pub needs_render: bool,
}

impl<I> EventOutcome<I> {
    /// No intents and no render.
    pub fn ignored() -> Self {
        Self {
            intents: Vec::new(),
            needs_render: false,
        }
    }

    /// Wrap a single intent.
    pub fn intent(intent: I) -> Self {
        Self {
            intents: vec![intent],
            needs_render: false,
        }
    }

    /// Create from any iterator of intents
    ///
    /// Useful for converting `Component::handle_event` results.
    pub fn from_intents(iter: impl IntoIterator<Item = I>) -> Self {
        Self {
            intents: iter.into_iter().collect(),
            needs_render: false,
        }
    }

    /// Mark that a render is needed.
    pub fn with_render(mut self) -> Self {
        self.needs_render = true;
        self
    }
}

impl<I> Default for EventOutcome<I> {
    fn default() -> Self {
        Self::ignored()
    }
}

impl<I> From<Option<I>> for EventOutcome<I> {
    fn from(intent: Option<I>) -> Self {
        match intent {
            Some(intent) => Self::intent(intent),
            None => Self::ignored(),
        }
    }
}

/// A widget the runtime can drive.
pub trait App {
    /// Value type held by the widget's store
    type Value: CellValue + Send;
    /// Intents the widget understands
    type Intent: Intent;

    /// The widget's store.
    fn store_mut(&mut self) -> &mut Store<Self::Value>;

    /// Draw the current state.
    fn render(&mut self, frame: &mut Frame, area: Rect);

    /// Turn terminal input into intents.
    fn map_event(&mut self, event: &EventKind) -> EventOutcome<Self::Intent>;

    /// Apply one intent to the store.
    fn apply(&mut self, intent: Self::Intent) -> Result<Flow, StoreError>;

    /// Hand a fetch resolution to the fetcher that issued it.
    #[allow(unused_variables)]
    fn resolve(&mut self, resolution: Resolution<Self::Value>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Drives an [`App`] until it asks to quit.
pub struct Runtime<V> {
    resolution_tx: mpsc::UnboundedSender<Resolution<V>>,
    resolution_rx: mpsc::UnboundedReceiver<Resolution<V>>,
    poller_config: PollerConfig,
}

impl<V: CellValue + Send> Default for Runtime<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: CellValue + Send> Runtime<V> {
    /// Create a runtime with default polling.
    pub fn new() -> Self {
        let (resolution_tx, resolution_rx) = mpsc::unbounded_channel();
        Self {
            resolution_tx,
            resolution_rx,
            poller_config: PollerConfig::default(),
        }
    }

    /// Configure event polling behavior.
    pub fn with_event_poller(mut self, config: PollerConfig) -> Self {
        self.poller_config = config;
        self
    }

    /// Sender to hand to the widget's fetchers.
    pub fn resolution_tx(&self) -> mpsc::UnboundedSender<Resolution<V>> {
        self.resolution_tx.clone()
    }

    /// Run the event/intent loop until the app returns [`Flow::Quit`].
    ///
    /// The app's store is torn down when the loop ends, cancelling any
    /// fetch still in flight.
    ///
    /// Store misuse reported by the app aborts the loop as an
    /// `io::Error` wrapping the [`StoreError`].
    pub async fn run<B, A>(&mut self, terminal: &mut Terminal<B>, app: &mut A) -> io::Result<()>
    where
        B: Backend,
        A: App<Value = V>,
    {
        let render_flag = RenderFlag::attach(app.store_mut());
        let (intent_tx, mut intent_rx) = mpsc::unbounded_channel::<A::Intent>();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RawEvent>();
        let cancel_token = CancellationToken::new();
        let _poller = spawn_event_poller(event_tx, self.poller_config, cancel_token.clone());
        tracing::info!("runtime started");

        let result = loop {
            if render_flag.take() {
                let drawn = terminal.draw(|frame| {
                    let area = frame.area();
                    app.render(frame, area);
                });
                if let Err(err) = drawn {
                    break Err(err);
                }
            }

            tokio::select! {
                Some(raw_event) = event_rx.recv() => {
                    let event = process_raw_event(raw_event);
                    let outcome = app.map_event(&event);
                    if outcome.needs_render {
                        render_flag.mark();
                    }
                    for intent in outcome.intents {
                        let _ = intent_tx.send(intent);
                    }
                }

                Some(intent) = intent_rx.recv() => {
                    tracing::debug!(intent = intent.name(), "applying intent");
                    match app.apply(intent) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Quit) => break Ok(()),
                        Err(err) => break Err(io::Error::other(err)),
                    }
                }

                Some(resolution) = self.resolution_rx.recv() => {
                    if let Err(err) = app.resolve(resolution) {
                        break Err(io::Error::other(err));
                    }
                }

                else => break Ok(()),
            }
        };

        cancel_token.cancel();
        render_flag.detach();
        app.store_mut().teardown();
        tracing::info!(ok = result.is_ok(), "runtime stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum TestIntent {
        Bump,
    }

    #[test]
    fn test_outcome_from_option() {
        let outcome: EventOutcome<TestIntent> = Some(TestIntent::Bump).into();
        assert_eq!(outcome.intents, vec![TestIntent::Bump]);
        assert!(!outcome.needs_render);

        let outcome: EventOutcome<TestIntent> = None.into();
        assert!(outcome.intents.is_empty());
        assert_eq!(outcome, EventOutcome::default());
    }

    #[test]
    fn test_outcome_with_render() {
        let outcome =
            EventOutcome::from_intents([TestIntent::Bump, TestIntent::Bump]).with_render();
        assert_eq!(outcome.intents.len(), 2);
        assert!(outcome.needs_render);
    }

    #[test]
    fn test_runtime_hands_out_sender() {
        let runtime: Runtime<i64> = Runtime::new().with_event_poller(PollerConfig::default());
        let tx = runtime.resolution_tx();
        assert!(!tx.is_closed());
    }
}
