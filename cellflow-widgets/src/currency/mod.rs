//! Currency converter widget
//!
//! Cells:
//! - `amount`: number typed by the user
//! - `from` / `to`: lowercase currency codes
//! - `rates`: rate table for `from`, written by the fetcher
//! - `converted`: `amount * rates[to]`, left alone while `rates` is empty
//!   or has no entry for `to`

mod api;
mod view;

pub use api::{parse_rates, CurrencyApiConfig, RatesClient, DEFAULT_API_BASE};

use cellflow_core::{
    App, Component, EventKind, EventOutcome, Fetcher, Flow, Frame, Inputs, Intent,
    LoggingMiddleware, Rect, Resolution, Source, Store, StoreError,
};
use crossterm::event::KeyCode;
use tokio::sync::mpsc;

use crate::field_input::{decimal_char, FieldInput, FieldInputProps};
use crate::value::Value;

pub const AMOUNT: &str = "amount";
pub const FROM: &str = "from";
pub const TO: &str = "to";
pub const RATES: &str = "rates";
pub const CONVERTED: &str = "converted";

/// Initial values for a converter.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencySettings {
    pub from: String,
    pub to: String,
    pub amount: f64,
}

impl Default for CurrencySettings {
    fn default() -> Self {
        Self {
            from: "usd".into(),
            to: "inr".into(),
            amount: 1.0,
        }
    }
}

/// Direction to step through the known currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Next,
    Prev,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CurrencyIntent {
    /// The amount field was edited
    EditAmount(String),
    CycleFrom(Step),
    CycleTo(Step),
    /// Exchange `from`/`to` and `amount`/`converted`
    Swap,
    Quit,
}

impl Intent for CurrencyIntent {
    fn name(&self) -> &'static str {
        match self {
            CurrencyIntent::EditAmount(_) => "EditAmount",
            CurrencyIntent::CycleFrom(_) => "CycleFrom",
            CurrencyIntent::CycleTo(_) => "CycleTo",
            CurrencyIntent::Swap => "Swap",
            CurrencyIntent::Quit => "Quit",
        }
    }
}

fn convert(inputs: &Inputs<'_, Value>) -> Result<Option<Value>, StoreError> {
    let amount = inputs.get(AMOUNT)?.as_number();
    let to = inputs.get(TO)?.as_text();
    let rates = inputs.get(RATES)?.as_rates();

    Ok(match (amount, to, rates) {
        (Some(amount), Some(to), Some(rates)) => {
            rates.get(to).map(|rate| Value::Number(amount * rate))
        }
        _ => None,
    })
}

/// Text shown in the amount field for a stored amount.
fn amount_text(amount: f64) -> String {
    amount.to_string()
}

/// The currency converter: store, rate fetcher and amount field.
pub struct CurrencyConverter {
    store: Store<Value>,
    fetcher: Fetcher<Value>,
    amount_text: String,
    amount_input: FieldInput,
}

impl CurrencyConverter {
    /// Build a converter fetching rates over HTTP.
    ///
    /// Must be called from within a tokio runtime: the rates for
    /// `settings.from` are requested immediately.
    pub fn new(
        settings: CurrencySettings,
        api: CurrencyApiConfig,
        tx: mpsc::UnboundedSender<Resolution<Value>>,
    ) -> Result<Self, StoreError> {
        Self::with_source(settings, RatesClient::new(api), tx)
    }

    /// Build a converter reading rates from any [`Source`].
    pub fn with_source<S: Source<Value>>(
        settings: CurrencySettings,
        source: S,
        tx: mpsc::UnboundedSender<Resolution<Value>>,
    ) -> Result<Self, StoreError> {
        let mut store = Store::create([
            (AMOUNT, Value::Number(settings.amount)),
            (FROM, Value::Text(settings.from.to_lowercase())),
            (TO, Value::Text(settings.to.to_lowercase())),
            (RATES, Value::empty_rates()),
            (CONVERTED, Value::Number(0.0)),
        ])?
        .with_middleware(LoggingMiddleware::new());

        store.register([AMOUNT, TO, RATES], CONVERTED, convert)?;

        let mut fetcher = Fetcher::new(&mut store, RATES, Value::empty_rates(), source, tx)?;
        fetcher.bind_key(&mut store, FROM, |value| value.as_text().map(str::to_string))?;

        let amount_text = amount_text(settings.amount);
        let mut amount_input = FieldInput::new();
        amount_input.move_to_end(&amount_text);

        Ok(Self {
            store,
            fetcher,
            amount_text,
            amount_input,
        })
    }

    pub fn store(&self) -> &Store<Value> {
        &self.store
    }

    pub fn fetcher(&self) -> &Fetcher<Value> {
        &self.fetcher
    }

    /// Current converted amount.
    pub fn converted(&self) -> Option<f64> {
        self.store.get(CONVERTED).ok().and_then(Value::as_number)
    }

    /// Contents of the amount field.
    pub fn amount_text(&self) -> &str {
        &self.amount_text
    }

    /// Cancel the pending rate fetch and detach the conversion.
    ///
    /// Values stay readable; a rate resolution arriving afterwards is
    /// discarded.
    pub fn teardown(&mut self) {
        self.store.teardown();
    }

    /// Currency codes present in the current rate table.
    pub fn codes(&self) -> Vec<String> {
        self.store
            .get(RATES)
            .ok()
            .and_then(Value::as_rates)
            .map(|rates| rates.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn edit_amount(&mut self, text: String) -> Result<(), StoreError> {
        // An empty or partial field counts as zero
        let amount = text.parse::<f64>().unwrap_or(0.0);
        self.amount_text = text;
        self.store.set(AMOUNT, Value::Number(amount))
    }

    fn cycle(&mut self, cell: &str, step: Step) -> Result<(), StoreError> {
        let codes = self.codes();
        if codes.is_empty() {
            return Ok(());
        }

        let current = self.store.get(cell)?.as_text();
        let position = current.and_then(|code| codes.iter().position(|c| c == code));
        let index = match (position, step) {
            (Some(i), Step::Next) => (i + 1) % codes.len(),
            (Some(i), Step::Prev) => (i + codes.len() - 1) % codes.len(),
            (None, _) => 0,
        };
        self.store.set(cell, Value::Text(codes[index].clone()))
    }

    /// Swap the currencies and the two amounts with direct writes.
    ///
    /// `converted` is recomputed from the old rate table when `amount` is
    /// written, and settles once the rates for the new `from` arrive.
    fn swap(&mut self) -> Result<(), StoreError> {
        let from = self.store.get(FROM)?.clone();
        let to = self.store.get(TO)?.clone();
        let amount = self.store.get(AMOUNT)?.clone();
        let converted = self.store.get(CONVERTED)?.clone();

        self.store.set(FROM, to)?;
        self.store.set(TO, from)?;
        self.store.set(CONVERTED, amount)?;

        if let Some(n) = converted.as_number() {
            self.amount_text = amount_text(n);
            self.amount_input.move_to_end(&self.amount_text);
        }
        self.store.set(AMOUNT, converted)
    }
}

impl App for CurrencyConverter {
    type Value = Value;
    type Intent = CurrencyIntent;

    fn store_mut(&mut self) -> &mut Store<Value> {
        &mut self.store
    }

    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let view = view::CurrencyView {
            snapshot: self.store.snapshot(),
            amount_text: &self.amount_text,
            loading: self.fetcher.is_pending(),
        };
        view::render(frame, area, &mut self.amount_input, view);
    }

    fn map_event(&mut self, event: &EventKind) -> EventOutcome<CurrencyIntent> {
        let Some(key) = event.key() else {
            return EventOutcome::ignored().with_render();
        };

        let intent = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(CurrencyIntent::Quit),
            KeyCode::Char('s') => Some(CurrencyIntent::Swap),
            KeyCode::Char('f') => Some(CurrencyIntent::CycleFrom(Step::Next)),
            KeyCode::Char('F') => Some(CurrencyIntent::CycleFrom(Step::Prev)),
            KeyCode::Char('t') => Some(CurrencyIntent::CycleTo(Step::Next)),
            KeyCode::Char('T') => Some(CurrencyIntent::CycleTo(Step::Prev)),
            _ => None,
        };
        if let Some(intent) = intent {
            return EventOutcome::intent(intent);
        }

        let props = FieldInputProps {
            label: "Amount",
            value: &self.amount_text,
            placeholder: "0",
            is_focused: true,
            accept: decimal_char,
            on_change: CurrencyIntent::EditAmount,
        };
        // Cursor moves change nothing in the store but still need a redraw
        EventOutcome::from_intents(self.amount_input.handle_event(event, props)).with_render()
    }

    fn apply(&mut self, intent: CurrencyIntent) -> Result<Flow, StoreError> {
        match intent {
            CurrencyIntent::EditAmount(text) => self.edit_amount(text)?,
            CurrencyIntent::CycleFrom(step) => self.cycle(FROM, step)?,
            CurrencyIntent::CycleTo(step) => self.cycle(TO, step)?,
            CurrencyIntent::Swap => self.swap()?,
            CurrencyIntent::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn resolve(&mut self, resolution: Resolution<Value>) -> Result<(), StoreError> {
        self.fetcher.resolve(&mut self.store, resolution).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cellflow_core::testing::{key, ChangeRecorder, RenderHarness};
    use cellflow_core::{FetchError, ResolveOutcome};

    use crate::value::Rates;

    type Rx = mpsc::UnboundedReceiver<Resolution<Value>>;

    fn rates(pairs: &[(&str, f64)]) -> Rates {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    async fn stub(code: String) -> Result<Value, FetchError> {
        match code.as_str() {
            "usd" => Ok(Value::Rates(rates(&[("usd", 1.0), ("inr", 80.0), ("eur", 0.5)]))),
            "inr" => Ok(Value::Rates(rates(&[("usd", 0.0125), ("inr", 1.0)]))),
            _ => Err(FetchError::Status(500)),
        }
    }

    async fn next(rx: &mut Rx) -> Resolution<Value> {
        tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed")
    }

    async fn converter(settings: CurrencySettings) -> (CurrencyConverter, Rx) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = CurrencyConverter::with_source(settings, stub, tx).unwrap();
        let resolution = next(&mut rx).await;
        app.resolve(resolution).unwrap();
        (app, rx)
    }

    #[tokio::test]
    async fn test_conversion_follows_amount() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source =
            |_code: String| async { Ok::<_, FetchError>(Value::Rates(rates(&[("inr", 83.5)]))) };
        let mut app =
            CurrencyConverter::with_source(CurrencySettings::default(), source, tx).unwrap();

        // Nothing to convert with until the rates arrive
        assert_eq!(app.converted(), Some(0.0));
        assert_eq!(app.store().version(CONVERTED).unwrap(), 0);

        let resolution = next(&mut rx).await;
        assert_eq!(
            app.fetcher.resolve(&mut app.store, resolution).unwrap(),
            ResolveOutcome::Applied
        );
        assert_eq!(app.converted(), Some(83.5));

        app.apply(CurrencyIntent::EditAmount("10".into())).unwrap();
        assert_eq!(app.converted(), Some(835.0));
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_converted_alone() {
        let settings = CurrencySettings {
            from: "xyz".into(),
            ..CurrencySettings::default()
        };
        let (app, _rx) = converter(settings).await;

        assert_eq!(app.store().get(RATES).unwrap(), &Value::empty_rates());
        assert_eq!(app.store().version(CONVERTED).unwrap(), 0);
        assert!(app.codes().is_empty());
    }

    #[tokio::test]
    async fn test_unready_rates_guard_unrelated_writes() {
        let settings = CurrencySettings {
            from: "xyz".into(),
            ..CurrencySettings::default()
        };
        let (mut app, _rx) = converter(settings).await;
        let before = app.store().get(CONVERTED).unwrap().clone();

        app.apply(CurrencyIntent::EditAmount("42".into())).unwrap();
        assert_eq!(app.store().get(CONVERTED).unwrap(), &before);
        assert_eq!(app.store().version(CONVERTED).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_edit_amount_parses_partial_input() {
        let (mut app, _rx) = converter(CurrencySettings::default()).await;

        app.apply(CurrencyIntent::EditAmount("2.".into())).unwrap();
        assert_eq!(app.converted(), Some(160.0));

        app.apply(CurrencyIntent::EditAmount(String::new())).unwrap();
        assert_eq!(app.converted(), Some(0.0));
        assert_eq!(app.amount_text(), "");
    }

    #[tokio::test]
    async fn test_cycle_to_walks_known_codes() {
        let (mut app, _rx) = converter(CurrencySettings::default()).await;
        assert_eq!(app.codes(), ["eur", "inr", "usd"]);

        app.apply(CurrencyIntent::CycleTo(Step::Next)).unwrap();
        assert_eq!(app.store().get(TO).unwrap().as_text(), Some("usd"));
        assert_eq!(app.converted(), Some(1.0));

        app.apply(CurrencyIntent::CycleTo(Step::Next)).unwrap();
        assert_eq!(app.store().get(TO).unwrap().as_text(), Some("eur"));

        app.apply(CurrencyIntent::CycleTo(Step::Prev)).unwrap();
        assert_eq!(app.store().get(TO).unwrap().as_text(), Some("usd"));
    }

    #[tokio::test]
    async fn test_cycle_from_refetches() {
        let (mut app, mut rx) = converter(CurrencySettings::default()).await;

        app.apply(CurrencyIntent::CycleFrom(Step::Prev)).unwrap();
        assert_eq!(app.store().get(FROM).unwrap().as_text(), Some("inr"));
        assert!(app.fetcher().is_pending());

        let resolution = next(&mut rx).await;
        assert_eq!(resolution.key(), "inr");
        app.resolve(resolution).unwrap();
        assert_eq!(app.converted(), Some(1.0));
    }

    #[tokio::test]
    async fn test_teardown_discards_pending_rates() {
        let (mut app, mut rx) = converter(CurrencySettings::default()).await;
        app.apply(CurrencyIntent::CycleFrom(Step::Next)).unwrap();
        assert!(app.fetcher().is_pending());
        let before = app.store().get(RATES).unwrap().clone();

        app.teardown();
        assert!(!app.fetcher().is_pending());

        // The read may have finished before it was aborted
        if let Ok(Some(resolution)) =
            tokio::time::timeout(Duration::from_millis(50), rx.recv()).await
        {
            assert_eq!(
                app.fetcher.resolve(&mut app.store, resolution).unwrap(),
                ResolveOutcome::Stale
            );
        }
        assert_eq!(app.store().get(RATES).unwrap(), &before);
        assert_eq!(app.store().version(RATES).unwrap(), 1);

        app.apply(CurrencyIntent::EditAmount("3".into())).unwrap();
        assert_eq!(app.converted(), Some(80.0));
    }

    #[tokio::test]
    async fn test_swap_settles_after_new_rates() {
        let (mut app, mut rx) = converter(CurrencySettings::default()).await;
        app.apply(CurrencyIntent::EditAmount("10".into())).unwrap();
        assert_eq!(app.converted(), Some(800.0));

        let recorder = ChangeRecorder::attach(app.store_mut());
        app.apply(CurrencyIntent::Swap).unwrap();

        assert_eq!(app.store().get(FROM).unwrap().as_text(), Some("inr"));
        assert_eq!(app.store().get(TO).unwrap().as_text(), Some("usd"));
        assert_eq!(app.store().get(AMOUNT).unwrap().as_number(), Some(800.0));
        assert_eq!(app.amount_text(), "800");
        // Each write is seen before the conversion it triggers
        assert_eq!(
            recorder.names(),
            ["from", "to", "converted", "converted", "amount", "converted"]
        );

        // Still on the usd table: rates[usd] == 1
        assert_eq!(app.converted(), Some(800.0));

        let resolution = next(&mut rx).await;
        app.resolve(resolution).unwrap();
        assert_eq!(app.converted(), Some(10.0));
    }

    #[tokio::test]
    async fn test_map_event() {
        let (mut app, _rx) = converter(CurrencySettings::default()).await;

        let outcome = app.map_event(&EventKind::Key(key("q")));
        assert_eq!(outcome.intents, vec![CurrencyIntent::Quit]);

        let outcome = app.map_event(&EventKind::Key(key("s")));
        assert_eq!(outcome.intents, vec![CurrencyIntent::Swap]);

        let outcome = app.map_event(&EventKind::Key(key("5")));
        assert_eq!(outcome.intents, vec![CurrencyIntent::EditAmount("15".into())]);
        assert!(outcome.needs_render);

        let outcome = app.map_event(&EventKind::Key(key("left")));
        assert!(outcome.intents.is_empty());
        assert!(outcome.needs_render);

        app.apply(CurrencyIntent::EditAmount("1.5".into())).unwrap();
        let outcome = app.map_event(&EventKind::Key(key(".")));
        assert!(outcome.intents.is_empty());
        assert_eq!(app.amount_text(), "1.5");

        assert_eq!(app.apply(CurrencyIntent::Quit).unwrap(), Flow::Quit);
    }

    #[tokio::test]
    async fn test_render_shows_conversion() {
        let (mut app, _rx) = converter(CurrencySettings::default()).await;
        app.apply(CurrencyIntent::EditAmount("10".into())).unwrap();

        let mut render = RenderHarness::new(50, 14);
        let output = render.render_to_string_plain(|frame| {
            let area = frame.area();
            app.render(frame, area);
        });

        assert!(output.contains("USD"));
        assert!(output.contains("INR"));
        assert!(output.contains("800.00"));
    }
}
