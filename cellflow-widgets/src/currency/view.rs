use cellflow_core::{Component, Snapshot};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use super::{CurrencyIntent, CONVERTED, FROM, RATES, TO};
use crate::field_input::{decimal_char, FieldInput, FieldInputProps};
use crate::value::Value;

pub(super) struct CurrencyView<'a> {
    pub snapshot: Snapshot<'a, Value>,
    pub amount_text: &'a str,
    pub loading: bool,
}

fn code(snapshot: &Snapshot<'_, Value>, cell: &str) -> String {
    snapshot
        .get(cell)
        .ok()
        .and_then(Value::as_text)
        .map(str::to_uppercase)
        .unwrap_or_default()
}

fn status_line(view: &CurrencyView<'_>) -> Line<'static> {
    let from = code(&view.snapshot, FROM);
    let count = view
        .snapshot
        .get(RATES)
        .ok()
        .and_then(Value::as_rates)
        .map_or(0, |rates| rates.len());

    let (text, color) = if view.loading {
        (format!("Fetching rates for {from}..."), Color::Yellow)
    } else if count == 0 {
        (format!("No rates available for {from}"), Color::Red)
    } else {
        (format!("{count} currencies quoted against {from}"), Color::DarkGray)
    };
    Line::from(Span::styled(text, Style::default().fg(color)))
}

pub(super) fn render(
    frame: &mut Frame,
    area: Rect,
    input: &mut FieldInput,
    view: CurrencyView<'_>,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Currency Converter ")
        .title_alignment(Alignment::Center);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [amount_area, pair_area, converted_area, status_area, help_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(1),
    ])
    .areas(inner);

    let from = code(&view.snapshot, FROM);
    let to = code(&view.snapshot, TO);

    let label = format!("Amount ({from})");
    input.render(
        frame,
        amount_area,
        FieldInputProps {
            label: &label,
            value: view.amount_text,
            placeholder: "0",
            is_focused: true,
            accept: decimal_char,
            on_change: CurrencyIntent::EditAmount,
        },
    );

    let pair = Line::from(vec![
        Span::styled(from.clone(), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  ->  "),
        Span::styled(to.clone(), Style::default().add_modifier(Modifier::BOLD)),
    ])
    .alignment(Alignment::Center);
    frame.render_widget(Paragraph::new(pair), pair_area);

    let converted = view
        .snapshot
        .get(CONVERTED)
        .ok()
        .and_then(Value::as_number)
        .map(|n| format!("{n:.2}"))
        .unwrap_or_default();

    frame.render_widget(
        Paragraph::new(converted)
            .style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Converted ({to})")),
            ),
        converted_area,
    );

    frame.render_widget(Paragraph::new(status_line(&view)), status_area);

    let help = Line::from(Span::styled(
        "f/F from  t/T to  s swap  q quit",
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(help), help_area);
}
