//! Component trait for pure UI elements

use ratatui::{layout::Rect, Frame};

use crate::input::EventKind;

/// A UI element that renders from props and turns input into intents
///
/// Components follow these rules:
/// 1. Props carry everything needed to draw, usually read from a
///    [`Snapshot`](crate::Snapshot)
/// 2. `handle_event` returns intents and never writes to a store
/// 3. `render` depends only on props plus local UI state (cursor, scroll)
///
/// The widget owning the store applies the intents, which keeps every
/// write going through `Store::set`.
pub trait Component<I> {
    /// Data required to render the component (read-only)
    type Props<'a>;

    /// Handle an event and return intents to apply
    ///
    /// Returns any type implementing `IntoIterator<Item = I>`:
    /// - `None` - no intents (most common)
    /// - `Some(intent)` - single intent
    /// - `vec![...]` - multiple intents
    ///
    /// Default implementation returns no intents (render-only components).
    #[allow(unused_variables)]
    fn handle_event(
        &mut self,
        event: &EventKind,
        props: Self::Props<'_>,
    ) -> impl IntoIterator<Item = I> {
        None::<I>
    }

    /// Render the component to the frame
    fn render(&mut self, frame: &mut Frame, area: Rect, props: Self::Props<'_>);
}
