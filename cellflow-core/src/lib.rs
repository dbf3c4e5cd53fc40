//! Core types for cellflow
//!
//! This crate provides a small reactive pipeline for terminal widgets:
//! named cells, derived cells recomputed from declared inputs, keyed
//! asynchronous fetches written back into a cell, and a render hook that
//! fires on every change.
//!
//! # Core Concepts
//!
//! - **Store**: Owns the cells; every write goes through [`Store::set`]
//! - **Derivation**: Recomputes one output cell from declared inputs
//! - **Fetcher**: Issues one async read per key, newest key wins
//! - **Snapshot**: Read-only view handed to render code
//! - **Runtime**: Event loop tying terminal input, intents and fetches together
//!
//! # Basic Example
//!
//! ```
//! use cellflow_core::Store;
//!
//! let mut store = Store::create([("price", 4.0_f64), ("qty", 3.0), ("total", 0.0)]).unwrap();
//! store
//!     .register(["price", "qty"], "total", |inputs| {
//!         Ok(Some(inputs.get("price")? * inputs.get("qty")?))
//!     })
//!     .unwrap();
//!
//! store.set("qty", 5.0).unwrap();
//! assert_eq!(*store.get("total").unwrap(), 20.0);
//! ```
//!
//! # Async Fetch Pattern
//!
//! A [`Fetcher`] spawns reads on the tokio runtime and sends each
//! [`Resolution`] back through a channel. The loop that owns the store hands
//! resolutions to [`Fetcher::resolve`], so cell writes never leave that loop:
//!
//! ```ignore
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut fetcher = Fetcher::new(&mut store, "rates", Value::empty_rates(), source, tx)?;
//! fetcher.bind_key(&mut store, "from", |v| v.as_text().map(str::to_string))?;
//!
//! loop {
//!     tokio::select! {
//!         Some(resolution) = rx.recv() => {
//!             fetcher.resolve(&mut store, resolution)?;
//!         }
//!         // ... event handling
//!     }
//! }
//! ```

pub mod cell;
pub mod component;
pub mod derive;
pub mod error;
pub mod fetch;
pub mod input;
pub mod render;
pub mod runtime;
pub mod store;
pub mod tasks;
pub mod testing;

// Cell and store exports
pub use cell::{CellId, CellValue, Change, ReactiveCell};
pub use derive::{DerivationKind, Inputs};
pub use error::StoreError;
pub use store::{Callback, LoggingMiddleware, Middleware, Store, SubscriptionHandle};

// Fetch exports
pub use fetch::{
    FetchError, FetchFuture, FetchStatus, FetchTask, Fetcher, Resolution, ResolveOutcome, Source,
};
pub use tasks::TaskManager;

// Render and runtime exports
pub use component::Component;
pub use input::{process_raw_event, spawn_event_poller, EventKind, PollerConfig, RawEvent};
pub use render::{RenderFlag, Snapshot};
pub use runtime::{App, EventOutcome, Flow, Intent, Runtime};

// Re-export ratatui types for convenience
pub use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    Frame,
};

// Testing exports
pub use testing::{buffer_to_string_plain, char_key, key, ChangeRecorder, RenderHarness};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cell::{CellValue, Change};
    pub use crate::component::Component;
    pub use crate::derive::{DerivationKind, Inputs};
    pub use crate::error::StoreError;
    pub use crate::fetch::{FetchError, Fetcher, Resolution, ResolveOutcome, Source};
    pub use crate::input::{EventKind, PollerConfig};
    pub use crate::render::{RenderFlag, Snapshot};
    pub use crate::runtime::{App, EventOutcome, Flow, Intent, Runtime};
    pub use crate::store::{LoggingMiddleware, Middleware, Store, SubscriptionHandle};

    // Re-export ratatui types
    pub use ratatui::{
        layout::Rect,
        style::{Color, Modifier, Style},
        text::{Line, Span, Text},
        Frame,
    };
}
