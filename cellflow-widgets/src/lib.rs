//! Widgets built on cellflow
//!
//! Each widget owns a [`Store`](cellflow_core::Store) of [`Value`]s and
//! implements [`App`](cellflow_core::App), so it can be driven by the
//! cellflow runtime or exercised directly in tests.
//!
//! # Widgets
//!
//! - [`CurrencyConverter`] - amount conversion with rates fetched per base currency
//! - [`PasswordGenerator`] - random password regenerated from length and flags
//! - [`ColorChanger`] - background colour picked from a palette
//! - [`ProfileCards`] - list of profile records with a detail card
//!
//! # Components
//!
//! - [`FieldInput`] - single-line labelled input with cursor
//! - [`SelectList`] - scrollable selection list with keyboard navigation
//!
//! # Example
//!
//! ```ignore
//! use cellflow_core::Runtime;
//! use cellflow_widgets::{CurrencyApiConfig, CurrencyConverter, CurrencySettings};
//!
//! let mut runtime = Runtime::new();
//! let mut app = CurrencyConverter::new(
//!     CurrencySettings::default(),
//!     CurrencyApiConfig::default(),
//!     runtime.resolution_tx(),
//! )?;
//! runtime.run(&mut terminal, &mut app).await?;
//! ```

pub mod currency;
mod field_input;
pub mod palette;
pub mod password;
pub mod profile;
mod select_list;
mod value;

pub use currency::{
    parse_rates, CurrencyApiConfig, CurrencyConverter, CurrencyIntent, CurrencySettings,
    RatesClient, Step, DEFAULT_API_BASE,
};
pub use field_input::{any_char, decimal_char, FieldInput, FieldInputProps};
pub use palette::{swatch, ColorChanger, ColorIntent, Swatch, DEFAULT_COLOR, PALETTE};
pub use password::{
    generate, PasswordError, PasswordGenerator, PasswordIntent, PasswordPolicy, PasswordSettings,
};
pub use profile::{
    load_profiles, parse_profiles, sample_profiles, Profile, ProfileCards, ProfileError,
    ProfileIntent,
};
pub use select_list::{SelectList, SelectListProps};
pub use value::{Rates, Value};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ColorChanger, CurrencyConverter, FieldInput, FieldInputProps, PasswordGenerator,
        ProfileCards, SelectList, SelectListProps, Value,
    };
}
