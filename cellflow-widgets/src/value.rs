//! Value type shared by every widget store

use std::collections::BTreeMap;

use cellflow_core::CellValue;

/// Exchange rates keyed by lowercase currency code.
pub type Rates = BTreeMap<String, f64>;

/// A value held in a widget cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Flag(bool),
    Count(usize),
    /// Rate table. Empty until the first fetch for the base resolves.
    Rates(Rates),
}

impl Value {
    pub fn empty_rates() -> Self {
        Value::Rates(Rates::new())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Value::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            Value::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_rates(&self) -> Option<&Rates> {
        match self {
            Value::Rates(rates) => Some(rates),
            _ => None,
        }
    }
}

impl CellValue for Value {
    fn is_ready(&self) -> bool {
        match self {
            Value::Number(n) => !n.is_nan(),
            Value::Rates(rates) => !rates.is_empty(),
            Value::Text(_) | Value::Flag(_) | Value::Count(_) => true,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Flag(b)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Count(n)
    }
}

impl From<Rates> for Value {
    fn from(rates: Rates) -> Self {
        Value::Rates(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rates_are_unready() {
        assert!(!Value::empty_rates().is_ready());
        let rates: Rates = [("inr".to_string(), 83.5)].into_iter().collect();
        assert!(Value::from(rates).is_ready());
    }

    #[test]
    fn test_nan_is_unready() {
        assert!(!Value::Number(f64::NAN).is_ready());
        assert!(Value::Number(0.0).is_ready());
        assert!(Value::text("").is_ready());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from(2.5).as_number(), Some(2.5));
        assert_eq!(Value::from("usd").as_text(), Some("usd"));
        assert_eq!(Value::from(true).as_flag(), Some(true));
        assert_eq!(Value::from(8_usize).as_count(), Some(8));
        assert_eq!(Value::from(8_usize).as_text(), None);
        assert!(Value::empty_rates().as_rates().is_some_and(|r| r.is_empty()));
    }
}
