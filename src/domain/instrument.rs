//! Instrument identity and ranking scopes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: String,
    pub name: String,
    pub category: String,
    pub subcategory: String,
    /// Annual expense ratio in percent (e.g. 1.25).
    pub expense_ratio: Option<f64>,
    /// Assets under management, in the store's currency unit.
    pub aum: Option<f64>,
    pub inception: Option<NaiveDate>,
}

impl Instrument {
    pub fn new(id: &str, category: &str, subcategory: &str) -> Self {
        Instrument {
            id: id.to_string(),
            name: id.to_string(),
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            expense_ratio: None,
            aum: None,
            inception: None,
        }
    }
}

/// Peer group a ranking is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    Overall,
    Subcategory(String),
}

impl Scope {
    /// Parse the CLI/storage form: `overall` or `subcategory:<name>`.
    pub fn parse(input: &str) -> Scope {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("overall") {
            return Scope::Overall;
        }
        match trimmed.split_once(':') {
            Some((prefix, name)) if prefix.eq_ignore_ascii_case("subcategory") => {
                Scope::Subcategory(name.trim().to_string())
            }
            _ => Scope::Subcategory(trimmed.to_string()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Overall => write!(f, "overall"),
            Scope::Subcategory(name) => write!(f, "subcategory:{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_round_trips_through_display() {
        let scope = Scope::Subcategory("Large Cap".into());
        assert_eq!(scope.to_string(), "subcategory:Large Cap");
        assert_eq!(Scope::parse(&scope.to_string()), scope);
        assert_eq!(Scope::parse("OVERALL"), Scope::Overall);
    }

    #[test]
    fn bare_name_is_subcategory() {
        assert_eq!(Scope::parse("Mid Cap"), Scope::Subcategory("Mid Cap".into()));
    }
}
