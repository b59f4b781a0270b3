//! Label records: attribute ranges and category distributions
//!
//! A [`LabelRecord`] is a typed replacement for a dict-shaped payload. Its
//! external JSON form (`{"trait": [min, max], "cat": [{"name": .., "value":
//! [min, max]}]}`) is produced by [`LabelRecord::to_external_json`] and parsed
//! by the label synthesizer.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Label schema violation: which field, and why
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Closed numeric interval `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeRange {
    pub min: f64,
    pub max: f64,
}

impl AttributeRange {
    /// Build a range, rejecting non-finite bounds and `min > max`
    pub fn new(min: f64, max: f64) -> Result<Self, String> {
        let range = Self { min, max };
        range.check()?;
        Ok(range)
    }

    /// Well-formedness check used by validation
    pub fn check(&self) -> Result<(), String> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err("range bounds must be finite numbers".to_string());
        }
        if self.min > self.max {
            return Err(format!(
                "minimum ({}) must be <= maximum ({})",
                self.min, self.max
            ));
        }
        Ok(())
    }

    pub fn is_well_formed(&self) -> bool {
        self.check().is_ok()
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// `min - max`, without trailing `.0` on whole numbers
    pub fn display(&self) -> String {
        format!("{} - {}", format_number(self.min), format_number(self.max))
    }

    fn to_json(self) -> Value {
        json!([self.min, self.max])
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// One category with its confidence range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    pub range: AttributeRange,
}

/// Confidence ranges over a fixed vocabulary of mutually-exclusive categories
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryDistribution {
    pub entries: Vec<CategoryEntry>,
}

impl CategoryDistribution {
    pub fn new(entries: Vec<CategoryEntry>) -> Self {
        Self { entries }
    }

    /// Entry with the highest upper bound; first occurrence wins ties
    pub fn primary(&self) -> Option<&str> {
        let mut best: Option<&CategoryEntry> = None;
        for entry in &self.entries {
            match best {
                Some(current) if entry.range.max <= current.range.max => {}
                _ => best = Some(entry),
            }
        }
        best.map(|e| e.name.as_str())
    }

    fn to_json(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|e| json!({ "name": e.name, "value": e.range.to_json() }))
                .collect(),
        )
    }
}

/// Named scalar trait estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarLabel {
    pub name: String,
    pub range: AttributeRange,
}

/// Named categorical trait estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalLabel {
    pub name: String,
    pub distribution: CategoryDistribution,
}

/// Structured labels for one item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub scalars: Vec<ScalarLabel>,
    pub categories: Vec<CategoricalLabel>,
}

/// Sink-ready rendering of a label record
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSummary {
    /// `trait: min - max` pairs joined by `; `
    pub ranges: String,
    /// `trait=primary` pairs joined by `; `
    pub primary_categories: String,
}

impl LabelRecord {
    pub fn scalar(&self, name: &str) -> Option<&AttributeRange> {
        self.scalars.iter().find(|s| s.name == name).map(|s| &s.range)
    }

    pub fn category(&self, name: &str) -> Option<&CategoryDistribution> {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.distribution)
    }

    /// Render ranges and primary categories for display and the sink
    pub fn display_summary(&self) -> LabelSummary {
        let ranges = self
            .scalars
            .iter()
            .map(|s| format!("{}: {}", s.name, s.range.display()))
            .collect::<Vec<_>>()
            .join("; ");

        let primary_categories = self
            .categories
            .iter()
            .map(|c| {
                format!(
                    "{}={}",
                    c.name,
                    c.distribution.primary().unwrap_or("unknown")
                )
            })
            .collect::<Vec<_>>()
            .join("; ");

        LabelSummary {
            ranges,
            primary_categories,
        }
    }

    /// External dict-shaped JSON form, in field order
    pub fn to_external_json(&self) -> Value {
        let mut map = Map::new();
        for scalar in &self.scalars {
            map.insert(scalar.name.clone(), scalar.range.to_json());
        }
        for category in &self.categories {
            map.insert(category.name.clone(), category.distribution.to_json());
        }
        Value::Object(map)
    }
}
