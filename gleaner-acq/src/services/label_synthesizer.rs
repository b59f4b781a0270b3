//! Label synthesis and validation
//!
//! Synthesis is a placeholder for a labeling model: it fills every trait of a
//! [`LabelSchema`] with a random but well-formed range. Whatever replaces it
//! must produce records that pass [`LabelSynthesizer::validate`], which is
//! also used on externally supplied labels.

use crate::models::{
    AttributeRange, CategoricalLabel, CategoryDistribution, CategoryEntry, LabelRecord,
    ScalarLabel, ValidationError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Scalar trait: numeric domain and widest range synthesis may emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarTrait {
    pub name: String,
    pub domain: AttributeRange,
    pub max_span: f64,
}

/// Categorical trait over a fixed vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalTrait {
    pub name: String,
    pub vocabulary: Vec<String>,
}

/// Required fields of a label record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSchema {
    pub scalars: Vec<ScalarTrait>,
    pub categoricals: Vec<CategoricalTrait>,
}

impl LabelSchema {
    /// Build a schema; needs two or more scalar traits and at least one categorical trait
    pub fn new(
        scalars: Vec<ScalarTrait>,
        categoricals: Vec<CategoricalTrait>,
    ) -> Result<Self, ValidationError> {
        if scalars.len() < 2 {
            return Err(ValidationError::new("schema", "at least two scalar traits required"));
        }
        if categoricals.is_empty() {
            return Err(ValidationError::new("schema", "at least one categorical trait required"));
        }
        for s in &scalars {
            s.domain
                .check()
                .map_err(|reason| ValidationError::new(&s.name, reason))?;
            if !(s.max_span.is_finite() && s.max_span >= 0.0) {
                return Err(ValidationError::new(&s.name, "max_span must be a non-negative number"));
            }
        }
        for c in &categoricals {
            if c.vocabulary.is_empty() {
                return Err(ValidationError::new(&c.name, "vocabulary must not be empty"));
            }
        }
        Ok(Self {
            scalars,
            categoricals,
        })
    }

    /// Default item schema
    pub fn standard() -> Self {
        let scalar = |name: &str, lo: f64, hi: f64, max_span: f64| ScalarTrait {
            name: name.to_string(),
            domain: AttributeRange { min: lo, max: hi },
            max_span,
        };
        let categorical = |name: &str, vocabulary: &[&str]| CategoricalTrait {
            name: name.to_string(),
            vocabulary: vocabulary.iter().map(|v| v.to_string()).collect(),
        };

        Self {
            scalars: vec![
                scalar("age", 18.0, 80.0, 6.0),
                scalar("height", 140.0, 210.0, 10.0),
                scalar("weight", 40.0, 150.0, 10.0),
                scalar("face", 0.0, 100.0, 20.0),
                scalar("presentable", 0.0, 100.0, 20.0),
                scalar("confidence", 0.0, 100.0, 25.0),
            ],
            categoricals: vec![
                categorical("gender", &["male", "female"]),
                categorical(
                    "origin",
                    &[
                        "Africa",
                        "Europe",
                        "Middle East",
                        "East Asia",
                        "South Asia",
                        "Americas",
                        "Oceania",
                        "Mixed",
                    ],
                ),
            ],
        }
    }
}

impl Default for LabelSchema {
    fn default() -> Self {
        Self::standard()
    }
}

/// Hints available when labeling one item
#[derive(Debug, Clone, Default)]
pub struct LabelContext {
    /// Center values for scalar traits (e.g. a stated age)
    pub anchors: HashMap<String, f64>,
}

pub struct LabelSynthesizer {
    schema: LabelSchema,
    rng: StdRng,
}

impl LabelSynthesizer {
    pub fn new(schema: LabelSchema, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { schema, rng }
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.schema
    }

    /// Produce a record covering every schema trait
    pub fn synthesize(&mut self, context: &LabelContext) -> LabelRecord {
        let scalars = self
            .schema
            .scalars
            .iter()
            .map(|t| ScalarLabel {
                name: t.name.clone(),
                range: synthesize_range(&mut self.rng, t, context.anchors.get(&t.name).copied()),
            })
            .collect();

        let categories = self
            .schema
            .categoricals
            .iter()
            .map(|t| CategoricalLabel {
                name: t.name.clone(),
                distribution: synthesize_distribution(&mut self.rng, &t.vocabulary),
            })
            .collect();

        LabelRecord {
            scalars,
            categories,
        }
    }

    /// Check presence and well-formedness of every required field
    pub fn validate(&self, record: &LabelRecord) -> Result<(), ValidationError> {
        for t in &self.schema.scalars {
            let range = record
                .scalar(&t.name)
                .ok_or_else(|| ValidationError::new(&t.name, "missing required field"))?;
            range
                .check()
                .map_err(|reason| ValidationError::new(&t.name, reason))?;
        }

        for t in &self.schema.categoricals {
            let distribution = record
                .category(&t.name)
                .ok_or_else(|| ValidationError::new(&t.name, "missing required field"))?;
            validate_distribution(&t.name, distribution)?;
        }

        // fields outside the schema must still be well-formed
        for s in &record.scalars {
            s.range
                .check()
                .map_err(|reason| ValidationError::new(&s.name, reason))?;
        }
        for c in &record.categories {
            validate_distribution(&c.name, &c.distribution)?;
        }

        if record.scalars.len() < 2 {
            return Err(ValidationError::new("scalars", "at least two attribute ranges required"));
        }
        if record.categories.is_empty() {
            return Err(ValidationError::new(
                "categories",
                "at least one category distribution required",
            ));
        }
        Ok(())
    }

    /// Parse an external dict-shaped payload, reporting the first malformed field
    ///
    /// Expected shape: `{"trait": [min, max], "cat": [{"name": "..", "value":
    /// [min, max]}, ..]}`. Keys outside the schema are ignored.
    pub fn parse_external(&self, payload: &Value) -> Result<LabelRecord, ValidationError> {
        let object = payload
            .as_object()
            .ok_or_else(|| ValidationError::new("record", "expected a JSON object"))?;

        let mut record = LabelRecord::default();

        for t in &self.schema.scalars {
            let value = object
                .get(&t.name)
                .ok_or_else(|| ValidationError::new(&t.name, "missing required field"))?;
            record.scalars.push(ScalarLabel {
                name: t.name.clone(),
                range: parse_range(&t.name, value)?,
            });
        }

        for t in &self.schema.categoricals {
            let value = object
                .get(&t.name)
                .ok_or_else(|| ValidationError::new(&t.name, "missing required field"))?;
            let items = value
                .as_array()
                .ok_or_else(|| ValidationError::new(&t.name, "must be a list of objects"))?;

            let mut entries = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let field = format!("{}[{}]", t.name, i);
                let name = item
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ValidationError::new(&field, "entry must have a name"))?;
                let range = item
                    .get("value")
                    .ok_or_else(|| ValidationError::new(&field, "entry must have a value"))
                    .and_then(|v| parse_range(&field, v))?;
                entries.push(CategoryEntry {
                    name: name.to_string(),
                    range,
                });
            }

            record.categories.push(CategoricalLabel {
                name: t.name.clone(),
                distribution: CategoryDistribution::new(entries),
            });
        }

        self.validate(&record)?;
        Ok(record)
    }
}

/// Category with the highest upper bound; first occurrence wins ties
pub fn primary_category(distribution: &CategoryDistribution) -> Option<&str> {
    distribution.primary()
}

fn validate_distribution(
    field: &str,
    distribution: &CategoryDistribution,
) -> Result<(), ValidationError> {
    if distribution.entries.is_empty() {
        return Err(ValidationError::new(field, "must list at least one category"));
    }
    for (i, entry) in distribution.entries.iter().enumerate() {
        let entry_field = format!("{}[{}]", field, i);
        if entry.name.trim().is_empty() {
            return Err(ValidationError::new(entry_field, "entry must have a name"));
        }
        entry
            .range
            .check()
            .map_err(|reason| ValidationError::new(entry_field, reason))?;
    }
    Ok(())
}

fn parse_range(field: &str, value: &Value) -> Result<AttributeRange, ValidationError> {
    let pair = value
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| ValidationError::new(field, "must be a list with two values"))?;

    let min = pair[0]
        .as_f64()
        .ok_or_else(|| ValidationError::new(field, "must contain numeric values"))?;
    let max = pair[1]
        .as_f64()
        .ok_or_else(|| ValidationError::new(field, "must contain numeric values"))?;

    AttributeRange::new(min, max).map_err(|reason| ValidationError::new(field, reason))
}

fn synthesize_range(rng: &mut StdRng, t: &ScalarTrait, anchor: Option<f64>) -> AttributeRange {
    let (lo, hi) = (t.domain.min, t.domain.max);
    let center = match anchor {
        Some(a) if a.is_finite() => a.clamp(lo, hi),
        _ => rng.gen_range(lo..=hi),
    };
    let half = rng.gen_range(0.0..=t.max_span / 2.0);

    let min = (center - half).clamp(lo, hi).floor().max(lo);
    let max = (center + half).clamp(lo, hi).ceil().min(hi);
    AttributeRange { min, max }
}

/// One dominant category, the rest low
fn synthesize_distribution(rng: &mut StdRng, vocabulary: &[String]) -> CategoryDistribution {
    let primary = rng.gen_range(0..vocabulary.len());

    let entries = vocabulary
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let (min, max) = if i == primary {
                let min: u32 = rng.gen_range(70..=85);
                (min, rng.gen_range(min..=95))
            } else {
                let min: u32 = rng.gen_range(1..=20);
                (min, rng.gen_range(min..=min + 15))
            };
            CategoryEntry {
                name: name.clone(),
                range: AttributeRange {
                    min: f64::from(min),
                    max: f64::from(max),
                },
            }
        })
        .collect();

    CategoryDistribution::new(entries)
}
