//! Schema-directed value synthesis.

use chrono::{DateTime, Duration, Utc};
use fake::faker::internet::en::{DomainSuffix, SafeEmail};
use fake::faker::lorem::en::Word;
use fake::faker::name::en::Name;
use fake::Fake;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Map, Value};

use crate::domain::schema::{ArraySchema, IntegerSchema, NumberSchema, ObjectSchema, StringFormat, StringSchema};
use crate::domain::SchemaNode;

/// Chance that a non-required object property is included
pub const OPTIONAL_PROPERTY_PROBABILITY: f64 = 0.7;

const TOKEN_LENGTH: usize = 12;
const UNCONSTRAINED_TOKEN_LENGTH: usize = 8;
/// 2020-01-01T00:00:00Z
const TIMESTAMP_BASE: i64 = 1_577_836_800;
const TIMESTAMP_SPAN_SECS: i64 = 5 * 365 * 24 * 3600;

/// Default windows used when a schema leaves a bound open
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub integer_range: (i64, i64),
    pub number_range: (f64, f64),
    pub array_items: (usize, usize),
    pub optional_property_probability: f64,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            integer_range: (1000, 99_999),
            number_range: (10.5, 99_999.99),
            array_items: (1, 3),
            optional_property_probability: OPTIONAL_PROPERTY_PROBABILITY,
        }
    }
}

/// Produces values conforming to a resolved [`SchemaNode`].
///
/// The synthesizer holds no state between calls; all randomness comes from the
/// caller's RNG, so a seeded RNG gives reproducible output.
#[derive(Debug, Clone, Default)]
pub struct ValueSynthesizer {
    options: SynthesisOptions,
}

impl ValueSynthesizer {
    pub fn new(options: SynthesisOptions) -> Self {
        Self { options }
    }

    pub fn synthesize<R: Rng>(&self, node: &SchemaNode, rng: &mut R) -> Value {
        match node {
            SchemaNode::String(schema) => self.string(schema, rng),
            SchemaNode::Integer(schema) => self.integer(schema, rng),
            SchemaNode::Number(schema) => self.number(schema, rng),
            SchemaNode::Boolean => json!(rng.gen_bool(0.5)),
            SchemaNode::Array(schema) => self.array(schema, rng),
            SchemaNode::Object(schema) => self.object(schema, rng),
            SchemaNode::Unconstrained => json!(token(rng, UNCONSTRAINED_TOKEN_LENGTH)),
            // Resolved trees carry no references
            SchemaNode::Reference(_) => Value::Null,
        }
    }

    fn string<R: Rng>(&self, schema: &StringSchema, rng: &mut R) -> Value {
        if let Some(choice) = schema.enumeration.as_ref().and_then(|values| values.choose(rng)) {
            return json!(choice);
        }

        let value = match &schema.format {
            Some(StringFormat::DateTime) => timestamp(rng).to_rfc3339(),
            Some(StringFormat::Date) => timestamp(rng).format("%Y-%m-%d").to_string(),
            Some(StringFormat::Email) => SafeEmail().fake_with_rng::<String, _>(rng),
            Some(StringFormat::Name) => Name().fake_with_rng::<String, _>(rng),
            Some(StringFormat::Uuid) => uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string(),
            Some(StringFormat::Uri) => {
                let host: String = Word().fake_with_rng(rng);
                let suffix: String = DomainSuffix().fake_with_rng(rng);
                let resource: String = Word().fake_with_rng(rng);
                format!("https://{}.{}/{}", host, suffix, resource)
            }
            Some(StringFormat::Other(_)) | None => token(rng, TOKEN_LENGTH),
        };
        json!(value)
    }

    fn integer<R: Rng>(&self, schema: &IntegerSchema, rng: &mut R) -> Value {
        let (default_lo, default_hi) = self.options.integer_range;
        let width = default_hi.saturating_sub(default_lo).max(0);
        let (lo, hi) = match (schema.minimum, schema.maximum) {
            (Some(min), Some(max)) => (min, max),
            (Some(min), None) => (min, min.saturating_add(width)),
            (None, Some(max)) => (max.saturating_sub(width), max),
            (None, None) => (default_lo, default_hi.max(default_lo)),
        };
        json!(rng.gen_range(lo..=hi))
    }

    fn number<R: Rng>(&self, schema: &NumberSchema, rng: &mut R) -> Value {
        let (default_lo, default_hi) = self.options.number_range;
        let width = (default_hi - default_lo).max(0.0);
        let (lo, hi) = match (schema.minimum, schema.maximum) {
            (Some(min), Some(max)) => (min, max),
            (Some(min), None) => (min, min + width),
            (None, Some(max)) => (max - width, max),
            (None, None) => (default_lo, default_hi.max(default_lo)),
        };
        let drawn = if lo >= hi {
            lo
        } else if (hi - lo).is_finite() {
            rng.gen_range(lo..=hi)
        } else {
            // Span wider than f64::MAX
            lo + rng.gen::<f64>() * (hi / 2.0 - lo / 2.0) * 2.0
        };
        let rounded = (drawn * 100.0).round() / 100.0;
        json!(rounded.clamp(lo, hi))
    }

    fn array<R: Rng>(&self, schema: &ArraySchema, rng: &mut R) -> Value {
        let (default_lo, default_hi) = self.options.array_items;
        let width = default_hi.saturating_sub(default_lo);
        let (lo, hi) = match (schema.min_items, schema.max_items) {
            (Some(min), Some(max)) => (min, max),
            (Some(min), None) => (min, min.saturating_add(width)),
            (None, Some(max)) => (default_lo.min(max), max),
            (None, None) => (default_lo, default_hi.max(default_lo)),
        };
        let count = rng.gen_range(lo..=hi);
        let items = (0..count).map(|_| self.synthesize(&schema.items, rng)).collect();
        Value::Array(items)
    }

    fn object<R: Rng>(&self, schema: &ObjectSchema, rng: &mut R) -> Value {
        let probability = self.options.optional_property_probability.clamp(0.0, 1.0);
        let mut map = Map::new();
        for (name, property) in &schema.properties {
            if schema.required.contains(name) || rng.gen_bool(probability) {
                map.insert(name.clone(), self.synthesize(property, rng));
            }
        }
        Value::Object(map)
    }
}

fn token<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

fn timestamp<R: Rng>(rng: &mut R) -> DateTime<Utc> {
    let base = DateTime::<Utc>::from_timestamp(TIMESTAMP_BASE, 0).unwrap_or_default();
    base + Duration::seconds(rng.gen_range(0..TIMESTAMP_SPAN_SECS))
}
