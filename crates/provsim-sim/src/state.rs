//! ---
//! ps_section: "11-simulation"
//! ps_subsection: "02-state"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Process state data model shared by engine and provider."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Whether a variable is consumed or produced by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Input, Direction::Output];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Floating-point versus boolean variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Analog,
    Binary,
}

impl Kind {
    pub const ALL: [Kind; 2] = [Kind::Analog, Kind::Binary];
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Analog => f.write_str("analog"),
            Kind::Binary => f.write_str("binary"),
        }
    }
}

/// A single process variable value.
///
/// The `Display` form is the lower-cased text used on the wire: analog values
/// always carry a fractional part (`25.0`), binary values are `true`/`false`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Analog(f64),
    Binary(bool),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Analog(_) => Kind::Analog,
            Value::Binary(_) => Kind::Binary,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Analog(value) => value,
            Value::Binary(true) => 1.0,
            Value::Binary(false) => 0.0,
        }
    }

    pub fn as_bool(&self) -> bool {
        match *self {
            Value::Analog(value) => value != 0.0,
            Value::Binary(value) => value,
        }
    }

    /// Convert into the representation of `kind`.
    pub fn coerce(self, kind: Kind) -> Value {
        match kind {
            Kind::Analog => Value::Analog(self.as_f64()),
            Kind::Binary => Value::Binary(self.as_bool()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Analog(value) => f.write_str(&analog_text(*value)),
            Value::Binary(value) => write!(f, "{}", value),
        }
    }
}

/// Shortest round-trip decimal. Exponents carry an explicit sign and at
/// least two digits (`1e+16`, `2.5e-07`).
fn analog_text(value: f64) -> String {
    let text = format!("{:?}", value).to_lowercase();
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Analog(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Binary(value)
    }
}

/// Analog and binary variables of one direction, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variables {
    #[serde(default)]
    pub analog: IndexMap<String, f64>,
    #[serde(default)]
    pub binary: IndexMap<String, bool>,
}

impl Variables {
    pub fn get(&self, tag: &str, kind: Kind) -> Option<Value> {
        match kind {
            Kind::Analog => self.analog.get(tag).copied().map(Value::Analog),
            Kind::Binary => self.binary.get(tag).copied().map(Value::Binary),
        }
    }

    /// Overwrite an existing entry. Returns `false` when `tag` is not declared
    /// under `kind`; new tags are never created.
    pub fn replace(&mut self, tag: &str, kind: Kind, value: Value) -> bool {
        match kind {
            Kind::Analog => match self.analog.get_mut(tag) {
                Some(slot) => {
                    *slot = value.as_f64();
                    true
                }
                None => false,
            },
            Kind::Binary => match self.binary.get_mut(tag) {
                Some(slot) => {
                    *slot = value.as_bool();
                    true
                }
                None => false,
            },
        }
    }

    /// The kind under which `tag` is declared, analog checked first.
    pub fn kind_of(&self, tag: &str) -> Option<Kind> {
        if self.analog.contains_key(tag) {
            Some(Kind::Analog)
        } else if self.binary.contains_key(tag) {
            Some(Kind::Binary)
        } else {
            None
        }
    }

    pub fn contains(&self, tag: &str, kind: Kind) -> bool {
        match kind {
            Kind::Analog => self.analog.contains_key(tag),
            Kind::Binary => self.binary.contains_key(tag),
        }
    }

    /// Every `(tag, value)` pair, analog first, each in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        self.analog
            .iter()
            .map(|(tag, value)| (tag.as_str(), Value::Analog(*value)))
            .chain(
                self.binary
                    .iter()
                    .map(|(tag, value)| (tag.as_str(), Value::Binary(*value))),
            )
    }

    pub fn len(&self) -> usize {
        self.analog.len() + self.binary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analog.is_empty() && self.binary.is_empty()
    }
}

/// Inputs and outputs of a simulated process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessState {
    #[serde(default)]
    pub input: Variables,
    #[serde(default)]
    pub output: Variables,
}

impl ProcessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_analog(mut self, tag: impl Into<String>, value: f64) -> Self {
        self.input.analog.insert(tag.into(), value);
        self
    }

    pub fn with_input_binary(mut self, tag: impl Into<String>, value: bool) -> Self {
        self.input.binary.insert(tag.into(), value);
        self
    }

    pub fn with_output_analog(mut self, tag: impl Into<String>, value: f64) -> Self {
        self.output.analog.insert(tag.into(), value);
        self
    }

    pub fn with_output_binary(mut self, tag: impl Into<String>, value: bool) -> Self {
        self.output.binary.insert(tag.into(), value);
        self
    }

    pub fn variables(&self, direction: Direction) -> &Variables {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }

    pub fn variables_mut(&mut self, direction: Direction) -> &mut Variables {
        match direction {
            Direction::Input => &mut self.input,
            Direction::Output => &mut self.output,
        }
    }

    pub fn get(&self, tag: &str, direction: Direction, kind: Kind) -> Option<Value> {
        self.variables(direction).get(tag, kind)
    }

    /// Every declared tag with its bucket, inputs before outputs.
    pub fn tags(&self) -> impl Iterator<Item = (Direction, Kind, &str)> + '_ {
        Direction::ALL.into_iter().flat_map(move |direction| {
            let vars = self.variables(direction);
            vars.analog
                .keys()
                .map(move |tag| (direction, Kind::Analog, tag.as_str()))
                .chain(
                    vars.binary
                        .keys()
                        .map(move |tag| (direction, Kind::Binary, tag.as_str())),
                )
        })
    }

    pub fn len(&self) -> usize {
        self.input.len() + self.output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }

    /// Check the invariants a model must satisfy before the engine accepts it:
    /// non-empty tag names, finite analog values, and every tag declared in
    /// exactly one (direction, kind) bucket.
    /// First analog tag, outputs before inputs, whose value is NaN or infinite.
    pub fn first_non_finite(&self) -> Option<(Direction, &str)> {
        [(Direction::Output, &self.output), (Direction::Input, &self.input)]
            .into_iter()
            .find_map(|(direction, variables)| {
                variables
                    .analog
                    .iter()
                    .find(|(_, value)| !value.is_finite())
                    .map(|(tag, _)| (direction, tag.as_str()))
            })
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        let mut seen = HashSet::with_capacity(self.len());
        for (direction, kind, tag) in self.tags() {
            if tag.trim().is_empty() {
                return Err(LoadError::EmptyTag);
            }
            if !seen.insert(tag) {
                return Err(LoadError::DuplicateTag {
                    tag: tag.to_owned(),
                });
            }
            if let Some(Value::Analog(value)) = self.get(tag, direction, kind) {
                if !value.is_finite() {
                    return Err(LoadError::NonFiniteValue {
                        tag: tag.to_owned(),
                        direction,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_text_is_lower_case_with_fraction() {
        assert_eq!(Value::Analog(25.0).to_string(), "25.0");
        assert_eq!(Value::Analog(-0.5).to_string(), "-0.5");
        assert_eq!(Value::Binary(true).to_string(), "true");
        assert_eq!(Value::Binary(false).to_string(), "false");
    }

    #[test]
    fn exponent_text_is_signed_and_two_digits() {
        assert_eq!(Value::Analog(1e16).to_string(), "1e+16");
        assert_eq!(Value::Analog(1e-7).to_string(), "1e-07");
        assert_eq!(Value::Analog(-2.5e-5).to_string(), "-2.5e-05");
        assert_eq!(Value::Analog(1.5e300).to_string(), "1.5e+300");
        assert_eq!(Value::Analog(1e15).to_string(), "1000000000000000.0");
        assert_eq!(Value::Analog(0.0001).to_string(), "0.0001");
    }

    #[test]
    fn coercion_between_kinds() {
        assert_eq!(Value::Binary(true).coerce(Kind::Analog), Value::Analog(1.0));
        assert_eq!(Value::Analog(0.0).coerce(Kind::Binary), Value::Binary(false));
        assert_eq!(Value::Analog(3.5).coerce(Kind::Binary), Value::Binary(true));
        assert_eq!(Value::Analog(3.5).coerce(Kind::Analog), Value::Analog(3.5));
    }

    #[test]
    fn replace_never_creates_tags() {
        let mut vars = Variables::default();
        vars.analog.insert("pump.flow".into(), 1.0);
        assert!(vars.replace("pump.flow", Kind::Analog, Value::Analog(2.0)));
        assert!(!vars.replace("pump.speed", Kind::Analog, Value::Analog(2.0)));
        assert!(!vars.replace("pump.flow", Kind::Binary, Value::Binary(true)));
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("pump.flow", Kind::Analog), Some(Value::Analog(2.0)));
    }

    #[test]
    fn tags_enumerate_inputs_before_outputs() {
        let state = ProcessState::new()
            .with_output_binary("c.status", false)
            .with_input_analog("a.value", 1.0)
            .with_input_binary("b.status", true);
        let tags: Vec<_> = state.tags().collect();
        assert_eq!(
            tags,
            vec![
                (Direction::Input, Kind::Analog, "a.value"),
                (Direction::Input, Kind::Binary, "b.status"),
                (Direction::Output, Kind::Binary, "c.status"),
            ]
        );
    }

    #[test]
    fn validate_rejects_duplicates_across_buckets() {
        let state = ProcessState::new()
            .with_input_analog("breaker.value", 1.0)
            .with_output_analog("breaker.value", 2.0);
        assert!(matches!(
            state.validate(),
            Err(LoadError::DuplicateTag { tag }) if tag == "breaker.value"
        ));
    }

    #[test]
    fn validate_rejects_non_finite_analog() {
        let state = ProcessState::new().with_output_analog("line.current", f64::NAN);
        assert!(matches!(
            state.validate(),
            Err(LoadError::NonFiniteValue { direction: Direction::Output, .. })
        ));
    }

    #[test]
    fn first_non_finite_reports_direction_and_tag() {
        let mut state = ProcessState::new()
            .with_input_analog("setpoint.value", 1.0)
            .with_output_analog("flow.value", 2.0);
        assert_eq!(state.first_non_finite(), None);
        state.input.analog.insert("setpoint.value".into(), f64::INFINITY);
        assert_eq!(state.first_non_finite(), Some((Direction::Input, "setpoint.value")));
    }

    #[test]
    fn serialised_shape_matches_direction_kind_layout() {
        let state = ProcessState::new()
            .with_input_binary("on.status", true)
            .with_output_analog("temperature.value", 25.0);
        let json = serde_json::to_value(&state).expect("serialise");
        assert_eq!(json["input"]["binary"]["on.status"], serde_json::json!(true));
        assert_eq!(
            json["output"]["analog"]["temperature.value"],
            serde_json::json!(25.0)
        );
    }
}
