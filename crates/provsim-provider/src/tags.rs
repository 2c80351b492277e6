//! ---
//! ps_section: "05-networking-external-interfaces"
//! ps_subsection: "tags"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Canonical device.field tag naming and normalization."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
//! Field devices address variables as `device.field`. Models are free to use
//! bare names (`temperature`), so the bridge can rewrite the tags it exposes
//! into canonical form: analog tags gain a `.value` field, binary tags a
//! `.status` field.

use std::borrow::Cow;
use std::collections::HashSet;

use provsim_sim::{Direction, Kind, LoadError, ProcessState};

pub const ANALOG_FIELD: &str = "value";
pub const BINARY_FIELD: &str = "status";

/// Exactly one `.` with a non-empty part on each side.
pub fn is_canonical(tag: &str) -> bool {
    match tag.split_once('.') {
        Some((device, field)) => {
            !device.is_empty() && !field.is_empty() && !field.contains('.')
        }
        None => false,
    }
}

/// Text before the first `.`, or the whole tag when it has none.
pub fn device_component(tag: &str) -> &str {
    match tag.split_once('.') {
        Some((device, _)) => device,
        None => tag,
    }
}

/// Field name used when a `kind` tag is rewritten.
pub fn field_for(kind: Kind) -> &'static str {
    match kind {
        Kind::Analog => ANALOG_FIELD,
        Kind::Binary => BINARY_FIELD,
    }
}

/// Canonical form of `tag`. Canonical tags pass through untouched; anything
/// else keeps its device component and gets the field for `kind`.
pub fn normalize(tag: &str, kind: Kind) -> Cow<'_, str> {
    if is_canonical(tag) {
        Cow::Borrowed(tag)
    } else {
        Cow::Owned(format!("{}.{}", device_component(tag), field_for(kind)))
    }
}

/// True when at least one tag in `state` is not canonical.
pub fn state_needs_normalization(state: &ProcessState) -> bool {
    state.tags().any(|(_, _, tag)| !is_canonical(tag))
}

/// Copy of `state` with every tag rewritten by [`normalize`], values and
/// declaration order preserved.
pub fn normalize_state(state: &ProcessState) -> ProcessState {
    let mut normalized = ProcessState::new();
    for direction in Direction::ALL {
        let source = state.variables(direction);
        let target = normalized.variables_mut(direction);
        for (tag, value) in &source.analog {
            target
                .analog
                .insert(normalize(tag, Kind::Analog).into_owned(), *value);
        }
        for (tag, value) in &source.binary {
            target
                .binary
                .insert(normalize(tag, Kind::Binary).into_owned(), *value);
        }
    }
    normalized
}

/// Reject states whose exposed tag names would collide, optionally after
/// normalization.
pub fn ensure_unique(state: &ProcessState, normalized: bool) -> Result<(), LoadError> {
    let mut seen = HashSet::with_capacity(state.len());
    for (_, kind, tag) in state.tags() {
        let exposed = if normalized {
            normalize(tag, kind)
        } else {
            Cow::Borrowed(tag)
        };
        if !seen.insert(exposed.clone()) {
            return Err(LoadError::DuplicateTag {
                tag: exposed.into_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_requires_exactly_one_separator() {
        assert!(is_canonical("breaker.status"));
        assert!(!is_canonical("breaker"));
        assert!(!is_canonical("a.b.c"));
        assert!(!is_canonical(".status"));
        assert!(!is_canonical("breaker."));
        assert!(!is_canonical(""));
    }

    #[test]
    fn normalize_appends_field_for_kind() {
        assert_eq!(normalize("temperature", Kind::Analog), "temperature.value");
        assert_eq!(normalize("on", Kind::Binary), "on.status");
        assert_eq!(normalize("pump.flow", Kind::Analog), "pump.flow");
        assert_eq!(normalize("a.b.c", Kind::Analog), "a.value");
        assert_eq!(normalize("a.b.c", Kind::Binary), "a.status");
    }

    #[test]
    fn device_component_is_prefix_before_first_dot() {
        assert_eq!(device_component("temperature.value"), "temperature");
        assert_eq!(device_component("a.b.c"), "a");
        assert_eq!(device_component("setpoint"), "setpoint");
    }

    #[test]
    fn one_bare_tag_triggers_normalization() {
        let canonical = ProcessState::new()
            .with_input_analog("pump.flow", 1.0)
            .with_output_binary("pump.status", true);
        assert!(!state_needs_normalization(&canonical));

        let mixed = canonical.clone().with_output_analog("pressure", 2.0);
        assert!(state_needs_normalization(&mixed));
        let normalized = normalize_state(&mixed);
        assert!(!state_needs_normalization(&normalized));
        assert_eq!(
            normalized.output.analog.get("pressure.value"),
            Some(&2.0)
        );
        assert_eq!(normalized.input.analog.get("pump.flow"), Some(&1.0));
    }

    #[test]
    fn collisions_after_normalization_are_rejected() {
        let state = ProcessState::new()
            .with_input_analog("pump", 1.0)
            .with_output_analog("pump.x.y", 2.0);
        assert!(ensure_unique(&state, false).is_ok());
        assert!(matches!(
            ensure_unique(&state, true),
            Err(LoadError::DuplicateTag { tag }) if tag == "pump.value"
        ));
    }
}
