//! ---
//! ps_section: "05-networking-external-interfaces"
//! ps_subsection: "mirror"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Field-device view of the simulation process state."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::fmt;
use std::fmt::Write as _;

use provsim_sim::{Direction, Kind, ProcessState, Value, Variables};

use crate::tags;

/// Which side of the field device a mirrored variable sits on.
///
/// Simulation outputs are read by the field device (`InputsToFd`); simulation
/// inputs are driven by it (`OutputsFromFd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    InputsToFd,
    OutputsFromFd,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::InputsToFd, Role::OutputsFromFd];

    /// Simulation direction backing this role.
    pub fn direction(self) -> Direction {
        match self {
            Role::InputsToFd => Direction::Output,
            Role::OutputsFromFd => Direction::Input,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::InputsToFd => f.write_str("inputs_to_fd"),
            Role::OutputsFromFd => f.write_str("outputs_from_fd"),
        }
    }
}

/// Direction-flipped copy of the engine's process state.
///
/// The mirror is replaced wholesale from the engine on every refresh, so a
/// value written into it only survives until the next refresh unless the
/// engine accepted the same value as an input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementMirror {
    pub inputs_to_fd: Variables,
    pub outputs_from_fd: Variables,
}

impl ElementMirror {
    /// Build the mirror from an engine snapshot, rewriting tags into
    /// canonical form when `normalize` is set.
    pub fn from_state(state: &ProcessState, normalize: bool) -> Self {
        let ProcessState { input, output } = if normalize {
            tags::normalize_state(state)
        } else {
            state.clone()
        };
        Self {
            inputs_to_fd: output,
            outputs_from_fd: input,
        }
    }

    pub fn role(&self, role: Role) -> &Variables {
        match role {
            Role::InputsToFd => &self.inputs_to_fd,
            Role::OutputsFromFd => &self.outputs_from_fd,
        }
    }

    pub fn role_mut(&mut self, role: Role) -> &mut Variables {
        match role {
            Role::InputsToFd => &mut self.inputs_to_fd,
            Role::OutputsFromFd => &mut self.outputs_from_fd,
        }
    }

    /// Every entry ordered by role, then kind, then insertion.
    pub fn entries(&self) -> impl Iterator<Item = (Role, &str, Value)> + '_ {
        Role::ALL
            .into_iter()
            .flat_map(move |role| self.role(role).iter().map(move |(tag, value)| (role, tag, value)))
    }

    /// Locate `tag` in any role and kind.
    pub fn find(&self, tag: &str) -> Option<(Role, Value)> {
        Role::ALL.into_iter().find_map(|role| {
            let vars = self.role(role);
            Kind::ALL
                .into_iter()
                .find_map(|kind| vars.get(tag, kind))
                .map(|value| (role, value))
        })
    }

    /// Kind of `tag` when the field device is allowed to write it.
    pub fn writable_kind(&self, tag: &str) -> Option<Kind> {
        self.outputs_from_fd.kind_of(tag)
    }

    pub fn len(&self) -> usize {
        self.inputs_to_fd.len() + self.outputs_from_fd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs_to_fd.is_empty() && self.outputs_from_fd.is_empty()
    }

    /// `tag1,tag2,...,` in entry order.
    pub fn tag_list(&self) -> String {
        self.entries().fold(String::new(), |mut out, (_, tag, _)| {
            out.push_str(tag);
            out.push(',');
            out
        })
    }

    /// `tag1:value1,tag2:value2,...,` in entry order.
    pub fn pack(&self) -> String {
        let mut out = String::new();
        for (_, tag, value) in self.entries() {
            let _ = write!(out, "{tag}:{value},");
        }
        out
    }
}
