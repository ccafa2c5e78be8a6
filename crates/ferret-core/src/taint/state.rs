//! Per-file variable state
//!
//! Tracks, for every variable name seen in a file, where it was first seen,
//! whether it has been escaped, and a coarse shape classification used to
//! suppress unsafe whole-variable rewrites.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar,
    Array,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableState {
    pub first_seen_line: usize,
    pub shape: Shape,
    pub secured: bool,
    /// Short tags recording why the state looks the way it does.
    pub reasons: BTreeSet<String>,
}

impl VariableState {
    pub fn new(first_seen_line: usize) -> Self {
        Self {
            first_seen_line,
            shape: Shape::Unknown,
            secured: false,
            reasons: BTreeSet::new(),
        }
    }

    /// Shape is monotone toward `Array`: once an array, always an array.
    /// `Scalar` only refines `Unknown`.
    pub fn upgrade_shape(&mut self, shape: Shape) {
        match (self.shape, shape) {
            (Shape::Array, _) => {}
            (_, Shape::Array) => self.shape = Shape::Array,
            (Shape::Unknown, Shape::Scalar) => self.shape = Shape::Scalar,
            _ => {}
        }
    }

    pub fn add_reason(&mut self, reason: impl Into<String>) {
        self.reasons.insert(reason.into());
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        self.reasons.contains(reason)
    }
}

#[derive(Debug, Default)]
pub struct VariableMap {
    states: HashMap<String, VariableState>,
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, name: &str) -> Option<&VariableState> {
        self.states.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Returns the state for `name`, creating it with `line` as the first
    /// sighting. An existing state keeps the earlier line.
    pub fn entry(&mut self, name: &str, line: usize) -> &mut VariableState {
        let state = self
            .states
            .entry(name.to_string())
            .or_insert_with(|| VariableState::new(line));
        if line < state.first_seen_line {
            state.first_seen_line = line;
        }
        state
    }

    /// `secured` is monotone within a file; there is no way back.
    pub fn mark_secured(&mut self, name: &str, reason: &str) {
        if let Some(state) = self.states.get_mut(name) {
            state.secured = true;
            state.add_reason(reason);
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_never_downgrades_from_array() {
        let mut state = VariableState::new(1);
        state.upgrade_shape(Shape::Array);
        state.upgrade_shape(Shape::Scalar);
        state.upgrade_shape(Shape::Unknown);

        assert_eq!(state.shape, Shape::Array);
    }

    #[test]
    fn scalar_refines_unknown_only() {
        let mut state = VariableState::new(1);
        state.upgrade_shape(Shape::Scalar);
        assert_eq!(state.shape, Shape::Scalar);

        state.upgrade_shape(Shape::Unknown);
        assert_eq!(state.shape, Shape::Scalar);

        state.upgrade_shape(Shape::Array);
        assert_eq!(state.shape, Shape::Array);
    }

    #[test]
    fn entry_keeps_earliest_line() {
        let mut map = VariableMap::new();
        map.entry("name", 7);
        map.entry("name", 3);
        map.entry("name", 12);

        assert_eq!(map.state("name").unwrap().first_seen_line, 3);
    }

    #[test]
    fn mark_secured_requires_existing_state() {
        let mut map = VariableMap::new();
        map.mark_secured("ghost", "secured_with_escape");
        assert!(map.state("ghost").is_none());

        map.entry("name", 1);
        map.mark_secured("name", "secured_with_escape");
        let state = map.state("name").unwrap();
        assert!(state.secured);
        assert!(state.has_reason("secured_with_escape"));
    }
}
