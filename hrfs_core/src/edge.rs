//! Change-detecting boolean.

/// A transition reported by [`EdgeTrigger::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: bool,
    pub to: bool,
}

/// Boolean flag that reports transitions once a baseline is known.
///
/// The flag starts unset. The first `set` establishes the baseline and
/// reports nothing; every later change of value is reported exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeTrigger {
    value: Option<bool>,
}

impl EdgeTrigger {
    /// Unset trigger.
    pub const fn new() -> Self {
        Self { value: None }
    }

    /// Trigger with a known baseline.
    pub const fn with_value(value: bool) -> Self {
        Self { value: Some(value) }
    }

    /// Store `value`, returning the transition if the value changed from a
    /// known previous value.
    pub fn set(&mut self, value: bool) -> Option<Edge> {
        let previous = self.value.replace(value);
        match previous {
            Some(from) if from != value => Some(Edge { from, to: value }),
            _ => None,
        }
    }

    /// [`set`](Self::set), logging every change of the stored value under
    /// `flag`, the initial baseline included.
    pub fn set_logged(&mut self, flag: &'static str, value: bool) -> Option<Edge> {
        let previous = self.value;
        let edge = self.set(value);
        if previous != Some(value) {
            let from = previous.map_or_else(|| "None".to_string(), |v| v.to_string());
            tracing::info!(flag, %from, to = value, "'{flag}' changed from {from} to {value}");
        }
        edge
    }

    pub fn get(&self) -> Option<bool> {
        self.value
    }

    /// True only when set and true; unset reads as false.
    pub fn is_true(&self) -> bool {
        self.value == Some(true)
    }
}
