use crate::scxml::expr::Condition;
use serde_json::Value;
use std::collections::HashMap;

pub type StateIdx = usize;
pub type TransitionIdx = usize;

/// Index of the synthetic `<scxml>` root state.
pub const ROOT: StateIdx = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Shallow,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Atomic,
    Compound,
    Parallel,
    Final,
    History(HistoryKind),
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Compound => "compound",
            Self::Parallel => "parallel",
            Self::Final => "final",
            Self::History(HistoryKind::Shallow) => "history(shallow)",
            Self::History(HistoryKind::Deep) => "history(deep)",
        }
    }
}

/// One `<data>` entry
#[derive(Debug, Clone, PartialEq)]
pub struct DataEntry {
    pub id: String,
    pub value: Value,
    /// Raw XML of element content, e.g. the `<slots>` block of `#_SLOTS`
    pub content: Option<String>,
}

impl DataEntry {
    /// Skill/engine configuration entries start with `#_`.
    pub fn is_config(&self) -> bool {
        self.id.starts_with("#_")
    }

    /// Id without the `#_` marker
    pub fn config_key(&self) -> &str {
        self.id.strip_prefix("#_").unwrap_or(&self.id)
    }
}

/// Executable content of `<onentry>`, `<onexit>` and `<transition>`
#[derive(Debug, Clone, PartialEq)]
pub enum Executable {
    Raise {
        event: String,
    },
    Send {
        event: String,
        delay: Option<String>,
        id: Option<String>,
    },
    Cancel {
        send_id: String,
    },
    Log {
        label: Option<String>,
        expr: Option<String>,
    },
    Assign {
        location: String,
        expr: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionType {
    External,
    Internal,
}

#[derive(Debug, Clone)]
pub struct TransitionNode {
    pub source: StateIdx,
    /// Event descriptors; empty for eventless transitions
    pub events: Vec<String>,
    pub cond: Option<Condition>,
    pub targets: Vec<StateIdx>,
    /// Target ids as written in the document
    pub target_ids: Vec<String>,
    pub kind: TransitionType,
    pub actions: Vec<Executable>,
}

impl TransitionNode {
    pub fn is_eventless(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_targetless(&self) -> bool {
        self.target_ids.is_empty()
    }

    pub fn matches(&self, event: &str) -> bool {
        self.events.iter().any(|d| descriptor_matches(d, event))
    }
}

/// SCXML event descriptor matching.
///
/// `*` matches everything; `a.b` and `a.b.*` match `a.b` and `a.b.<anything>`.
pub fn descriptor_matches(descriptor: &str, event: &str) -> bool {
    let descriptor = descriptor.trim();
    if descriptor == "*" {
        return true;
    }
    let descriptor = descriptor
        .strip_suffix(".*")
        .unwrap_or(descriptor)
        .trim_end_matches('.');
    if descriptor.is_empty() {
        return false;
    }
    event == descriptor
        || (event.starts_with(descriptor) && event[descriptor.len()..].starts_with('.'))
}

#[derive(Debug, Clone)]
pub struct StateNode {
    pub id: String,
    pub kind: StateKind,
    pub parent: Option<StateIdx>,
    pub children: Vec<StateIdx>,
    pub initial: Vec<StateIdx>,
    pub initial_ids: Vec<String>,
    pub transitions: Vec<TransitionIdx>,
    pub onentry: Vec<Executable>,
    pub onexit: Vec<Executable>,
    pub datamodel: Vec<DataEntry>,
    /// File this state was included from, if any
    pub source_file: Option<String>,
}

impl StateNode {
    pub(crate) fn new(id: String, parent: Option<StateIdx>) -> Self {
        Self {
            id,
            kind: StateKind::Atomic,
            parent,
            children: Vec::new(),
            initial: Vec::new(),
            initial_ids: Vec::new(),
            transitions: Vec::new(),
            onentry: Vec::new(),
            onexit: Vec::new(),
            datamodel: Vec::new(),
            source_file: None,
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, StateKind::Atomic | StateKind::Final)
    }

    pub fn is_compound(&self) -> bool {
        self.kind == StateKind::Compound
    }

    pub fn is_parallel(&self) -> bool {
        self.kind == StateKind::Parallel
    }

    pub fn is_final(&self) -> bool {
        self.kind == StateKind::Final
    }

    pub fn is_history(&self) -> bool {
        matches!(self.kind, StateKind::History(_))
    }
}

/// Parsed behavior: states in document order with `ROOT` first.
#[derive(Debug, Clone)]
pub struct StateChart {
    pub name: Option<String>,
    pub states: Vec<StateNode>,
    pub transitions: Vec<TransitionNode>,
    pub ids: HashMap<String, StateIdx>,
    /// Ids declared more than once; the first declaration wins in `ids`
    pub duplicate_ids: Vec<String>,
}

impl StateChart {
    pub fn state(&self, idx: StateIdx) -> &StateNode {
        &self.states[idx]
    }

    pub fn transition(&self, idx: TransitionIdx) -> &TransitionNode {
        &self.transitions[idx]
    }

    pub fn index_of(&self, id: &str) -> Option<StateIdx> {
        self.ids.get(id).copied()
    }

    pub fn root(&self) -> &StateNode {
        &self.states[ROOT]
    }

    /// All state ids except the root, in document order
    pub fn state_ids(&self) -> Vec<String> {
        self.states
            .iter()
            .skip(1)
            .map(|s| s.id.clone())
            .collect()
    }

    /// `#_` configuration entries of the root datamodel
    pub fn root_config(&self, key: &str) -> Option<&DataEntry> {
        self.root()
            .datamodel
            .iter()
            .find(|d| d.is_config() && d.config_key() == key)
    }

    /// Is `state` a strict descendant of `ancestor`?
    pub fn is_descendant(&self, state: StateIdx, ancestor: StateIdx) -> bool {
        let mut current = self.states[state].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.states[parent].parent;
        }
        false
    }

    /// Ancestors of `state` from its parent upwards, stopping before `stop`.
    /// With `stop = None` the chain ends with `ROOT`.
    pub fn proper_ancestors(&self, state: StateIdx, stop: Option<StateIdx>) -> Vec<StateIdx> {
        let mut result = Vec::new();
        let mut current = self.states[state].parent;
        while let Some(parent) = current {
            if Some(parent) == stop {
                break;
            }
            result.push(parent);
            current = self.states[parent].parent;
        }
        result
    }

    /// Children that are real states (history pseudo-states excluded)
    pub fn child_states(&self, state: StateIdx) -> impl Iterator<Item = StateIdx> + '_ {
        self.states[state]
            .children
            .iter()
            .copied()
            .filter(move |c| !self.states[*c].is_history())
    }
}
