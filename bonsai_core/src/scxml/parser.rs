//! SCXML document parsing into a [`StateChart`].

use crate::error::{BonsaiError, BonsaiResult};
use crate::scxml::expr::{parse_literal, Condition};
use crate::scxml::model::{
    DataEntry, Executable, HistoryKind, StateChart, StateIdx, StateKind, StateNode,
    TransitionNode, TransitionType, ROOT,
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Where `src` includes are looked up.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// `${NAME}` prefix -> directory
    pub include_mappings: HashMap<String, PathBuf>,
    /// Base for relative includes of inline documents
    pub base_dir: Option<PathBuf>,
}

impl ParseOptions {
    pub fn with_mapping(mut self, name: &str, dir: impl Into<PathBuf>) -> Self {
        self.include_mappings.insert(name.to_string(), dir.into());
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }
}

pub fn parse_str(xml: &str) -> BonsaiResult<StateChart> {
    parse_str_with(xml, &ParseOptions::default())
}

pub fn parse_file(path: impl AsRef<Path>) -> BonsaiResult<StateChart> {
    parse_file_with(path, &ParseOptions::default())
}

pub fn parse_str_with(xml: &str, options: &ParseOptions) -> BonsaiResult<StateChart> {
    let mut builder = Builder::new(options);
    builder.parse_root(xml, None)?;
    Ok(builder.finish())
}

pub fn parse_file_with(path: impl AsRef<Path>, options: &ParseOptions) -> BonsaiResult<StateChart> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|e| {
        BonsaiError::Loading(format!("cannot read '{}': {}", path.display(), e))
    })?;
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    let mut builder = Builder::new(options);
    builder.include_stack.push(canonical.clone());
    builder.parse_root(&xml, Some(&canonical))?;
    Ok(builder.finish())
}

struct Builder<'o> {
    options: &'o ParseOptions,
    states: Vec<StateNode>,
    transitions: Vec<TransitionNode>,
    include_stack: Vec<PathBuf>,
    generated: usize,
}

impl<'o> Builder<'o> {
    fn new(options: &'o ParseOptions) -> Self {
        Self {
            options,
            states: Vec::new(),
            transitions: Vec::new(),
            include_stack: Vec::new(),
            generated: 0,
        }
    }

    fn current_file(&self) -> Option<String> {
        self.include_stack
            .last()
            .map(|p| p.display().to_string())
    }

    fn parse_root(&mut self, xml: &str, file: Option<&Path>) -> BonsaiResult<()> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != "scxml" {
            return Err(BonsaiError::parse(format!(
                "root element must be <scxml>, found <{}>{}",
                root.tag_name().name(),
                file.map(|f| format!(" in {}", f.display())).unwrap_or_default()
            )));
        }

        let name = root.attribute("name").map(str::to_string);
        let mut node = StateNode::new(name.unwrap_or_else(|| "scxml".to_string()), None);
        node.kind = StateKind::Compound;
        node.initial_ids = split_ids(root.attribute("initial"));
        node.source_file = self.current_file();
        self.states.push(node);

        self.parse_children(&doc, root, ROOT)
    }

    fn next_generated_id(&mut self) -> String {
        let id = format!("__state_{}", self.generated);
        self.generated += 1;
        id
    }

    fn parse_children(
        &mut self,
        doc: &roxmltree::Document,
        elem: roxmltree::Node,
        parent: StateIdx,
    ) -> BonsaiResult<()> {
        for child in elem.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "state" | "parallel" | "final" | "history" => {
                    self.parse_state(doc, child, parent)?;
                }
                "initial" => {
                    for t in child.children().filter(|n| n.has_tag_name("transition")) {
                        self.states[parent]
                            .initial_ids
                            .extend(split_ids(t.attribute("target")));
                    }
                }
                "transition" => self.parse_transition(child, parent)?,
                "onentry" => {
                    let actions = self.parse_executables(child)?;
                    self.states[parent].onentry.extend(actions);
                }
                "onexit" => {
                    let actions = self.parse_executables(child)?;
                    self.states[parent].onexit.extend(actions);
                }
                "datamodel" => {
                    let entries = parse_datamodel(doc, child)?;
                    self.states[parent].datamodel.extend(entries);
                }
                other => {
                    tracing::debug!(
                        "Skipping unsupported element <{}> in '{}'",
                        other,
                        self.states[parent].id
                    );
                }
            }
        }
        Ok(())
    }

    fn parse_state(
        &mut self,
        doc: &roxmltree::Document,
        elem: roxmltree::Node,
        parent: StateIdx,
    ) -> BonsaiResult<()> {
        let tag = elem.tag_name().name();
        let id = match elem.attribute("id") {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => self.next_generated_id(),
        };

        let idx = self.states.len();
        let mut node = StateNode::new(id, Some(parent));
        node.kind = match tag {
            "parallel" => StateKind::Parallel,
            "final" => StateKind::Final,
            "history" => match elem.attribute("type") {
                Some("deep") => StateKind::History(HistoryKind::Deep),
                _ => StateKind::History(HistoryKind::Shallow),
            },
            _ => StateKind::Atomic,
        };
        node.initial_ids = split_ids(elem.attribute("initial"));
        node.source_file = self.current_file();
        self.states.push(node);
        self.states[parent].children.push(idx);

        if let Some(src) = elem.attribute("src") {
            self.include(src, idx)?;
        }
        self.parse_children(doc, elem, idx)?;

        if tag == "state" {
            let has_children = self.states[idx]
                .children
                .iter()
                .any(|c| !self.states[*c].is_history());
            if has_children {
                self.states[idx].kind = StateKind::Compound;
            }
        }
        Ok(())
    }

    fn resolve_include(&self, src: &str) -> BonsaiResult<PathBuf> {
        if let Some(rest) = src.strip_prefix("${") {
            let (name, tail) = rest
                .split_once('}')
                .ok_or_else(|| BonsaiError::Loading(format!("malformed include '{}'", src)))?;
            let dir = self.options.include_mappings.get(name).ok_or_else(|| {
                BonsaiError::Loading(format!("unknown include mapping '${{{}}}' in '{}'", name, src))
            })?;
            return Ok(dir.join(tail.trim_start_matches(['/', '\\'])));
        }

        let path = PathBuf::from(src);
        if path.is_absolute() {
            return Ok(path);
        }
        let base = self
            .include_stack
            .last()
            .and_then(|f| f.parent().map(Path::to_path_buf))
            .or_else(|| self.options.base_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(base.join(path))
    }

    fn include(&mut self, src: &str, state: StateIdx) -> BonsaiResult<()> {
        let path = self.resolve_include(src)?;
        let canonical = path.canonicalize().map_err(|e| {
            BonsaiError::Loading(format!(
                "cannot resolve include '{}' of state '{}': {}",
                src, self.states[state].id, e
            ))
        })?;
        if self.include_stack.contains(&canonical) {
            return Err(BonsaiError::Loading(format!(
                "include cycle: '{}' includes itself through '{}'",
                canonical.display(),
                self.states[state].id
            )));
        }

        let xml = std::fs::read_to_string(&canonical)?;
        let doc = roxmltree::Document::parse(&xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != "scxml" {
            return Err(BonsaiError::parse(format!(
                "included document '{}' has no <scxml> root",
                canonical.display()
            )));
        }

        tracing::debug!(
            "Including '{}' into state '{}'",
            canonical.display(),
            self.states[state].id
        );
        if self.states[state].initial_ids.is_empty() {
            self.states[state].initial_ids = split_ids(root.attribute("initial"));
        }

        self.include_stack.push(canonical);
        let result = self.parse_children(&doc, root, state);
        self.include_stack.pop();
        result
    }

    fn parse_transition(&mut self, elem: roxmltree::Node, source: StateIdx) -> BonsaiResult<()> {
        let cond = match elem.attribute("cond") {
            Some(src) if !src.trim().is_empty() => Some(Condition::parse(src).map_err(|e| {
                BonsaiError::parse(format!("state '{}': {}", self.states[source].id, e))
            })?),
            _ => None,
        };
        let kind = match elem.attribute("type") {
            Some("internal") => TransitionType::Internal,
            _ => TransitionType::External,
        };

        let actions = self.parse_executables(elem)?;
        let idx = self.transitions.len();
        self.transitions.push(TransitionNode {
            source,
            events: split_ids(elem.attribute("event")),
            cond,
            targets: Vec::new(),
            target_ids: split_ids(elem.attribute("target")),
            kind,
            actions,
        });
        self.states[source].transitions.push(idx);
        Ok(())
    }

    fn parse_executables(&self, elem: roxmltree::Node) -> BonsaiResult<Vec<Executable>> {
        let mut actions = Vec::new();
        for child in elem.children().filter(|n| n.is_element()) {
            let attr = |name: &str| child.attribute(name).map(str::to_string);
            let required = |name: &str| {
                attr(name).ok_or_else(|| {
                    BonsaiError::parse(format!(
                        "<{}> requires a '{}' attribute",
                        child.tag_name().name(),
                        name
                    ))
                })
            };

            let action = match child.tag_name().name() {
                "raise" => Executable::Raise {
                    event: required("event")?,
                },
                "send" => Executable::Send {
                    event: required("event")?,
                    delay: attr("delay").or_else(|| attr("delayexpr")),
                    id: attr("id"),
                },
                "cancel" => Executable::Cancel {
                    send_id: required("sendid")?,
                },
                "log" => Executable::Log {
                    label: attr("label"),
                    expr: attr("expr"),
                },
                "assign" => Executable::Assign {
                    location: required("location")?,
                    expr: attr("expr")
                        .or_else(|| child.text().map(|t| t.trim().to_string()))
                        .unwrap_or_default(),
                },
                other => {
                    tracing::warn!("Ignoring unsupported executable content <{}>", other);
                    continue;
                }
            };
            actions.push(action);
        }
        Ok(actions)
    }

    fn finish(mut self) -> StateChart {
        let mut ids = HashMap::new();
        let mut duplicate_ids = Vec::new();
        for (idx, state) in self.states.iter().enumerate().skip(1) {
            if ids.contains_key(&state.id) {
                duplicate_ids.push(state.id.clone());
            } else {
                ids.insert(state.id.clone(), idx);
            }
        }

        for transition in &mut self.transitions {
            transition.targets = transition
                .target_ids
                .iter()
                .filter_map(|id| ids.get(id).copied())
                .collect();
        }

        for idx in 0..self.states.len() {
            let state = &self.states[idx];
            let initial: Vec<StateIdx> = if state.initial_ids.is_empty() {
                if state.is_compound() {
                    state
                        .children
                        .iter()
                        .copied()
                        .find(|c| !self.states[*c].is_history())
                        .into_iter()
                        .collect()
                } else {
                    Vec::new()
                }
            } else {
                state
                    .initial_ids
                    .iter()
                    .filter_map(|id| ids.get(id).copied())
                    .collect()
            };
            self.states[idx].initial = initial;
        }

        let name = (self.states[ROOT].id != "scxml").then(|| self.states[ROOT].id.clone());
        StateChart {
            name,
            states: self.states,
            transitions: self.transitions,
            ids,
            duplicate_ids,
        }
    }
}

fn split_ids(attr: Option<&str>) -> Vec<String> {
    attr.map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn parse_datamodel(doc: &roxmltree::Document, elem: roxmltree::Node) -> BonsaiResult<Vec<DataEntry>> {
    let mut entries = Vec::new();
    for data in elem.children().filter(|n| n.has_tag_name("data")) {
        let id = data
            .attribute("id")
            .ok_or_else(|| BonsaiError::parse("<data> requires an 'id' attribute"))?
            .to_string();

        let content = match (data.first_child(), data.last_child()) {
            (Some(first), Some(last)) => {
                let raw = doc.input_text()[first.range().start..last.range().end].trim();
                (!raw.is_empty()).then(|| raw.to_string())
            }
            _ => None,
        };
        let has_elements = data.children().any(|n| n.is_element());

        let value = match (data.attribute("expr"), &content) {
            (Some(expr), _) => parse_literal(expr),
            (None, Some(raw)) if has_elements => Value::String(raw.clone()),
            (None, Some(raw)) => parse_literal(raw),
            (None, None) => Value::Null,
        };
        entries.push(DataEntry { id, value, content });
    }
    Ok(entries)
}
