use super::WorkingMemory;
use crate::error::{BonsaiError, BonsaiResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Typed handle to one path of the working memory.
///
/// Skills obtain slots from their configurator and never see raw paths.
pub struct MemorySlot<T> {
    memory: WorkingMemory,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for MemorySlot<T> {
    fn clone(&self) -> Self {
        Self {
            memory: self.memory.clone(),
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for MemorySlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySlot")
            .field("path", &self.path)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> MemorySlot<T> {
    pub fn new(memory: WorkingMemory, path: &str) -> Self {
        Self {
            memory,
            path: WorkingMemory::normalize_path(path),
            _marker: PhantomData,
        }
    }

    pub fn memorize(&self, value: &T) -> BonsaiResult<()> {
        self.memory.write(&self.path, value)
    }

    pub fn recall(&self) -> BonsaiResult<Option<T>> {
        self.memory.read(&self.path)
    }

    pub fn forget(&self) {
        self.memory.remove(&self.path);
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// One `<slot key=".." state=".." xpath=".."/>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    pub key: String,
    /// `None` applies the mapping to every state.
    pub state: Option<String>,
    pub path: String,
}

/// Resolves `(state id, slot key)` pairs to working memory paths.
#[derive(Debug, Clone, Default)]
pub struct SlotMapping {
    entries: Vec<SlotEntry>,
}

impl SlotMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the XML content of a `#_SLOTS` datamodel entry.
    pub fn from_xml(xml: &str) -> BonsaiResult<Self> {
        let mut mapping = Self::new();
        if xml.trim().is_empty() {
            return Ok(mapping);
        }

        // Content may hold several top-level elements; wrap so roxmltree sees one root.
        let wrapped = format!("<root>{}</root>", xml);
        let doc = roxmltree::Document::parse(&wrapped)
            .map_err(|e| BonsaiError::parse(format!("Invalid #_SLOTS content: {}", e)))?;

        for slot in doc.descendants().filter(|n| n.has_tag_name("slot")) {
            let key = slot
                .attribute("key")
                .ok_or_else(|| BonsaiError::parse("<slot> without key attribute"))?;
            let path = slot
                .attribute("xpath")
                .or_else(|| slot.attribute("path"))
                .ok_or_else(|| {
                    BonsaiError::parse(format!("<slot key=\"{}\"> without xpath attribute", key))
                })?;
            mapping.insert(key, slot.attribute("state"), path);
        }

        Ok(mapping)
    }

    pub fn insert(&mut self, key: &str, state: Option<&str>, path: &str) {
        self.entries.push(SlotEntry {
            key: key.to_string(),
            state: state.map(str::to_string),
            path: WorkingMemory::normalize_path(path),
        });
    }

    /// State-specific entries win over global ones.
    pub fn resolve(&self, state: &str, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key && e.state.as_deref() == Some(state))
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|e| e.key == key && e.state.is_none())
            })
            .map(|e| e.path.as_str())
    }

    pub fn entries(&self) -> &[SlotEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
