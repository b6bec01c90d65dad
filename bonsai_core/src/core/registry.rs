use crate::core::skill::Skill;
use crate::error::{BonsaiError, BonsaiResult};
use std::collections::BTreeMap;
use std::sync::Arc;

type SkillFactory = Arc<dyn Fn() -> Box<dyn Skill> + Send + Sync>;

/// Maps skill class names (`dialog.Talk`) to constructors.
#[derive(Clone, Default)]
pub struct SkillRegistry {
    factories: BTreeMap<String, SkillFactory>,
}

impl SkillRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with the skills shipped in [`crate::skills`]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::skills::register_builtins(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, class: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Skill> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(class.to_string(), Arc::new(factory))
            .is_some()
        {
            tracing::debug!("Skill class '{}' re-registered", class);
        }
        self
    }

    pub fn register_default<S: Skill + Default + 'static>(&mut self, class: &str) -> &mut Self {
        self.register(class, || Box::new(S::default()))
    }

    /// Registered class name for `class`, trying `prefix + class` first.
    pub fn resolve(&self, prefix: &str, class: &str) -> Option<String> {
        if !prefix.is_empty() {
            let qualified = format!("{}{}", prefix, class);
            if self.factories.contains_key(&qualified) {
                return Some(qualified);
            }
        }
        self.factories
            .contains_key(class)
            .then(|| class.to_string())
    }

    pub fn create(&self, class: &str) -> BonsaiResult<Box<dyn Skill>> {
        self.factories
            .get(class)
            .map(|factory| factory())
            .ok_or_else(|| BonsaiError::StateId(format!("no skill class '{}' registered", class)))
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl std::fmt::Debug for SkillRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillRegistry")
            .field("classes", &self.names())
            .finish()
    }
}
