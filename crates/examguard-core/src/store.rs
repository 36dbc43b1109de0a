//! Persistence boundary for face templates.

use crate::types::FaceTemplate;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(String),
    #[error("stored template for {subject} is corrupt: {reason}")]
    Corrupt { subject: String, reason: String },
}

/// Subject-keyed template storage.
///
/// `save` replaces any existing template wholesale.
pub trait TemplateStore {
    fn load(&self, subject: &str) -> Result<Option<FaceTemplate>, StoreError>;
    fn save(&mut self, subject: &str, template: &FaceTemplate) -> Result<(), StoreError>;
    /// Returns whether a template existed.
    fn clear(&mut self, subject: &str) -> Result<bool, StoreError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    templates: HashMap<String, FaceTemplate>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn load(&self, subject: &str) -> Result<Option<FaceTemplate>, StoreError> {
        Ok(self.templates.get(subject).cloned())
    }

    fn save(&mut self, subject: &str, template: &FaceTemplate) -> Result<(), StoreError> {
        self.templates.insert(subject.to_string(), template.clone());
        Ok(())
    }

    fn clear(&mut self, subject: &str) -> Result<bool, StoreError> {
        Ok(self.templates.remove(subject).is_some())
    }
}
