//! Relation Descriptor - declared relation metadata
//!
//! A descriptor is declared once on its owning model definition and shared
//! read-only by every query. The target model is referenced by name and
//! resolved through the model registry at use, so models may reference each
//! other cyclically.

use super::inference::{foreign_key_for, id_list_key_for, morph_name_for};
use crate::filter::Filter;
use std::fmt;
use std::sync::Arc;

/// Caller supplied filter transformation
pub type FilterFn = Arc<dyn Fn(Filter) -> Filter + Send + Sync>;

/// Relation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    HasOne,
    HasMany,
    MorphOne,
    MorphMany,
    EmbedMany,
}

impl RelationKind {
    /// Check if this relation resolves to at most one row
    pub fn is_single(&self) -> bool {
        matches!(self, RelationKind::HasOne | RelationKind::MorphOne)
    }

    /// Check if this relation carries a type discriminator
    pub fn is_polymorphic(&self) -> bool {
        matches!(self, RelationKind::MorphOne | RelationKind::MorphMany)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::HasOne => write!(f, "HasOne"),
            RelationKind::HasMany => write!(f, "HasMany"),
            RelationKind::MorphOne => write!(f, "MorphOne"),
            RelationKind::MorphMany => write!(f, "MorphMany"),
            RelationKind::EmbedMany => write!(f, "EmbedMany"),
        }
    }
}

/// One declared relation
#[derive(Clone)]
pub struct RelationDescriptor {
    kind: RelationKind,
    name: String,
    owner: String,
    related: String,
    local_key: Option<String>,
    foreign_key: Option<String>,
    morph_name: Option<String>,
    filter: Option<FilterFn>,
}

impl RelationDescriptor {
    fn new(kind: RelationKind, name: impl Into<String>, related: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            owner: String::new(),
            related: related.into(),
            local_key: None,
            foreign_key: None,
            morph_name: None,
            filter: None,
        }
    }

    pub fn has_one(name: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(RelationKind::HasOne, name, related)
    }

    pub fn has_many(name: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(RelationKind::HasMany, name, related)
    }

    pub fn morph_one(name: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(RelationKind::MorphOne, name, related)
    }

    pub fn morph_many(name: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(RelationKind::MorphMany, name, related)
    }

    pub fn embed_many(name: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(RelationKind::EmbedMany, name, related)
    }

    /// Override the owner-side key
    pub fn local_key(mut self, key: impl Into<String>) -> Self {
        self.local_key = Some(key.into());
        self
    }

    /// Override the target-side key
    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    /// Override the polymorphic name (`<name>_id` / `<name>_type`)
    pub fn morph_name(mut self, name: impl Into<String>) -> Self {
        self.morph_name = Some(name.into());
        self
    }

    /// Attach a filter applied whenever this relation is loaded
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Filter) -> Filter + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub(crate) fn with_owner(mut self, owner: &str) -> Self {
        self.owner = owner.to_string();
        self
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Alias used as the output key
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn related(&self) -> &str {
        &self.related
    }

    pub fn attached_filter(&self) -> Option<&FilterFn> {
        self.filter.as_ref()
    }

    /// Owner-side key: `id`, or `<related>_ids` for embedded references
    pub fn get_local_key(&self) -> String {
        if let Some(key) = &self.local_key {
            return key.clone();
        }

        match self.kind {
            RelationKind::EmbedMany => id_list_key_for(&self.related),
            _ => "id".to_string(),
        }
    }

    /// Target-side key: `<owner>_id`, `<morph>_id`, or `id` for embedded references
    pub fn get_foreign_key(&self) -> String {
        if let Some(key) = &self.foreign_key {
            return key.clone();
        }

        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => foreign_key_for(&self.owner),
            RelationKind::MorphOne | RelationKind::MorphMany => {
                format!("{}_id", self.get_morph_name())
            }
            RelationKind::EmbedMany => "id".to_string(),
        }
    }

    pub fn get_morph_name(&self) -> String {
        self.morph_name
            .clone()
            .unwrap_or_else(|| morph_name_for(&self.related))
    }

    /// Discriminator field and value for polymorphic kinds
    pub fn type_discriminator(&self) -> Option<(String, String)> {
        if !self.kind.is_polymorphic() {
            return None;
        }
        Some((format!("{}_type", self.get_morph_name()), self.owner.clone()))
    }
}

impl fmt::Debug for RelationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDescriptor")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("related", &self.related)
            .field("local_key", &self.get_local_key())
            .field("foreign_key", &self.get_foreign_key())
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
