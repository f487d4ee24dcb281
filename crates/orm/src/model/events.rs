//! Model Events - listeners fired after single-row writes
//!
//! Listeners are keyed by model name and event. They run synchronously, in
//! registration order, after the write has reached the store. Bulk query
//! writes (`Query::update`, `Query::delete`, `Query::insert`) fire nothing.

use super::instance::ModelInstance;
use crate::error::{ModelError, ModelResult};
use dashmap::DashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub type Listener = Arc<dyn Fn(&ModelInstance) + Send + Sync>;

/// Lifecycle points a listener can attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelEvent {
    Created,
    Updated,
    Deleted,
    Restored,
}

impl fmt::Display for ModelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelEvent::Created => write!(f, "created"),
            ModelEvent::Updated => write!(f, "updated"),
            ModelEvent::Deleted => write!(f, "deleted"),
            ModelEvent::Restored => write!(f, "restored"),
        }
    }
}

impl FromStr for ModelEvent {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ModelEvent::Created),
            "updated" => Ok(ModelEvent::Updated),
            "deleted" => Ok(ModelEvent::Deleted),
            "restored" => Ok(ModelEvent::Restored),
            other => Err(ModelError::Configuration(format!("Unexpected event \"{}\"", other))),
        }
    }
}

/// Listeners per (model, event)
#[derive(Default)]
pub struct EventRegistry {
    listeners: DashMap<(String, ModelEvent), Vec<Listener>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, model: &str, event: ModelEvent, listener: Listener) {
        tracing::debug!("Listening for '{}' on model {}", event, model);
        self.listeners
            .entry((model.to_string(), event))
            .or_default()
            .push(listener);
    }

    pub fn has_listeners(&self, model: &str, event: ModelEvent) -> bool {
        self.listeners
            .get(&(model.to_string(), event))
            .map_or(false, |listeners| !listeners.is_empty())
    }

    /// Call every listener of `event` on the instance's model
    pub fn emit(&self, event: ModelEvent, instance: &ModelInstance) {
        let key = (instance.definition().name().to_string(), event);
        // cloned out so listeners may register further listeners
        let listeners = match self.listeners.get(&key) {
            Some(listeners) => listeners.clone(),
            None => return,
        };

        for listener in &listeners {
            listener(instance);
        }
    }

    /// Parse an event name and register a listener for it
    pub fn on_named(&self, model: &str, event: &str, listener: Listener) -> ModelResult<()> {
        self.on(model, event.parse()?, listener);
        Ok(())
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .listeners
            .iter()
            .map(|entry| format!("{}:{}", entry.key().0, entry.key().1))
            .collect();
        f.debug_struct("EventRegistry").field("listeners", &keys).finish()
    }
}
