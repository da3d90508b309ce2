//! Request handlers, one per resource type
//!
//! Each handler validates through the mapper, then calls the connector.
//! Handlers never see HTTP types; the http layer shapes their results.

pub mod resource;

use std::collections::BTreeMap;

use crate::models::{NullPolicy, SchemaRegistry};
use crate::storage::Connector;

pub use resource::{HandlerError, ResourceHandler};

/// Handlers for every registered resource type
#[derive(Clone)]
pub struct Resources {
    handlers: BTreeMap<&'static str, ResourceHandler>,
}

impl Resources {
    pub fn new(registry: &SchemaRegistry, connector: &Connector, nulls: NullPolicy) -> Self {
        let handlers = registry
            .iter()
            .map(|schema| {
                (
                    schema.name,
                    ResourceHandler::new(schema.clone(), connector.clone(), nulls),
                )
            })
            .collect();
        Self { handlers }
    }

    pub fn get(&self, name: &str) -> Option<&ResourceHandler> {
        self.handlers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }
}
