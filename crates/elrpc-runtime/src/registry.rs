//! Mapping `full_method_id -> Handler` (spec §4.E). Populated at setup
//! time via [`Registry::insert`] and read-only afterward; no locking is
//! needed because the registry is finalized before [`crate::Runtime`]
//! spawns its reader task.

use std::collections::HashMap;

use crate::handler::{full_method_id, Handler};

#[derive(Default)]
pub struct Registry {
    handlers: HashMap<u64, Box<dyn Handler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module_id: u32, method_id: u32, handler: impl Handler + 'static) {
        self.handlers
            .insert(full_method_id(module_id, method_id), Box::new(handler));
    }

    pub fn get(&self, module_id: u32, method_id: u32) -> Option<&dyn Handler> {
        self.handlers
            .get(&full_method_id(module_id, method_id))
            .map(|h| h.as_ref())
    }
}
