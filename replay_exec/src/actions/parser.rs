//! Reads and writes action lists as `[name, start, end]` rows

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, error, warn};

use util::rows::RowStore;

use super::{Action, ActionError, ActionList, ActionRegistry};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct ActionListParser<S: RowStore> {
    store: S,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<S: RowStore> ActionListParser<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write every action of the list, replacing the store's content.
    pub fn write(&self, list: &ActionList) -> Result<(), ActionError> {
        if list.is_empty() {
            warn!("Not writing an empty action list");
            return Err(ActionError::EmptyList);
        }

        let rows: Vec<Vec<String>> = list.iter().map(|a| a.to_row()).collect();
        self.store.write(&rows)?;

        debug!("Wrote {} actions", rows.len());

        Ok(())
    }

    /// Read a list from the store, resolving behaviours in `registry`.
    pub fn read(
        &self,
        registry: &ActionRegistry,
        poll_period_ms: u32,
    ) -> Result<ActionList, ActionError> {
        let actions = self
            .store
            .read()?
            .iter()
            .map(|r| Action::from_row(r))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ActionList::new(actions, registry, poll_period_ms))
    }

    /// Read a list from the store, or an empty list if it can't be read.
    pub fn load_or_empty(&self, registry: &ActionRegistry, poll_period_ms: u32) -> ActionList {
        match self.read(registry, poll_period_ms) {
            Ok(l) => l,
            Err(e) => {
                error!("Could not load action list, using an empty one: {}", e);
                ActionList::empty(poll_period_ms)
            }
        }
    }
}
