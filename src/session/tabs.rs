//! Tab collection operations. Each operation either applies completely or
//! is rejected without touching the state.

use thiserror::Error;

use super::state::{SessionState, Tab, TabId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TabRejection {
    #[error("the last remaining tab cannot be removed")]
    LastTab,
    #[error("no tab with id {0}")]
    NotFound(TabId),
    #[error("tab label cannot be empty")]
    EmptyLabel,
    #[error("'{0}' is not a hex colour")]
    InvalidColor(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub removed: Tab,
    pub index: usize,
    /// Set when the removed tab was active and another tab took its place.
    pub activated: Option<TabId>,
}

impl SessionState {
    /// Appends a fresh empty tab labelled `Note N` and makes it active.
    pub fn add_tab(&mut self) -> TabId {
        let id = self.fresh_id();
        let label = format!("Note {}", self.tabs.len() + 1);
        self.tabs.push(Tab::new(id.clone(), label));
        self.active_tab_id = Some(id.clone());
        id
    }

    /// Removes a tab. When the active tab goes, the tab now at the same
    /// position becomes active, or the new last tab if it was at the end.
    pub fn remove_tab(&mut self, id: &TabId) -> Result<Removal, TabRejection> {
        if self.tabs.len() <= 1 {
            return Err(TabRejection::LastTab);
        }
        let index = self
            .position(id)
            .ok_or_else(|| TabRejection::NotFound(id.clone()))?;
        let removed = self.tabs.remove(index);
        self.retired_ids.insert(removed.id.clone());

        let activated = if self.active_tab_id.as_ref() == Some(id) {
            let next = &self.tabs[index.min(self.tabs.len() - 1)];
            self.active_tab_id = Some(next.id.clone());
            Some(next.id.clone())
        } else {
            None
        };

        Ok(Removal {
            removed,
            index,
            activated,
        })
    }

    pub fn rename_tab(&mut self, id: &TabId, label: &str) -> Result<(), TabRejection> {
        let label = label.trim();
        if label.is_empty() {
            return Err(TabRejection::EmptyLabel);
        }
        let tab = self
            .tabs
            .iter_mut()
            .find(|tab| &tab.id == id)
            .ok_or_else(|| TabRejection::NotFound(id.clone()))?;
        tab.label = label.to_string();
        Ok(())
    }

    pub fn set_active(&mut self, id: &TabId) -> Result<(), TabRejection> {
        if self.position(id).is_none() {
            return Err(TabRejection::NotFound(id.clone()));
        }
        self.active_tab_id = Some(id.clone());
        Ok(())
    }

    /// Tab ids relative to the active one, wrapping at both ends.
    pub fn neighbour(&self, delta: isize) -> Option<&TabId> {
        let len = self.tabs.len() as isize;
        if len == 0 {
            return None;
        }
        let current = self.active_index().unwrap_or(0) as isize;
        let idx = (current + delta).rem_euclid(len) as usize;
        Some(&self.tabs[idx].id)
    }

    fn fresh_id(&self) -> TabId {
        loop {
            let candidate = TabId::generate();
            if self.position(&candidate).is_none() && !self.retired_ids.contains(&candidate) {
                return candidate;
            }
        }
    }
}
