//! Temporary mod set operations.
//!
//! Set membership changes are queued for the executor like any other
//! mutation. The manager tracks whether the host has a set open so that an
//! `add` right after `init` is accepted before the opening task has run.

use std::sync::atomic::Ordering;

use modsync_core::{ModError, ModId, ModResult};

use super::ModManager;
use crate::ops::Precheck;
use crate::temp_mods;

fn valid_ids(ids: &[ModId]) -> ModResult<()> {
    match ids.iter().find(|id| !id.is_valid()) {
        Some(id) => Err(ModError::InvalidModId { id: id.get() }),
        None => Ok(()),
    }
}

impl ModManager {
    fn check_temp_request(&self, ids: &[ModId]) -> ModResult<()> {
        self.engine.store.query(|state| {
            Precheck::new(state).initialized()?.management_enabled()?;
            valid_ids(ids)
        })
    }

    /// Open a temporary mod set with `ids`; an open set gains them.
    pub fn init_temp_mod_set(&self, ids: &[ModId]) -> ModResult<()> {
        self.check_temp_request(ids)?;
        let ids = ids.to_vec();
        self.push_mutation(move |engine| async move {
            temp_mods::open(&mut engine.store.write(), &ids);
        })?;
        self.temp_set_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn add_to_temp_mod_set(&self, ids: &[ModId]) -> ModResult<()> {
        self.check_temp_request(ids)?;
        self.require_temp_set()?;
        let ids = ids.to_vec();
        self.push_mutation(move |engine| async move {
            let mut state = engine.store.write();
            if temp_mods::require_open(&state).is_ok() {
                temp_mods::add(&mut state, &ids);
            }
        })
    }

    /// Remove `ids` from the set; their temporary installs are deleted.
    pub fn remove_from_temp_mod_set(&self, ids: &[ModId]) -> ModResult<()> {
        self.check_temp_request(ids)?;
        self.require_temp_set()?;
        let ids = ids.to_vec();
        self.push_mutation(move |engine| async move {
            temp_mods::remove(&mut engine.store.write(), &ids);
        })
    }

    /// Close the set and delete every temporary install.
    pub fn close_temp_mod_set(&self) -> ModResult<()> {
        self.check_temp_request(&[])?;
        self.require_temp_set()?;
        self.push_mutation(|engine| async move {
            temp_mods::close(&mut engine.store.write());
        })?;
        self.temp_set_requested.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn require_temp_set(&self) -> ModResult<()> {
        if self.temp_set_requested.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ModError::TempModSetNotInitialized)
        }
    }
}
