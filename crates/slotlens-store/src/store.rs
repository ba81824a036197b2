//! The configuration store handle.
//!
//! `ConfigStore` owns the table state behind a mutex; every public
//! operation locks, runs synchronously against the tables, and unlocks on
//! return. One call is one logical transaction: callers observe either no
//! effect or the full effect. Cloning the handle shares the state, so
//! concurrent requests hold their own handle and serialize on the lock,
//! which also serializes draft creation per practice.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use slotlens_core::types::{Appointment, AppointmentId};

use crate::error::{Result, StoreError};
use crate::scheduling::EngineConfig;
use crate::tables::Tables;

#[derive(Clone, Default)]
pub struct ConfigStore {
    inner: Arc<Mutex<Tables>>,
    config: EngineConfig,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            inner: Arc::default(),
            config,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ingests a booked appointment. Appointments are practice-scoped and
    /// read-only to the engine; only the aggregate conditions look at them.
    pub fn put_appointment(&self, appointment: Appointment) -> Result<AppointmentId> {
        let mut tables = self.lock();
        if !tables.practices.contains_key(&appointment.practice_id) {
            return Err(StoreError::NotFound {
                kind: "practice",
                id: appointment.practice_id.to_string(),
            });
        }
        let id = appointment.id.clone();
        tables.appointments.insert(id.clone(), appointment);
        Ok(id)
    }
}
