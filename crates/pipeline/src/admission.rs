//! Admission control
//!
//! A fixed number of permits guards a resource. Acquisition waits at most a
//! short grace period and then fails instead of queueing, so overload is
//! pushed back to the caller as a "retry later" signal.
//!
//! Permits are RAII guards: dropping an `AdmissionPermit` returns it to the
//! pool, which releases it on every exit path of the guarded region,
//! including early returns, `?` propagation and cancellation.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admission failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("no {resource} permit available within {waited:?}")]
    Timeout { resource: String, waited: Duration },

    #[error("{0} admission pool is closed")]
    Closed(String),
}

/// Fixed-capacity permit pool
#[derive(Clone)]
pub struct AdmissionController {
    resource: String,
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Held permit; returned to the pool on drop
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    /// Return the permit now instead of at scope end
    pub fn release(self) {}
}

impl AdmissionController {
    /// Create a pool with `capacity` permits (at least one)
    pub fn new(resource: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            resource: resource.into(),
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Acquire a permit, waiting at most `grace`
    ///
    /// A free permit is taken immediately even when `grace` is zero.
    pub async fn acquire(&self, grace: Duration) -> Result<AdmissionPermit, AdmissionError> {
        match tokio::time::timeout(grace, Arc::clone(&self.semaphore).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(AdmissionPermit { _permit: permit }),
            Ok(Err(_)) => Err(AdmissionError::Closed(self.resource.clone())),
            Err(_) => {
                tracing::warn!(
                    resource = %self.resource,
                    capacity = self.capacity,
                    grace_ms = grace.as_millis() as u64,
                    "Admission rejected"
                );
                Err(AdmissionError::Timeout {
                    resource: self.resource.clone(),
                    waited: grace,
                })
            },
        }
    }

    /// Acquire a permit, waiting as long as it takes
    ///
    /// Used by collaborators that bound their own concurrency and rely on the
    /// caller's deadline instead of a grace period.
    pub async fn acquire_wait(&self) -> Result<AdmissionPermit, AdmissionError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map(|permit| AdmissionPermit { _permit: permit })
            .map_err(|_| AdmissionError::Closed(self.resource.clone()))
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("resource", &self.resource)
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}
