//! Shared helpers for the mock store

use super::MockClusterClient;
use crate::error::ClusterError;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a store, recovering the data if a test panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fail when the whole store is marked unavailable
pub(crate) fn check_available(client: &MockClusterClient) -> Result<(), ClusterError> {
    if lock(&client.faults).unavailable {
        return Err(ClusterError::Unavailable("mock cluster is unavailable".to_string()));
    }
    Ok(())
}

/// Fail when Node lookups are marked failing
pub(crate) fn check_node_lookups(client: &MockClusterClient) -> Result<(), ClusterError> {
    check_available(client)?;
    if lock(&client.faults).node_lookups_fail {
        return Err(ClusterError::Unavailable("mock Node lookups are failing".to_string()));
    }
    Ok(())
}

/// Compare the resourceVersion a write was computed from with the stored one
pub(crate) fn check_resource_version(
    kind: &str,
    name: &str,
    expected: Option<&str>,
    stored: Option<&str>,
) -> Result<(), ClusterError> {
    let Some(expected) = expected else {
        return Err(ClusterError::InvalidRequest(format!("{kind} {name} has no resourceVersion")));
    };
    if Some(expected) != stored {
        return Err(ClusterError::Conflict(format!(
            "{kind} {name} was modified (have {expected}, stored {})",
            stored.unwrap_or("<none>")
        )));
    }
    Ok(())
}
