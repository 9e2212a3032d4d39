//! Machine operations for MockClusterClient

use super::MockClusterClient;
use super::helpers::{check_available, check_resource_version, lock};
use crate::error::ClusterError;
use crds::{Machine, MachineStatus};
use kube::ResourceExt;

pub(crate) fn get_machine(client: &MockClusterClient, name: &str) -> Result<Machine, ClusterError> {
    check_available(client)?;
    lock(&client.machines)
        .get(name)
        .cloned()
        .ok_or_else(|| ClusterError::NotFound(format!("Machine {name} not found")))
}

pub(crate) fn update_machine_status(
    client: &MockClusterClient,
    current: &Machine,
    status: &MachineStatus,
) -> Result<Machine, ClusterError> {
    check_available(client)?;
    let name = current.name_any();
    let mut machines = lock(&client.machines);
    let stored = machines
        .get_mut(&name)
        .ok_or_else(|| ClusterError::NotFound(format!("Machine {name} not found")))?;

    // An injected conflict behaves like a concurrent writer getting there first
    {
        let mut faults = lock(&client.faults);
        if faults.status_conflicts > 0 {
            faults.status_conflicts -= 1;
            stored.metadata.resource_version = Some(client.next_resource_version());
        }
    }

    check_resource_version(
        "Machine",
        &name,
        current.metadata.resource_version.as_deref(),
        stored.metadata.resource_version.as_deref(),
    )?;

    stored.status = Some(status.clone());
    stored.metadata.resource_version = Some(client.next_resource_version());
    lock(&client.counters).machine_status_updates += 1;
    Ok(stored.clone())
}
