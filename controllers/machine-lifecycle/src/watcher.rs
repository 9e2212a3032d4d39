//! Kubernetes resource watchers.
//!
//! Machines are reconciled through `kube_runtime::Controller`. Node events are
//! mapped back to the Machines they concern through the controller's Machine
//! store, so a Node becoming Ready or losing a taint triggers a pass without
//! waiting for the requeue timer.
//!
//! A separate Node reflector feeds the cluster client's provider-ID lookups.

use crate::backoff::FibonacciBackoff;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconcile_helpers::machine_matches_node;
use crate::reconciler::{ReconcileResult, Reconciler};
use crds::Machine;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client, ResourceExt};
use kube_runtime::reflector::{self, ObjectRef, Store};
use kube_runtime::{Controller, WatchStreamExt, watcher, controller::{Action, Config as RuntimeConfig}};
use std::future::Future;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Backoff state for a Machine
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_seconds, max_seconds),
            error_count: 0,
        }
    }
}

/// Context handed to every reconcile and error-policy call.
pub struct Dispatcher {
    reconciler: Arc<Reconciler>,
    backoff_min_seconds: u64,
    backoff_max_seconds: u64,
    /// Error tracking per Machine name
    backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl Dispatcher {
    pub fn new(reconciler: Arc<Reconciler>, config: &ControllerConfig) -> Self {
        Self {
            reconciler,
            backoff_min_seconds: config.error_backoff_min_seconds,
            backoff_max_seconds: config.error_backoff_max_seconds,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Next retry delay for a failing Machine, with its consecutive error count
    fn next_backoff(&self, name: &str) -> (std::time::Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(name.to_string())
                    .or_insert_with(|| BackoffState::new(self.backoff_min_seconds, self.backoff_max_seconds));
                state.error_count += 1;
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using minimum backoff", e);
                (std::time::Duration::from_secs(self.backoff_min_seconds.max(1)), 0)
            }
        }
    }

    /// Forget the error history of a Machine after a successful pass
    fn reset_backoff(&self, name: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(name);
        }
    }
}

async fn reconcile(machine: Arc<Machine>, ctx: Arc<Dispatcher>) -> Result<Action, ControllerError> {
    let name = machine.name_any();
    debug!(machine = %name, "Reconciling Machine");
    let result = ctx.reconciler.reconcile(&name).await?;
    ctx.reset_backoff(&name);
    Ok(match result {
        ReconcileResult::Done => Action::await_change(),
        ReconcileResult::RequeueAfter(delay) => Action::requeue(delay),
    })
}

fn error_policy(machine: Arc<Machine>, error: &ControllerError, ctx: Arc<Dispatcher>) -> Action {
    let name = machine.name_any();
    let (delay, error_count) = ctx.next_backoff(&name);
    error!(
        machine = %name,
        error = %error,
        error_count,
        retry_in = ?delay,
        "Reconciliation failed"
    );
    Action::requeue(delay)
}

/// Machines a Node event should wake up.
pub fn machines_for_node(machines: &[Arc<Machine>], node: &Node) -> Vec<ObjectRef<Machine>> {
    machines
        .iter()
        .filter(|machine| machine_matches_node(machine, node))
        .map(|machine| ObjectRef::from_obj(machine.as_ref()))
        .collect()
}

/// Node store for provider-ID lookups, and the future that keeps it current.
pub fn node_reflector(node_api: Api<Node>) -> (Store<Node>, impl Future<Output = ()> + Send + 'static) {
    let (store, writer) = reflector::store::<Node>();
    let driver = reflector::reflector(writer, watcher::watcher(node_api, watcher::Config::default()))
        .default_backoff()
        .touched_objects()
        .for_each(|res| async move {
            if let Err(e) = res {
                warn!("Node cache watch error: {}", e);
            }
        });
    (store, driver)
}

/// Watches Machines and Nodes and dispatches reconciliation.
pub struct Watcher {
    machine_api: Api<Machine>,
    node_api: Api<Node>,
    dispatcher: Arc<Dispatcher>,
    concurrency: u16,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(client: Client, reconciler: Arc<Reconciler>, config: &ControllerConfig) -> Self {
        Self {
            machine_api: Api::all(client.clone()),
            node_api: Api::all(client),
            dispatcher: Arc::new(Dispatcher::new(reconciler, config)),
            concurrency: config.concurrency,
        }
    }

    /// Runs the Machine controller until a shutdown signal arrives.
    pub async fn watch_machines(self) -> Result<(), ControllerError> {
        info!(concurrency = self.concurrency, "Starting Machine watcher");

        let controller = Controller::new(self.machine_api, watcher::Config::default());
        let store = controller.store();

        controller
            .watches(self.node_api, watcher::Config::default(), move |node: Node| {
                machines_for_node(&store.state(), &node)
            })
            .with_config(RuntimeConfig::default().concurrency(self.concurrency))
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.dispatcher)
            .for_each(|res| async move {
                match res {
                    Ok((machine, _)) => debug!(machine = %machine.name, "Reconciled"),
                    Err(e) => warn!("Controller error: {}", e),
                }
            })
            .await;

        info!("Machine watcher stopped");
        Ok(())
    }
}
