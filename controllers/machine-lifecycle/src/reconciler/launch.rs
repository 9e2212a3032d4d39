//! Launch observer.
//!
//! Launching the instance is the cloud provider's job; this step only notices
//! that it happened, which is signalled by the provider identity being set.

use super::{Outcome, PassContext, SubReconciler};
use crate::error::ControllerError;
use crds::{ConditionStatus, ConditionType};
use tracing::debug;

pub struct LaunchObserver;

#[async_trait::async_trait]
impl SubReconciler for LaunchObserver {
    fn name(&self) -> &'static str {
        "launch"
    }

    fn owns(&self) -> Option<ConditionType> {
        Some(ConditionType::Launched)
    }

    fn gate(&self, _pass: &PassContext<'_>) -> bool {
        true
    }

    async fn reconcile(&self, pass: &mut PassContext<'_>) -> Result<Outcome, ControllerError> {
        if pass.provider_id().is_some() {
            return Ok(Outcome::condition(ConditionStatus::True, "Launched", ""));
        }
        debug!(machine = %pass.name(), "No provider ID yet, awaiting launch");
        Ok(Outcome::none())
    }
}
