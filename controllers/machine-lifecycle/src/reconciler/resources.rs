//! Requested versus observed resources.
//!
//! A Node has registered a resource once it reports that name with any
//! parseable quantity, zero included. Sufficiency is the scheduler's concern.

use crds::{QuantityValue, ResourceList};

/// Outcome of comparing requested resources with what a Node reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceComparison {
    /// Requested names the Node does not report, sorted
    pub missing: Vec<String>,
}

impl ResourceComparison {
    /// True when every positive request is reported.
    pub fn registered(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compare requests with an observed resource list.
///
/// Only strictly positive requests count; names are treated uniformly.
pub fn compare(requested: &ResourceList, observed: &ResourceList) -> ResourceComparison {
    let missing = requested
        .iter()
        .filter(|(_, quantity)| quantity.value().is_ok_and(QuantityValue::is_positive))
        .filter(|(name, _)| !observed.get(*name).is_some_and(|q| q.value().is_ok()))
        .map(|(name, _)| name.clone())
        .collect();
    ResourceComparison { missing }
}

/// Names of requests that are negative or cannot be parsed.
pub fn validate_requests(requested: &ResourceList) -> Result<(), Vec<String>> {
    let invalid: Vec<String> = requested
        .iter()
        .filter(|(_, quantity)| !quantity.value().is_ok_and(|v| !v.is_negative()))
        .map(|(name, _)| name.clone())
        .collect();
    if invalid.is_empty() { Ok(()) } else { Err(invalid) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::resources;

    #[test]
    fn test_all_requested_present() {
        let requested = resources(&[("cpu", "2"), ("memory", "50Mi"), ("pods", "5")]);
        let observed = resources(&[("cpu", "10"), ("memory", "100Mi"), ("pods", "110")]);
        assert!(compare(&requested, &observed).registered());
    }

    #[test]
    fn test_presence_not_sufficiency() {
        let requested = resources(&[("cpu", "64")]);
        let observed = resources(&[("cpu", "0")]);
        assert!(compare(&requested, &observed).registered());
    }

    #[test]
    fn test_missing_names_are_sorted() {
        let requested = resources(&[("nvidia.com/gpu", "1"), ("cpu", "1"), ("example.com/fpga", "2")]);
        let observed = resources(&[("cpu", "4")]);
        let comparison = compare(&requested, &observed);
        assert!(!comparison.registered());
        assert_eq!(comparison.missing, vec!["example.com/fpga", "nvidia.com/gpu"]);
    }

    #[test]
    fn test_zero_requests_are_ignored() {
        let requested = resources(&[("nvidia.com/gpu", "0")]);
        assert!(compare(&requested, &ResourceList::new()).registered());
    }

    #[test]
    fn test_unparseable_observed_quantity_is_missing() {
        let requested = resources(&[("cpu", "1")]);
        let observed = resources(&[("cpu", "lots")]);
        assert_eq!(compare(&requested, &observed).missing, vec!["cpu"]);
    }

    #[test]
    fn test_validate_requests() {
        assert_eq!(validate_requests(&resources(&[("cpu", "2"), ("pods", "0")])), Ok(()));
        assert_eq!(
            validate_requests(&resources(&[("cpu", "-1"), ("memory", "1Gi"), ("pods", "many")])),
            Err(vec!["cpu".to_string(), "pods".to_string()])
        );
    }
}
