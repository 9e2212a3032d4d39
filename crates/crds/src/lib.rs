//! Machine CRD Definitions
//!
//! Kubernetes Custom Resource Definition for the `Machine` resource tracked by
//! the lifecycle controller, plus the condition and quantity types its status
//! is built from.

pub mod conditions;
pub mod labels;
pub mod machine;
pub mod quantity;

pub use conditions::*;
pub use labels::*;
pub use machine::*;
pub use quantity::*;
