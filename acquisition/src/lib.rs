//! Answers "which update package, if any, should this client receive?".
//!
//! The engine is a pure function of a package history snapshot and one
//! update check: normalize and validate the request, resolve the target
//! release from the history, gate staged rollouts per client, and assemble
//! the response. It performs no I/O and keeps no state between calls.

pub mod errors;
pub mod package;
pub mod request;
pub mod resolver;
pub mod response;
pub mod rollout;
pub mod validation;
pub mod version;

#[cfg(test)]
mod testutils;

pub use errors::{AcquisitionError, InvalidRequest};
pub use package::{BlobInfo, HistoryError, Package, PackageHistory};
pub use request::{UpdateCheck, UpdateCheckRequest};
pub use resolver::{NoUpdate, ResolutionOutcome, resolve};
pub use response::{Acquired, RolloutDecision, UpdateCheckResponse, UpdateInfo, update_check};
pub use rollout::{RolloutPercentage, is_selected_for_rollout};
