mod manifest;
mod reconcile;

pub use manifest::{validate, Manifest, Severity};
#[cfg(test)]
pub use manifest::{Flag, Group, ManifestError, Meta};
pub use reconcile::{reconcile, ValidationResult, VersionControl};
