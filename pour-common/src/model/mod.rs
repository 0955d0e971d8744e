// pour-common/src/model/mod.rs
pub mod formula;
pub mod manifest;

pub use formula::{FormulaDescriptor, InstallAction, RuntimeDependency, TestCommand, TextTransform};
pub use manifest::{InstallLayout, InstallWarning, InstalledManifest, LinkRecord, TestOutcome};
