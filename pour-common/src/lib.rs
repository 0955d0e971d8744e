// pour-common/src/lib.rs
pub mod capability;
pub mod config;
pub mod error;
pub mod model;
pub mod version;

// Re-export key types
pub use capability::Environment;
pub use config::Config;
pub use error::{PourError, Result};
pub use model::{FormulaDescriptor, InstallAction, InstalledManifest};
