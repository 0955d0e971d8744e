// pour-core/src/lib.rs
pub mod env;
pub mod fs;
pub mod install;
pub mod keg;
pub mod lock;
pub mod process;
pub mod registry;

pub use env::system_environment;
pub use install::{FormulaInstaller, InstallOptions};
pub use keg::{InstalledKeg, KegRegistry};
pub use lock::InstallLock;
