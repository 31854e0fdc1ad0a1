//! Core traits, layered settings, and the module registry shared by every SHELF crate.

pub mod module;
pub mod registry;
pub mod settings;

pub use module::{Health, InitCtx, Migration, Module};
pub use registry::ModuleRegistry;
