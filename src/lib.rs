//! SHELF application library: the catalog and auth modules plus the bootstrap
//! that wires them onto the module framework.

pub mod bootstrap;
pub mod modules;

pub use bootstrap::{build, serve, Application};
