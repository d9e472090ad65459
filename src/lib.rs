//! Shelf application library: the book catalog module and the bootstrap that
//! wires it into the module framework.

pub mod app;
pub mod modules;
pub mod utils;

pub use app::Application;
pub use modules::books::{CatalogError, CatalogService};
