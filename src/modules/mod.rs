pub mod books;

use shelf_kernel::settings::Settings;
use shelf_kernel::ModuleRegistry;

/// Register all project-specific modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, catalog: &books::CatalogService, settings: &Settings) {
    registry.register_custom(books::create_module(
        catalog.clone(),
        settings.catalog.max_upload_bytes,
    ));
}
