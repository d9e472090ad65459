//! Process bootstrap: connect the database, register modules, run migrations,
//! and drive the module lifecycle around the HTTP server.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use shelf_db::{Database, DbModule};
use shelf_kernel::settings::Settings;
use shelf_kernel::{InitCtx, ModuleRegistry};

use crate::modules;
use crate::modules::books::CatalogService;

/// A fully initialized application. Owns the database handle and the module
/// registry for the lifetime of the process.
pub struct Application {
    settings: Settings,
    database: Database,
    registry: ModuleRegistry,
    catalog: CatalogService,
}

impl Application {
    /// Connect, register modules, initialize them, apply pending migrations,
    /// and start them.
    pub async fn build(settings: Settings) -> anyhow::Result<Self> {
        let database = Database::connect(&settings.database)
            .await
            .context("failed to open catalog database")?;
        Self::with_database(settings, database).await
    }

    /// Same as [`Application::build`] over an already opened database.
    pub async fn with_database(settings: Settings, database: Database) -> anyhow::Result<Self> {
        let catalog = CatalogService::from_settings(database.pool().clone(), &settings.catalog);

        let mut registry = ModuleRegistry::new();
        registry.register_core(Arc::new(DbModule::new(database.clone())));
        modules::register_all(&mut registry, &catalog, &settings);

        let ctx = InitCtx {
            settings: &settings,
        };
        registry.init_all(&ctx).await?;

        let applied = database
            .apply_migrations(&registry.collect_migrations())
            .await
            .context("failed to apply migrations")?;
        tracing::info!(applied, "migrations complete");

        registry.start_all(&ctx).await?;

        tracing::info!(
            core = registry.core_module_count(),
            custom = registry.custom_module_count(),
            "shelf-app bootstrap complete"
        );

        Ok(Self {
            settings,
            database,
            registry,
            catalog,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    /// The complete HTTP router, middleware included.
    pub fn router(&self) -> Router {
        shelf_http::build_router(&self.registry, &self.settings)
    }

    /// Serve HTTP until Ctrl-C, then stop every module.
    pub async fn serve(self) -> anyhow::Result<()> {
        let served = shelf_http::start_server(&self.registry, &self.settings).await;
        self.shutdown().await?;
        served
    }

    /// Stop modules in reverse order; the `db` module closes the pool last.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.registry.stop_all().await?;
        tracing::info!("shelf-app stopped");
        Ok(())
    }
}
