use async_trait::async_trait;
use axum::Router;

use crate::settings::Settings;

/// Shared state handed to every lifecycle hook.
pub struct InitCtx<'a> {
    pub settings: &'a Settings,
}

/// A forward-only SQL script owned by one module.
///
/// The pair `(module name, id)` is recorded once the script has run, so an id
/// must never be reused for different SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub id: &'static str,
    pub up: &'static str,
}

impl Migration {
    pub const fn new(id: &'static str, up: &'static str) -> Self {
        Self { id, up }
    }
}

/// A unit of the application: routes, schema, and lifecycle hooks.
///
/// The registry drives hooks in this order: `init`, pending `migrations`,
/// `start`, then `stop` at shutdown.
#[async_trait]
pub trait Module: Sync + Send {
    /// Unique name, also the namespace of the module's migration ids
    fn name(&self) -> &'static str;

    /// Mount point of [`Module::routes`]. Defaults to `/api/{name}`;
    /// `/` merges the routes at the site root.
    fn base_path(&self) -> String {
        format!("/api/{}", self.name())
    }

    /// Validate settings and reach external dependencies. Runs before any
    /// migration, so the schema may not exist yet.
    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
    }

    /// OpenAPI fragment (`paths` and `components`) merged into `/docs/openapi.json`.
    /// Paths are relative to [`Module::base_path`].
    fn openapi(&self) -> Option<serde_json::Value> {
        None
    }

    /// Schema scripts, applied in id order
    fn migrations(&self) -> Vec<Migration> {
        vec![]
    }

    /// Runs once the schema is current.
    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release resources at shutdown.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
