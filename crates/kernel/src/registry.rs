use anyhow::Context;
use std::sync::Arc;

use crate::module::{Health, InitCtx, Migration, Module};

/// Boot order for infrastructure modules. Custom modules always come after these.
const CORE_MODULE_ORDER: &[&str] = &[
    "db",    // Record store connection pool
    "cache", // Cache backend (Redis or local)
];

/// Module registry for managing module lifecycle with core/custom separation
pub struct ModuleRegistry {
    core_modules: Vec<Arc<dyn Module>>,
    custom_modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            core_modules: Vec::new(),
            custom_modules: Vec::new(),
        }
    }

    /// Register an infrastructure module; it is kept sorted by `CORE_MODULE_ORDER`
    pub fn register_core(&mut self, module: Arc<dyn Module>) {
        self.core_modules.push(module);
        self.core_modules.sort_by_key(|m| core_rank(m.name()));
    }

    /// Register an application module; custom modules boot in registration order
    pub fn register_custom(&mut self, module: Arc<dyn Module>) {
        self.custom_modules.push(module);
    }

    /// All registered modules, core first
    pub fn modules(&self) -> Vec<&Arc<dyn Module>> {
        self.core_modules
            .iter()
            .chain(self.custom_modules.iter())
            .collect()
    }

    pub fn get_module(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.modules().into_iter().find(|module| module.name() == name)
    }

    pub fn core_module_count(&self) -> usize {
        self.core_modules.len()
    }

    pub fn custom_module_count(&self) -> usize {
        self.custom_modules.len()
    }

    /// Initialize every module, core modules first
    pub async fn init_all(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            core = self.core_modules.len(),
            custom = self.custom_modules.len(),
            "initializing modules"
        );

        for module in self.modules() {
            tracing::info!(module = module.name(), "initializing module");
            module
                .init(ctx)
                .await
                .with_context(|| format!("failed to initialize module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Start every module, core modules first
    pub async fn start_all(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        for module in self.modules() {
            tracing::info!(module = module.name(), "starting module");
            module
                .start(ctx)
                .await
                .with_context(|| format!("failed to start module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Stop custom modules (reverse order), then core modules (reverse order).
    ///
    /// Every module gets a stop call even if an earlier one failed; the first error is returned.
    pub async fn stop_all(&self) -> anyhow::Result<()> {
        let mut first_error = None;

        for module in self.modules().into_iter().rev() {
            tracing::info!(module = module.name(), "stopping module");
            if let Err(e) = module.stop().await {
                tracing::error!(module = module.name(), error = %e, "module failed to stop");
                first_error.get_or_insert_with(|| {
                    e.context(format!("failed to stop module '{}'", module.name()))
                });
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Readiness of every module, in boot order
    pub async fn health(&self) -> Vec<(&'static str, Health)> {
        let mut report = Vec::with_capacity(self.core_modules.len() + self.custom_modules.len());
        for module in self.modules() {
            report.push((module.name(), module.health().await));
        }
        report
    }

    /// Collect all migrations from all modules, tagged with the owning module name
    pub fn collect_migrations(&self) -> Vec<(String, Migration)> {
        let mut migrations: Vec<(String, Migration)> = self
            .modules()
            .into_iter()
            .flat_map(|module| {
                module
                    .migrations()
                    .into_iter()
                    .map(move |migration| (module.name().to_string(), migration))
            })
            .collect();

        // Sort by module name and migration ID for deterministic ordering
        migrations.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(b.1.id)));

        migrations
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn core_rank(name: &str) -> usize {
    CORE_MODULE_ORDER
        .iter()
        .position(|&known| known == name)
        .unwrap_or(CORE_MODULE_ORDER.len())
}
