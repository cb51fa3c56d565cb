//! Template Engine
//!
//! Loads `.j2` templates from a root directory, compiles each one once and
//! renders it against any serializable value. Compiled templates live in a
//! `TemplateCache` that callers construct and may share between engines.
//!
//! Every failure below the name/data checks surfaces as `AppError::Render`
//! with the underlying `TemplateError` attached as its source.

use crate::error::{invalid_argument, AppError, AppResult, TemplateError};
use minijinja::Environment;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

/// File extension of template files
pub const TEMPLATE_EXTENSION: &str = "j2";

type Compiled = Arc<Environment<'static>>;

/// Compiled templates keyed by normalized name.
///
/// Each name owns a `OnceCell`, so concurrent first renders of the same
/// template parse it exactly once while other names proceed independently.
#[derive(Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<String, Arc<OnceCell<Compiled>>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, name: &str) -> Arc<OnceCell<Compiled>> {
        if let Some(cell) = self.entries.read().await.get(name) {
            return cell.clone();
        }
        self.entries
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Forget a slot whose compilation failed, unless another caller has
    /// since filled or replaced it
    async fn discard_failed(&self, name: &str, slot: &Arc<OnceCell<Compiled>>) {
        let mut entries = self.entries.write().await;
        let stale = entries
            .get(name)
            .is_some_and(|cell| Arc::ptr_eq(cell, slot) && !cell.initialized());
        if stale {
            entries.remove(name);
        }
    }

    /// Number of successfully compiled templates
    pub async fn cached_count(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    /// Drop every compiled template
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

pub struct TemplateEngine {
    root: PathBuf,
    cache: Arc<TemplateCache>,
}

impl TemplateEngine {
    /// Engine with its own private cache
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_cache(root, Arc::new(TemplateCache::new()))
    }

    pub fn with_cache(root: impl Into<PathBuf>, cache: Arc<TemplateCache>) -> Self {
        Self {
            root: root.into(),
            cache,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    /// Render template `name` with `data`.
    ///
    /// Identical `(name, data)` pairs always produce identical output,
    /// whether or not the template was already cached.
    pub async fn render<T: Serialize + ?Sized>(&self, name: &str, data: &T) -> AppResult<String> {
        let name = normalize_name(name)?;
        let context = serde_json::to_value(data).map_err(|e| render_error(&name, TemplateError::Data(e)))?;
        if context.is_null() {
            return Err(invalid_argument(format!(
                "Render data for template '{}' must not be null",
                name
            )));
        }

        let env = self.compiled(&name).await?;
        let template = env
            .get_template(&name)
            .map_err(|e| render_error(&name, TemplateError::Evaluation(e)))?;
        template
            .render(&context)
            .map_err(|e| render_error(&name, TemplateError::Evaluation(e)))
    }

    /// Compile `name` ahead of first use
    pub async fn preload_template(&self, name: &str) -> AppResult<()> {
        let name = normalize_name(name)?;
        self.compiled(&name).await?;
        Ok(())
    }

    /// Compile every template under the root, stopping at the first failure.
    /// Returns the number of templates loaded.
    pub async fn preload_all(&self) -> AppResult<usize> {
        let mut names = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let is_template = path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(TEMPLATE_EXTENSION));
                if !is_template {
                    continue;
                }
                if let Ok(relative) = path.with_extension("").strip_prefix(&self.root) {
                    let name: Vec<_> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    names.push(name.join("/"));
                }
            }
        }

        names.sort();
        for name in &names {
            self.preload_template(name).await?;
        }

        info!("Preloaded {} templates from {}", names.len(), self.root.display());
        Ok(names.len())
    }

    /// Drop all compiled templates; the next render reads from disk again
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        debug!("Template cache cleared");
    }

    async fn compiled(&self, name: &str) -> AppResult<Compiled> {
        let slot = self.cache.slot(name).await;
        if let Some(env) = slot.get() {
            debug!("Template cache hit: {}", name);
            return Ok(env.clone());
        }

        match slot.get_or_try_init(|| self.compile(name)).await {
            Ok(env) => Ok(env.clone()),
            Err(e) => {
                self.cache.discard_failed(name, &slot).await;
                Err(render_error(name, e))
            }
        }
    }

    async fn compile(&self, name: &str) -> Result<Compiled, TemplateError> {
        let path = self.template_path(name);
        let source = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TemplateError::NotFound { path: path.clone(), source: e }
            } else {
                TemplateError::Read { path: path.clone(), source: e }
            }
        })?;

        let mut env = Environment::new();
        // Includes and imports resolve relative to the template root
        env.set_loader(minijinja::path_loader(&self.root));
        env.add_template_owned(name.to_string(), source)
            .map_err(TemplateError::Syntax)?;

        debug!("Compiled template {} from {}", name, path.display());
        Ok(Arc::new(env))
    }

    fn template_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, TEMPLATE_EXTENSION))
    }
}

/// Trim, drop a trailing `.j2` (any case) and refuse names that escape the root
fn normalize_name(name: &str) -> AppResult<String> {
    let trimmed = name.trim().replace('\\', "/");
    let suffix = format!(".{}", TEMPLATE_EXTENSION);
    let split = trimmed.len().saturating_sub(suffix.len());
    let stem = match (trimmed.get(..split), trimmed.get(split..)) {
        (Some(stem), Some(ext)) if ext.eq_ignore_ascii_case(&suffix) => stem,
        _ => trimmed.as_str(),
    };

    if stem.is_empty() {
        return Err(invalid_argument("Template name must not be empty"));
    }

    let path = Path::new(stem);
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || stem.starts_with('/') {
        return Err(invalid_argument(format!(
            "Template name '{}' must be relative to the template root",
            name
        )));
    }

    Ok(stem.to_string())
}

fn render_error(name: &str, source: TemplateError) -> AppError {
    AppError::Render {
        template: name.to_string(),
        source,
    }
}
