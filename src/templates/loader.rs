//! Template lookup across app roots.
//!
//! A name is first tried as `<app>/<path>` against the named app's root, then
//! as a plain path against every root in search order.

use std::path::{Path, PathBuf};

use super::error::{TemplateError, TemplateResult};
use crate::config::TemplatesConfig;

/// One app's template root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRoot {
    pub name: String,
    pub path: PathBuf,
}

/// Resolves template names to sources on disk.
#[derive(Debug, Clone, Default)]
pub struct TemplateLoader {
    roots: Vec<AppRoot>,
}

impl TemplateLoader {
    pub fn new(roots: Vec<AppRoot>) -> Self {
        Self { roots }
    }

    /// Build the search path.
    ///
    /// Explicit `template_apps` are used as given; otherwise installed apps
    /// are searched in reverse install order. The base app is appended when
    /// not already present. Names without a configured root are skipped.
    pub fn from_config(config: &TemplatesConfig) -> Self {
        let mut order: Vec<&str> = if config.template_apps.is_empty() {
            config.apps.iter().rev().map(|app| app.name.as_str()).collect()
        } else {
            config.template_apps.iter().map(String::as_str).collect()
        };

        if !order.contains(&config.base_app.as_str()) {
            order.push(config.base_app.as_str());
        }

        let roots = order
            .into_iter()
            .filter_map(|name| {
                let root = config.apps.iter().find(|app| app.name == name);
                if root.is_none() {
                    tracing::debug!(app = name, "No template root configured for app");
                }
                root.map(|app| AppRoot {
                    name: app.name.clone(),
                    path: app.path.clone(),
                })
            })
            .collect();

        Self { roots }
    }

    /// Apps in the order they are searched.
    pub fn search_order(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(|root| root.name.as_str())
    }

    /// Read the source of `name`.
    pub fn get_source(&self, name: &str) -> TemplateResult<String> {
        let segments = split_template_path(name)?;
        let not_found = || TemplateError::NotFound(name.to_string());

        if let Some((prefix, rest)) = segments.split_first()
            && !rest.is_empty()
            && let Some(root) = self.roots.iter().find(|root| root.name == *prefix)
            && let Some(source) = read_if_exists(&join(&root.path, rest))?
        {
            tracing::trace!(template = name, app = %root.name, "Resolved prefixed template");
            return Ok(source);
        }

        for root in &self.roots {
            if let Some(source) = read_if_exists(&join(&root.path, &segments))? {
                tracing::trace!(template = name, app = %root.name, "Resolved template");
                return Ok(source);
            }
        }

        Err(not_found())
    }
}

/// Split a template name into path segments.
///
/// Absolute names and names containing `..` are never resolved. Empty and
/// `.` segments are dropped.
pub fn split_template_path(name: &str) -> TemplateResult<Vec<&str>> {
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(TemplateError::NotFound(name.to_string()));
    }

    let mut segments = Vec::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            ".." => return Err(TemplateError::NotFound(name.to_string())),
            "" | "." => continue,
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(TemplateError::NotFound(name.to_string()));
    }
    Ok(segments)
}

fn join(root: &Path, segments: &[&str]) -> PathBuf {
    segments.iter().fold(root.to_path_buf(), |path, s| path.join(s))
}

fn read_if_exists(path: &Path) -> TemplateResult<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    std::fs::read_to_string(path)
        .map(Some)
        .map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })
}
