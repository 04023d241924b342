//! Template search path configuration.
//!
//! Each installed app contributes one template root. Apps are listed in
//! install order; the loader searches them in reverse so later apps override
//! earlier ones, and the base app is always searched last.
//!
//! ```toml
//! [templates]
//! base_app = "core"
//! template_apps = []          # optional explicit search order
//!
//! [[templates.apps]]
//! name = "core"
//! path = "./apps/core"
//!
//! [[templates.apps]]
//! name = "shop"
//! path = "./apps/shop"
//! ```

use std::{collections::HashSet, path::PathBuf};

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplatesConfig {
    /// App whose templates are always searched, and searched last.
    #[serde(default = "default_base_app")]
    pub base_app: String,

    /// Installed apps in install order.
    #[serde(default)]
    pub apps: Vec<TemplateAppConfig>,

    /// Explicit search order by app name. When non-empty this replaces the
    /// reversed install order.
    #[serde(default)]
    pub template_apps: Vec<String>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            base_app: default_base_app(),
            apps: Vec::new(),
            template_apps: Vec::new(),
        }
    }
}

/// A single app contributing templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TemplateAppConfig {
    /// App name, also used as the lookup prefix (`<name>/templates/...`).
    pub name: String,

    /// Directory that template names are resolved against.
    pub path: PathBuf,
}

impl TemplatesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for app in &self.apps {
            if app.name.is_empty() || app.name.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "templates.apps: invalid app name '{}'",
                    app.name
                )));
            }
            if !seen.insert(app.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "templates.apps: duplicate app '{}'",
                    app.name
                )));
            }
        }

        for name in &self.template_apps {
            if !seen.contains(name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "templates.template_apps references unknown app '{name}'"
                )));
            }
        }

        if !self.apps.is_empty() && !seen.contains(self.base_app.as_str()) {
            return Err(ConfigError::Validation(format!(
                "templates.base_app '{}' is not listed in templates.apps",
                self.base_app
            )));
        }

        Ok(())
    }
}

fn default_base_app() -> String {
    "core".to_string()
}
