//! Filters and global methods contributed by applications.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde_json::{Map, Value};

use super::filters::FilterFn;

/// A global method: positional arguments and hash arguments in, value out.
pub type MethodFn = dyn Fn(&[Value], &Map<String, Value>) -> Value + Send + Sync;

/// Typed registry of extra template helpers.
///
/// Filters registered here replace built-in filters of the same name.
/// Methods are registered after filters, but the built-in globals
/// (`component`, `c`, `inspect`, `resolve_class`) always win.
#[derive(Clone, Default)]
pub struct TemplateExtensions {
    pub(crate) filters: BTreeMap<String, Arc<FilterFn>>,
    pub(crate) methods: BTreeMap<String, Arc<MethodFn>>,
}

impl TemplateExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter; it receives the value, extra positional arguments, and
    /// hash arguments.
    pub fn filter<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&Value, &[Value], &Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    /// Add a global method.
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&[Value], &Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.methods.is_empty()
    }
}

impl fmt::Debug for TemplateExtensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateExtensions")
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
