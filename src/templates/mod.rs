//! Template rendering on top of handlebars.
//!
//! Templates live under each installed app's root and are resolved through a
//! [`TemplateLoader`]. The [`TemplateEnvironment`] adds the built-in filters,
//! the `component`/`c`, `inspect` and `resolve_class` globals, and any
//! application [`TemplateExtensions`].

mod classes;
mod component;
mod environment;
mod error;
mod extensions;
pub mod filters;
mod loader;

pub use classes::{ClassSpec, resolve_class};
pub use component::{FrontMatter, FrontMatterError, parse_front_matter};
pub use environment::{TemplateEnvironment, guess_is_path, inspect};
pub use error::{TemplateError, TemplateResult};
pub use extensions::{MethodFn, TemplateExtensions};
pub use loader::{AppRoot, TemplateLoader, split_template_path};
