//! Components: reusable template fragments under `templates/components/`.
//!
//! A component source may start with a YAML front-matter block holding
//! default attributes:
//!
//! ```text
//! ---
//! variant: primary
//! class: btn
//! ---
//! <button class="{{class}} btn-{{variant}}">{{label}}</button>
//! ```
//!
//! Call-site arguments override front-matter attributes, and `class` is
//! always resolved to a plain string.

use std::{sync::Arc, time::Instant};

use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, RenderErrorReason,
    ScopedJson,
};
use serde_json::{Map, Value};

use super::{
    classes::resolve_class,
    error::{TemplateError, TemplateResult},
    filters::hash_args,
    loader::TemplateLoader,
};
use crate::observability::metrics;

const FRONT_MATTER_DELIMITER: &str = "---";

/// Attributes and body split out of a component source.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    pub attributes: Map<String, Value>,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FrontMatterError {
    #[error("front matter block is not closed")]
    Unterminated,

    #[error("invalid front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Split a leading `---` block off `source`.
///
/// Returns `Ok(None)` when the source has no front matter or the block holds
/// no attributes.
pub fn parse_front_matter(source: &str) -> Result<Option<FrontMatter>, FrontMatterError> {
    if !source.starts_with(FRONT_MATTER_DELIMITER) {
        return Ok(None);
    }

    let mut lines = source.split_inclusive('\n');
    let Some(opening) = lines.next() else {
        return Ok(None);
    };
    if !is_delimiter(opening) {
        return Ok(None);
    }

    let mut yaml = String::new();
    let mut consumed = opening.len();
    let mut closed = false;
    for line in lines {
        consumed += line.len();
        if is_delimiter(line) {
            closed = true;
            break;
        }
        yaml.push_str(line);
    }
    if !closed {
        return Err(FrontMatterError::Unterminated);
    }

    if yaml.trim().is_empty() {
        return Ok(None);
    }
    let attributes: Option<Map<String, Value>> = serde_yaml::from_str(&yaml)?;
    match attributes {
        Some(attributes) if !attributes.is_empty() => Ok(Some(FrontMatter {
            attributes,
            body: source[consumed..].trim_start().to_string(),
        })),
        _ => Ok(None),
    }
}

fn is_delimiter(line: &str) -> bool {
    let line = line.trim_end();
    line.len() >= FRONT_MATTER_DELIMITER.len() && line.chars().all(|c| c == '-')
}

/// Split `source`, falling back to the whole source as body on parse errors.
pub fn split_component_source(name: &str, source: &str) -> (Map<String, Value>, String) {
    match parse_front_matter(source) {
        Ok(Some(front_matter)) => (front_matter.attributes, front_matter.body),
        Ok(None) => (Map::new(), source.to_string()),
        Err(e) => {
            tracing::warn!(component = name, error = %e, "Ignoring component front matter");
            (Map::new(), source.to_string())
        }
    }
}

pub fn component_template_name(name: &str) -> String {
    format!("templates/components/{name}.html")
}

pub fn component_not_found(name: &str) -> String {
    format!("<pre>Component \"{name}\" not found</pre>")
}

/// Render component `name` with `kwargs` using `registry`.
///
/// A missing component renders as an inline marker rather than failing.
pub fn render_component(
    registry: &Handlebars<'_>,
    loader: &TemplateLoader,
    name: &str,
    kwargs: Map<String, Value>,
) -> TemplateResult<String> {
    let start = Instant::now();
    let template_name = component_template_name(name);

    let source = match loader.get_source(&template_name) {
        Ok(source) => source,
        Err(TemplateError::NotFound(_)) => {
            tracing::debug!(component = name, "Component not found");
            return Ok(component_not_found(name));
        }
        Err(e) => return Err(e),
    };

    let (mut context, body) = split_component_source(name, &source);
    context.extend(kwargs);
    let class = context.get("class").map(resolve_class).unwrap_or_default();
    context.insert("class".to_string(), Value::String(class));

    let result = registry
        .render_template(&body, &Value::Object(context))
        .map_err(|source| TemplateError::Engine {
            name: template_name,
            source,
        });

    metrics::record_template_render("component", start.elapsed().as_secs_f64(), result.is_ok());
    result
}

/// `{{component "name" key=value ...}}`, also registered as `c`.
pub(crate) struct ComponentHelper {
    pub(crate) loader: Arc<TemplateLoader>,
}

impl HelperDef for ComponentHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let name = h
            .param(0)
            .and_then(|p| p.value().as_str())
            .ok_or_else(|| RenderErrorReason::Other("component requires a name".to_string()))?;

        let html = render_component(r, &self.loader, name, hash_args(h))
            .map_err(|e| RenderErrorReason::Other(e.to_string()))?;
        Ok(ScopedJson::Derived(Value::String(html)))
    }
}
