use std::{sync::Arc, time::Instant};

use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, ScopedJson,
};
use serde_json::{Map, Value};

use super::{
    classes::{is_truthy, resolve_class},
    component::{ComponentHelper, render_component},
    error::{TemplateError, TemplateResult},
    extensions::{MethodFn, TemplateExtensions},
    filters::{FilterHelper, hash_args, register_filters},
    loader::TemplateLoader,
};
use crate::{config::TemplatesConfig, observability::metrics};

/// Extensions that mark a single-line template argument as a path.
const PATH_EXTENSIONS: [&str; 4] = ["html", "css", "scss", "py"];

/// Marker rejected in inline sources when safe rendering is on.
const UNSAFE_ATTRIBUTE_MARKER: &str = ".__";

/// The configured template engine: loader chain, filters and globals.
///
/// Built once at startup and shared read-only.
///
/// Variables missing from the context render as the empty string, not as
/// their own `{{ name }}` source text. Use `{{#if name}}` or a default in the
/// context where a visible placeholder is wanted.
pub struct TemplateEnvironment {
    registry: Handlebars<'static>,
    loader: Arc<TemplateLoader>,
}

impl std::fmt::Debug for TemplateEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEnvironment")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

impl TemplateEnvironment {
    pub fn new(config: &TemplatesConfig, extensions: TemplateExtensions) -> Self {
        Self::with_loader(TemplateLoader::from_config(config), extensions)
    }

    pub fn with_loader(loader: TemplateLoader, extensions: TemplateExtensions) -> Self {
        let loader = Arc::new(loader);
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        // Output is emitted as written; `inspect` escapes its own payload.
        registry.register_escape_fn(handlebars::no_escape);

        register_filters(&mut registry);

        for (name, filter) in &extensions.filters {
            let filter = Arc::clone(filter);
            registry.register_helper(
                name,
                Box::new(FilterHelper(
                    move |v: &Value, args: &[Value], hash: &Map<String, Value>| {
                        filter(v, args, hash)
                    },
                )),
            );
        }
        for (name, method) in &extensions.methods {
            registry.register_helper(name, Box::new(MethodHelper(Arc::clone(method))));
        }

        registry.register_helper(
            "component",
            Box::new(ComponentHelper {
                loader: Arc::clone(&loader),
            }),
        );
        registry.register_helper(
            "c",
            Box::new(ComponentHelper {
                loader: Arc::clone(&loader),
            }),
        );
        registry.register_helper("inspect", Box::new(InspectHelper));
        registry.register_helper("resolve_class", Box::new(ResolveClassHelper));

        tracing::debug!(
            apps = ?loader.search_order().collect::<Vec<_>>(),
            extension_filters = extensions.filters.len(),
            extension_methods = extensions.methods.len(),
            "Template environment ready"
        );

        Self { registry, loader }
    }

    pub fn loader(&self) -> &TemplateLoader {
        &self.loader
    }

    /// Render `template` with `context`.
    ///
    /// `template` is loaded through the search path when `is_path` is set or
    /// it looks like a path (see [`guess_is_path`]); otherwise it is inline
    /// source. With `safe_render`, inline sources containing `.__` are
    /// rejected before compilation.
    pub fn render_template(
        &self,
        template: &str,
        context: &Value,
        is_path: bool,
        safe_render: bool,
    ) -> TemplateResult<String> {
        if template.is_empty() {
            return Ok(String::new());
        }

        if is_path || guess_is_path(template) {
            return self.render_path(template, context);
        }

        if safe_render && template.contains(UNSAFE_ATTRIBUTE_MARKER) {
            tracing::warn!("Rejected inline template containing an unsafe attribute access");
            return Err(TemplateError::IllegalTemplate);
        }

        let start = Instant::now();
        let result = self
            .registry
            .render_template(template, context)
            .map_err(|e| TemplateError::Render {
                template: template.to_string(),
                detail: e.to_string(),
            });
        metrics::record_template_render("inline", start.elapsed().as_secs_f64(), result.is_ok());
        result
    }

    /// Load `name` through the search path and render it.
    pub fn render_path(&self, name: &str, context: &Value) -> TemplateResult<String> {
        self.render_named("path", name, context)
    }

    fn render_named(&self, kind: &str, name: &str, context: &Value) -> TemplateResult<String> {
        let source = self.get_template_source(name)?;

        let start = Instant::now();
        let result = self
            .registry
            .render_template(&source, context)
            .map_err(|source| TemplateError::Engine {
                name: name.to_string(),
                source,
            });
        metrics::record_template_render(kind, start.elapsed().as_secs_f64(), result.is_ok());
        result
    }

    /// Compile `html` without rendering it.
    pub fn validate_template(&self, html: &str) -> TemplateResult<()> {
        match handlebars::Template::compile(html) {
            Ok(_) => Ok(()),
            Err(e) => {
                let line = e.pos().map(|(line, _)| line).unwrap_or(0);
                let message = e.reason().to_string();
                tracing::info!(line, message = %message, "Syntax error in template");
                Err(TemplateError::Syntax { line, message })
            }
        }
    }

    /// Render `templates/emails/<name>.html` and, if present, the plain-text
    /// `templates/emails/<name>.txt`.
    pub fn get_email_from_template(
        &self,
        name: &str,
        args: &Value,
    ) -> TemplateResult<(String, Option<String>)> {
        let html = self.render_named("email", &format!("templates/emails/{name}.html"), args)?;

        let text = match self.render_named("email", &format!("templates/emails/{name}.txt"), args)
        {
            Ok(text) => Some(text),
            Err(TemplateError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        Ok((html, text))
    }

    /// Raw source of `name` from the first app that provides it.
    pub fn get_template_source(&self, name: &str) -> TemplateResult<String> {
        self.loader.get_source(name)
    }

    /// Render component `name` with `kwargs`.
    pub fn component(&self, name: &str, kwargs: Map<String, Value>) -> TemplateResult<String> {
        render_component(&self.registry, &self.loader, name, kwargs)
    }

    /// Debug dump of a value.
    pub fn inspect(&self, value: &Value, render: bool) -> String {
        inspect(value, render)
    }
}

/// Whether `template` is a path rather than inline source: a single line
/// ending in one of the known template extensions.
pub fn guess_is_path(template: &str) -> bool {
    if template.contains('\n') || !template.contains('.') {
        return false;
    }
    template
        .rsplit('.')
        .next()
        .is_some_and(|ext| PATH_EXTENSIONS.contains(&ext))
}

/// `<pre>` block with the HTML-escaped, pretty-printed value, or nothing
/// when `render` is false.
pub fn inspect(value: &Value, render: bool) -> String {
    if !render {
        return String::new();
    }
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("<pre>{}</pre>", html_escape::encode_safe(&pretty))
}

struct MethodHelper(Arc<MethodFn>);

impl HelperDef for MethodHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let args: Vec<Value> = h.params().iter().map(|p| p.value().clone()).collect();
        Ok(ScopedJson::Derived((self.0)(&args, &hash_args(h))))
    }
}

/// `{{inspect value}}` or `{{inspect value render=false}}`.
struct InspectHelper;

impl HelperDef for InspectHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let value = h.param(0).map(|p| p.value().clone()).unwrap_or(Value::Null);
        let render = h
            .hash_get("render")
            .or_else(|| h.param(1))
            .map(|p| is_truthy(p.value()))
            .unwrap_or(true);
        Ok(ScopedJson::Derived(Value::String(inspect(&value, render))))
    }
}

struct ResolveClassHelper;

impl HelperDef for ResolveClassHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let classes = h.param(0).map(|p| resolve_class(p.value())).unwrap_or_default();
        Ok(ScopedJson::Derived(Value::String(classes)))
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use serde_json::json;

    use super::*;
    use crate::config::TemplateAppConfig;

    fn write(root: &Path, name: &str, content: &str) {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn environment(dir: &Path, extensions: TemplateExtensions) -> TemplateEnvironment {
        let config = TemplatesConfig {
            base_app: "core".into(),
            apps: ["core", "shop"]
                .iter()
                .map(|name| TemplateAppConfig {
                    name: name.to_string(),
                    path: dir.join(name),
                })
                .collect(),
            template_apps: Vec::new(),
        };
        TemplateEnvironment::new(&config, extensions)
    }

    #[test]
    fn test_guess_is_path() {
        assert!(guess_is_path("templates/pages/home.html"));
        assert!(guess_is_path("style.scss"));
        assert!(!guess_is_path("Hello {{name}}"));
        assert!(!guess_is_path("a.html\nmore"));
        assert!(!guess_is_path("report.pdf"));
        assert!(!guess_is_path("no extension"));
    }

    #[test]
    fn test_empty_template_renders_empty() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), TemplateExtensions::new());
        assert_eq!(env.render_template("", &json!({}), true, true).unwrap(), "");
    }

    #[test]
    fn test_render_inline() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), TemplateExtensions::new());
        let out = env
            .render_template("Hello {{name}}!", &json!({"name": "<b>Ann</b>"}), false, true)
            .unwrap();
        assert_eq!(out, "Hello <b>Ann</b>!");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), TemplateExtensions::new());
        let out = env
            .render_template("[{{title}}]", &json!({}), false, true)
            .unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn test_render_guessed_path() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("shop"), "templates/pages/home.html", "Shop {{title}}");
        let env = environment(dir.path(), TemplateExtensions::new());

        let out = env
            .render_template("templates/pages/home.html", &json!({"title": "Home"}), false, true)
            .unwrap();
        assert_eq!(out, "Shop Home");
    }

    #[test]
    fn test_forced_path_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), TemplateExtensions::new());
        let err = env
            .render_template("templates/missing", &json!({}), true, true)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_safe_render_rejects_dunder_access() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), TemplateExtensions::new());
        // Not even valid syntax: rejection happens before compilation.
        let err = env
            .render_template("{{ x.__class__ {{", &json!({}), false, true)
            .unwrap_err();
        assert!(matches!(err, TemplateError::IllegalTemplate));

        let out = env
            .render_template("{{x}}.__", &json!({"x": 1}), false, false)
            .unwrap();
        assert_eq!(out, "1.__");
    }

    #[test]
    fn test_inline_error_carries_source() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), TemplateExtensions::new());
        let err = env
            .render_template("{{#if x}}unclosed", &json!({}), false, true)
            .unwrap_err();

        match &err {
            TemplateError::Render { template, .. } => assert_eq!(template, "{{#if x}}unclosed"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("<pre>{{#if x}}unclosed</pre><pre>"));
    }

    #[test]
    fn test_validate_template() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), TemplateExtensions::new());

        assert!(env.validate_template("<p>{{#each items}}{{this}}{{/each}}</p>").is_ok());

        let err = env.validate_template("line one\n{{#each items}}").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { line: 2, .. }));
        assert!(err.to_string().starts_with("Line 2: "));
    }

    #[test]
    fn test_email_with_and_without_text_part() {
        let dir = tempfile::tempdir().unwrap();
        let core = dir.path().join("core");
        write(&core, "templates/emails/welcome.html", "<p>Hi {{name}}</p>");
        write(&core, "templates/emails/welcome.txt", "Hi {{name}}");
        write(&core, "templates/emails/reset.html", "<p>Reset</p>");
        let env = environment(dir.path(), TemplateExtensions::new());

        let (html, text) = env
            .get_email_from_template("welcome", &json!({"name": "Ann"}))
            .unwrap();
        assert_eq!(html, "<p>Hi Ann</p>");
        assert_eq!(text.as_deref(), Some("Hi Ann"));

        let (html, text) = env.get_email_from_template("reset", &json!({})).unwrap();
        assert_eq!(html, "<p>Reset</p>");
        assert!(text.is_none());

        assert!(
            env.get_email_from_template("missing", &json!({}))
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn test_component_front_matter_merged_with_kwargs() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("core"),
            "templates/components/button.html",
            "---\nvariant: primary\nlabel: OK\n---\n<button class=\"{{class}}\" data-variant=\"{{variant}}\">{{label}}</button>",
        );
        let env = environment(dir.path(), TemplateExtensions::new());

        let mut kwargs = Map::new();
        kwargs.insert("label".into(), json!("Save"));
        kwargs.insert("class".into(), json!(["btn", {"btn-lg": true, "hidden": false}]));

        let out = env.component("button", kwargs).unwrap();
        assert_eq!(
            out,
            "<button class=\"btn btn-lg\" data-variant=\"primary\">Save</button>"
        );
    }

    #[test]
    fn test_component_without_class_gets_empty_class() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("core"),
            "templates/components/tag.html",
            "<span class=\"{{class}}\">{{text}}</span>",
        );
        let env = environment(dir.path(), TemplateExtensions::new());

        let mut kwargs = Map::new();
        kwargs.insert("text".into(), json!("new"));
        assert_eq!(
            env.component("tag", kwargs).unwrap(),
            "<span class=\"\">new</span>"
        );
    }

    #[test]
    fn test_missing_component_renders_marker() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), TemplateExtensions::new());
        assert_eq!(
            env.component("missing", Map::new()).unwrap(),
            "<pre>Component \"missing\" not found</pre>"
        );
    }

    #[test]
    fn test_component_helper_and_alias_in_templates() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("core"),
            "templates/components/badge.html",
            "<i class=\"{{class}}\">{{label}}</i>",
        );
        let env = environment(dir.path(), TemplateExtensions::new());

        let out = env
            .render_template(
                "{{component \"badge\" label=title class=\"x\"}}|{{c \"nope\"}}",
                &json!({"title": "Hot"}),
                false,
                true,
            )
            .unwrap();
        assert_eq!(
            out,
            "<i class=\"x\">Hot</i>|<pre>Component \"nope\" not found</pre>"
        );
    }

    #[test]
    fn test_inspect() {
        assert_eq!(inspect(&json!("<b>"), true), "<pre>&quot;&lt;b&gt;&quot;</pre>");
        assert_eq!(inspect(&json!({"a": 1}), false), "");
    }

    #[test]
    fn test_inspect_and_resolve_class_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), TemplateExtensions::new());

        let out = env
            .render_template(
                "{{resolve_class classes}}|{{inspect n}}|{{inspect n render=false}}",
                &json!({"classes": {"on": true, "off": false}, "n": 5}),
                false,
                true,
            )
            .unwrap();
        assert_eq!(out, "on|<pre>5</pre>|");
    }

    #[test]
    fn test_extension_filter_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let extensions = TemplateExtensions::new()
            .filter("len", |_: &Value, _: &[Value], _: &Map<String, Value>| json!("custom"))
            .filter("shout", |v: &Value, _: &[Value], _: &Map<String, Value>| {
                json!(v.as_str().unwrap_or_default().to_uppercase())
            });
        let env = environment(dir.path(), extensions);

        let out = env
            .render_template("{{len items}} {{shout word}}", &json!({"items": [1], "word": "hi"}), false, true)
            .unwrap();
        assert_eq!(out, "custom HI");
    }

    #[test]
    fn test_builtin_globals_override_extension_methods() {
        let dir = tempfile::tempdir().unwrap();
        let extensions = TemplateExtensions::new()
            .method("inspect", |_: &[Value], _: &Map<String, Value>| json!("hijacked"))
            .method("greet", |args: &[Value], hash: &Map<String, Value>| {
                let name = args.first().and_then(Value::as_str).unwrap_or("nobody");
                let punct = hash.get("punct").and_then(Value::as_str).unwrap_or(".");
                json!(format!("Hello {name}{punct}"))
            });
        let env = environment(dir.path(), extensions);

        let out = env
            .render_template("{{inspect 1}} {{greet \"Ann\" punct=\"!\"}}", &json!({}), false, true)
            .unwrap();
        assert_eq!(out, "<pre>1</pre> Hello Ann!");
    }

    #[test]
    fn test_filters_available_in_templates() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), TemplateExtensions::new());

        let out = env
            .render_template(
                "{{markdown body}}{{global_date_format when}}",
                &json!({"body": "*hi*", "when": "2021-01-05"}),
                false,
                true,
            )
            .unwrap();
        assert_eq!(out, "<p><em>hi</em></p>\nJanuary 5, 2021");
    }
}
