//! Built-in value filters.
//!
//! Each filter is a plain function over JSON values; [`register_filters`]
//! exposes them as handlebars helpers taking the value as first parameter,
//! e.g. `{{flt amount precision=2}}` or `{{get_shade color 10}}`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, ScopedJson,
};
use serde::Serialize;
use serde_json::{Map, Value};

/// Default shift for [`get_shade`].
pub const DEFAULT_SHADE_PERCENT: i64 = 20;

const DATE_DISPLAY_FORMAT: &str = "%B %-d, %Y";

/// A filter as the engine sees it: the piped value, the remaining positional
/// arguments, and the hash arguments.
pub(crate) type FilterFn = dyn Fn(&Value, &[Value], &Map<String, Value>) -> Value + Send + Sync;

/// Adapts a filter function to a handlebars helper.
pub(crate) struct FilterHelper<F>(pub F);

impl<F> HelperDef for FilterHelper<F>
where
    F: Fn(&Value, &[Value], &Map<String, Value>) -> Value + Send + Sync,
{
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let value = h.param(0).map(|p| p.value().clone()).unwrap_or(Value::Null);
        let args: Vec<Value> = h.params().iter().skip(1).map(|p| p.value().clone()).collect();
        let hash = hash_args(h);
        Ok(ScopedJson::Derived((self.0)(&value, &args, &hash)))
    }
}

pub(crate) fn hash_args(h: &Helper<'_>) -> Map<String, Value> {
    h.hash()
        .iter()
        .map(|(key, value)| (key.to_string(), value.value().clone()))
        .collect()
}

/// Register the fixed filter set.
pub fn register_filters(registry: &mut Handlebars<'static>) {
    registry.register_helper(
        "global_date_format",
        Box::new(FilterHelper(|v: &Value, _: &[Value], _: &Map<String, Value>| {
            global_date_format(v)
        })),
    );
    registry.register_helper(
        "markdown",
        Box::new(FilterHelper(|v: &Value, _: &[Value], _: &Map<String, Value>| {
            Value::String(markdown(v))
        })),
    );
    registry.register_helper(
        "json",
        Box::new(FilterHelper(|v: &Value, _: &[Value], _: &Map<String, Value>| {
            Value::String(as_json(v))
        })),
    );
    registry.register_helper(
        "str",
        Box::new(FilterHelper(|v: &Value, _: &[Value], _: &Map<String, Value>| {
            Value::String(cstr(v))
        })),
    );
    registry.register_helper(
        "int",
        Box::new(FilterHelper(|v: &Value, _: &[Value], _: &Map<String, Value>| {
            Value::from(cint(v))
        })),
    );
    registry.register_helper(
        "flt",
        Box::new(FilterHelper(
            |v: &Value, args: &[Value], hash: &Map<String, Value>| {
                let precision = hash
                    .get("precision")
                    .or_else(|| args.first())
                    .and_then(Value::as_u64)
                    .and_then(|p| u32::try_from(p).ok());
                Value::from(flt(v, precision))
            },
        )),
    );
    registry.register_helper(
        "get_shade",
        Box::new(FilterHelper(
            |v: &Value, args: &[Value], hash: &Map<String, Value>| {
                let percent = hash
                    .get("percent")
                    .or_else(|| args.first())
                    .map(cint)
                    .unwrap_or(DEFAULT_SHADE_PERCENT);
                match v {
                    Value::String(color) => Value::String(get_shade(color, percent)),
                    other => other.clone(),
                }
            },
        )),
    );
    registry.register_helper(
        "abs_url",
        Box::new(FilterHelper(|v: &Value, _: &[Value], _: &Map<String, Value>| {
            abs_url(v)
        })),
    );
    registry.register_helper(
        "len",
        Box::new(FilterHelper(|v: &Value, _: &[Value], _: &Map<String, Value>| {
            Value::from(len(v))
        })),
    );
}

/// Coerce to an integer, truncating toward zero. Unparseable input is 0.
pub fn cint(value: &Value) -> i64 {
    let number = match value {
        Value::Bool(b) => return i64::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return i;
            }
            n.as_f64()
        }
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(f) if f.is_finite() => f.trunc() as i64,
        _ => 0,
    }
}

/// Coerce to a float, optionally rounded. Commas in strings are ignored.
pub fn flt(value: &Value, precision: Option<u32>) -> f64 {
    let number = match value {
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.replace(',', "").trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };

    match precision {
        Some(p) => {
            let factor = 10f64.powi(p as i32);
            (number * factor).round() / factor
        }
        None => number,
    }
}

/// Text form of a value; null becomes the empty string.
pub fn cstr(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pretty JSON with one-space indentation and sorted keys.
pub fn as_json(value: &Value) -> String {
    let sorted = sort_keys(value);
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    match sorted.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(buf).unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize value for json filter");
            String::new()
        }
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Number of characters, elements or entries. Scalars have length 0.
pub fn len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 0,
    }
}

/// Render CommonMark (with tables, strikethrough and footnotes) to HTML.
pub fn markdown(value: &Value) -> String {
    use pulldown_cmark::{Options, Parser, html};

    let text = cstr(value);
    if text.is_empty() {
        return String::new();
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(&text, options));
    out
}

/// Format a date as `January 5, 2021`. Unparseable input is returned as is.
pub fn global_date_format(value: &Value) -> Value {
    let Some(text) = value.as_str() else {
        return value.clone();
    };
    match parse_date(text) {
        Some(date) => Value::String(date.format(DATE_DISPLAY_FORMAT).to_string()),
        None => value.clone(),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

/// Prefix relative paths with `/`. Empty input becomes null; absolute
/// URLs and data URIs are unchanged.
pub fn abs_url(value: &Value) -> Value {
    let path = cstr(value);
    if path.is_empty() {
        return Value::Null;
    }
    if path.starts_with("http://")
        || path.starts_with("https://")
        || path.starts_with("data:")
        || path.starts_with('/')
    {
        return Value::String(path);
    }
    Value::String(format!("/{path}"))
}

/// Lighten a dark colour or darken a light one by `percent` of the channel
/// range. Input that is not a hex colour is returned unchanged.
pub fn get_shade(color: &str, percent: i64) -> String {
    let Some([r, g, b]) = parse_hex_color(color) else {
        return color.to_string();
    };

    let avg = (f64::from(r) + f64::from(g) + f64::from(b)) / 3.0;
    let mut percent = percent;
    if avg > 128.0 {
        percent = -percent;
    }
    // darker shades need a stronger shift to be visible
    if percent < 25 && avg < 64.0 {
        percent *= 2;
    }

    let shift = (255.0 * percent as f64 / 100.0).trunc() as i64;
    let channel = |c: u8| (i64::from(c) + shift).clamp(0, 255);
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

fn parse_hex_color(color: &str) -> Option<[u8; 3]> {
    let hex = color.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_cint() {
        assert_eq!(cint(&json!("42")), 42);
        assert_eq!(cint(&json!("3.9")), 3);
        assert_eq!(cint(&json!(-2.7)), -2);
        assert_eq!(cint(&json!(true)), 1);
        assert_eq!(cint(&json!("abc")), 0);
        assert_eq!(cint(&Value::Null), 0);
        assert_eq!(cint(&json!("inf")), 0);
    }

    #[test]
    fn test_flt() {
        assert_eq!(flt(&json!("1,234.5"), None), 1234.5);
        assert_eq!(flt(&json!(2.346), Some(2)), 2.35);
        assert_eq!(flt(&json!("nope"), None), 0.0);
        assert_eq!(flt(&json!(7), Some(0)), 7.0);
    }

    #[test]
    fn test_cstr() {
        assert_eq!(cstr(&Value::Null), "");
        assert_eq!(cstr(&json!("x")), "x");
        assert_eq!(cstr(&json!(5)), "5");
    }

    #[test]
    fn test_as_json_sorted_one_space_indent() {
        let out = as_json(&json!({"b": 1, "a": [true]}));
        assert_eq!(out, "{\n \"a\": [\n  true\n ],\n \"b\": 1\n}");
    }

    #[test]
    fn test_len() {
        assert_eq!(len(&json!("héllo")), 5);
        assert_eq!(len(&json!([1, 2])), 2);
        assert_eq!(len(&json!({"a": 1})), 1);
        assert_eq!(len(&json!(10)), 0);
    }

    #[test]
    fn test_markdown() {
        let html = markdown(&json!("# Title\n\n~~gone~~"));
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<del>gone</del>"));
        assert_eq!(markdown(&Value::Null), "");
    }

    #[test]
    fn test_markdown_tables() {
        let html = markdown(&json!("| a | b |\n|---|---|\n| 1 | 2 |"));
        assert!(html.contains("<table>"));
    }

    #[test]
    fn test_global_date_format() {
        assert_eq!(global_date_format(&json!("2021-01-05")), json!("January 5, 2021"));
        assert_eq!(
            global_date_format(&json!("2021-12-25 10:30:00.123")),
            json!("December 25, 2021")
        );
        assert_eq!(
            global_date_format(&json!("2021-03-01T08:00:00Z")),
            json!("March 1, 2021")
        );
        assert_eq!(global_date_format(&json!("soon")), json!("soon"));
    }

    #[test]
    fn test_abs_url() {
        assert_eq!(abs_url(&json!("")), Value::Null);
        assert_eq!(abs_url(&Value::Null), Value::Null);
        assert_eq!(abs_url(&json!("files/a.png")), json!("/files/a.png"));
        assert_eq!(abs_url(&json!("/files/a.png")), json!("/files/a.png"));
        assert_eq!(abs_url(&json!("https://x.io/a")), json!("https://x.io/a"));
        assert_eq!(abs_url(&json!("data:image/png;base64,AA")), json!("data:image/png;base64,AA"));
    }

    #[test]
    fn test_get_shade_darkens_light_colors() {
        // avg 255 -> percent flips to -20 -> shift -51
        assert_eq!(get_shade("#ffffff", 20), "#cccccc");
    }

    #[test]
    fn test_get_shade_lightens_dark_colors_twice_as_much() {
        // avg 0 < 64 and percent < 25 -> percent 40 -> shift 102
        assert_eq!(get_shade("#000", 20), "#666666");
    }

    #[test]
    fn test_get_shade_clamps_channels() {
        assert_eq!(get_shade("#ff0000", 50), "#ff7f7f");
        assert_eq!(get_shade("#808080", 60), "#ffffff");
    }

    #[test]
    fn test_get_shade_non_hex_unchanged() {
        assert_eq!(get_shade("red", 20), "red");
        assert_eq!(get_shade("#12345", 20), "#12345");
    }

    #[test]
    fn test_filters_registered_as_helpers() {
        let mut registry = Handlebars::new();
        register_filters(&mut registry);

        let out = registry
            .render_template(
                "{{int n}}|{{flt f precision=1}}|{{len items}}|{{abs_url p}}|{{get_shade c}}",
                &json!({"n": "12.7", "f": "3.14", "items": [1, 2, 3], "p": "x", "c": "#fff"}),
            )
            .unwrap();
        assert_eq!(out, "12|3.1|3|/x|#cccccc");
    }
}
