//! Snapshot value helpers
//!
//! Snapshots are `serde_json::Value` objects. Being a tree by
//! construction, a snapshot cannot contain reference cycles, so the
//! renderer never has to guard against them.

use serde_json::Value;

use crate::ast::Path;

/// Template-specific operations over snapshot values
pub trait ValueExt {
    /// Check if the value is truthy (for conditionals)
    fn is_truthy(&self) -> bool;

    /// Get a human-readable type name
    fn type_name(&self) -> &'static str;

    /// Render the value to its unescaped string form
    fn render_to_string(&self) -> String;
}

impl ValueExt for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i != 0
                } else if let Some(f) = n.as_f64() {
                    f != 0.0
                } else {
                    true
                }
            }
            Value::String(s) => !s.is_empty(),
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(obj) => !obj.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "none",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "dict",
        }
    }

    fn render_to_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            // lists and dicts rarely land in scalar slots; compact JSON
            // keeps the output deterministic when they do
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }
}

/// Resolve a dotted path against the current context value.
///
/// Missing fields and non-object bases resolve to nothing; the caller
/// renders that as the empty string (undefined identifiers are legal).
pub fn resolve<'a>(ctx: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut cur = ctx;
    for seg in &path.segments {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceSpan;
    use serde_json::json;

    fn path(segs: &[&str]) -> Path {
        Path {
            segments: segs.iter().map(|s| s.to_string()).collect(),
            span: SourceSpan::default(),
        }
    }

    #[test]
    fn resolve_walks_nested_objects() {
        let v = json!({"User": {"Email": "ada@example.com"}});
        assert_eq!(
            resolve(&v, &path(&["User", "Email"])),
            Some(&json!("ada@example.com"))
        );
        assert_eq!(resolve(&v, &path(&["User", "Name"])), None);
        assert_eq!(resolve(&v, &path(&["Missing", "Deep"])), None);
    }

    #[test]
    fn empty_path_is_the_context() {
        let v = json!("item");
        assert_eq!(resolve(&v, &path(&[])), Some(&v));
    }

    #[test]
    fn truthiness_matches_template_semantics() {
        assert!(!json!(null).is_truthy());
        assert!(!json!(false).is_truthy());
        assert!(!json!(0).is_truthy());
        assert!(!json!("").is_truthy());
        assert!(!json!([]).is_truthy());
        assert!(!json!({}).is_truthy());
        assert!(json!(true).is_truthy());
        assert!(json!(1).is_truthy());
        assert!(json!("x").is_truthy());
        assert!(json!([0]).is_truthy());
    }

    #[test]
    fn scalars_render_to_plain_strings() {
        assert_eq!(json!(null).render_to_string(), "");
        assert_eq!(json!(42).render_to_string(), "42");
        assert_eq!(json!(true).render_to_string(), "true");
        assert_eq!(json!("Ada").render_to_string(), "Ada");
        assert_eq!(json!(null).type_name(), "none");
        assert_eq!(json!([1]).type_name(), "list");
    }
}
