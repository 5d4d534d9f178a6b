//! Per-call context carrying custom telemetry labels.
//!
//! A [`CallContext`] is an immutable value. Attaching labels, query text or a
//! span never mutates it; a new context is returned instead, so two callers
//! deriving children from the same parent never observe each other's labels.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use tracing::Span;

/// Value of a telemetry label.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelValue {
    Str(Cow<'static, str>),
    I64(i64),
    F64(f64),
    Bool(bool),
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Str(s) => f.write_str(s),
            LabelValue::I64(v) => write!(f, "{v}"),
            LabelValue::F64(v) => write!(f, "{v}"),
            LabelValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&'static str> for LabelValue {
    fn from(value: &'static str) -> Self {
        LabelValue::Str(Cow::Borrowed(value))
    }
}

impl From<String> for LabelValue {
    fn from(value: String) -> Self {
        LabelValue::Str(Cow::Owned(value))
    }
}

impl From<i64> for LabelValue {
    fn from(value: i64) -> Self {
        LabelValue::I64(value)
    }
}

impl From<u64> for LabelValue {
    fn from(value: u64) -> Self {
        LabelValue::I64(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for LabelValue {
    fn from(value: f64) -> Self {
        LabelValue::F64(value)
    }
}

impl From<bool> for LabelValue {
    fn from(value: bool) -> Self {
        LabelValue::Bool(value)
    }
}

/// A single telemetry label.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: Cow<'static, str>,
    pub value: LabelValue,
}

impl KeyValue {
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<LabelValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Per-invocation carrier for custom labels, the query text and the active span.
///
/// Cloning is cheap: the label set is shared behind an `Arc` and only copied
/// when extended.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    attributes: Option<Arc<[KeyValue]>>,
    query: Option<Arc<str>>,
    span: Option<Span>,
}

impl CallContext {
    /// An empty context: no labels, no query, no span.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a child context with `labels` appended to the existing ones.
    pub fn with_attributes<I>(&self, labels: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        with_custom_attributes(self, labels)
    }

    /// Returns a child context carrying the query text.
    pub fn with_query(&self, query: &str) -> Self {
        Self {
            query: Some(Arc::from(query)),
            ..self.clone()
        }
    }

    /// The query text attached by the trace layer, if any.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns a child context carrying `span` as the active span.
    pub fn with_span(&self, span: Span) -> Self {
        Self {
            span: Some(span),
            ..self.clone()
        }
    }

    /// The span attached by a tracer, if any.
    pub fn span(&self) -> Option<&Span> {
        self.span.as_ref()
    }
}

/// Returns the labels attached to `ctx`, or an empty set.
pub fn attributes(ctx: &CallContext) -> Arc<[KeyValue]> {
    match &ctx.attributes {
        Some(attrs) => Arc::clone(attrs),
        None => Arc::from(Vec::new()),
    }
}

/// Adds custom labels to the context.
///
/// The labels are added to metrics and spans generated for queries issued
/// with the returned context. `ctx` itself is left untouched.
///
/// ```rust
/// use sea_orm_query_telemetry::{attributes, with_custom_attributes, CallContext, KeyValue};
///
/// let base = CallContext::new();
/// let ctx = with_custom_attributes(&base, [KeyValue::new("tenant", "acme")]);
///
/// assert_eq!(attributes(&ctx).len(), 1);
/// assert!(attributes(&base).is_empty());
/// ```
pub fn with_custom_attributes<I>(ctx: &CallContext, labels: I) -> CallContext
where
    I: IntoIterator<Item = KeyValue>,
{
    let existing = attributes(ctx);
    let combined: Vec<KeyValue> = existing.iter().cloned().chain(labels).collect();

    CallContext {
        attributes: Some(Arc::from(combined)),
        ..ctx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(attrs: &[KeyValue]) -> Vec<&str> {
        attrs.iter().map(|kv| &*kv.key).collect()
    }

    #[test]
    fn test_empty_context_has_empty_attributes() {
        assert!(attributes(&CallContext::new()).is_empty());
    }

    #[test]
    fn test_sequential_attachments_concatenate_in_order() {
        let base = CallContext::new();
        let first = with_custom_attributes(&base, [KeyValue::new("a", 1i64)]);
        let second = with_custom_attributes(
            &first,
            [KeyValue::new("b", "two"), KeyValue::new("c", true)],
        );

        assert_eq!(keys(&attributes(&second)), vec!["a", "b", "c"]);
        assert_eq!(keys(&attributes(&first)), vec!["a"]);
        assert!(attributes(&base).is_empty());
    }

    #[test]
    fn test_sibling_contexts_do_not_share_appends() {
        let parent = CallContext::new().with_attributes([KeyValue::new("shared", "p")]);
        let observed = attributes(&parent);

        let left = parent.with_attributes([KeyValue::new("left", 1i64)]);
        let right = parent.with_attributes([KeyValue::new("right", 2i64)]);

        assert_eq!(keys(&attributes(&left)), vec!["shared", "left"]);
        assert_eq!(keys(&attributes(&right)), vec!["shared", "right"]);
        assert_eq!(keys(&observed), vec!["shared"]);
    }

    #[test]
    fn test_query_and_span_preserve_attributes() {
        let ctx = CallContext::new()
            .with_attributes([KeyValue::new("tenant", "acme")])
            .with_query("SELECT 1")
            .with_span(Span::none());

        assert_eq!(ctx.query(), Some("SELECT 1"));
        assert!(ctx.span().is_some());
        assert_eq!(keys(&attributes(&ctx)), vec!["tenant"]);
    }

    #[test]
    fn test_label_value_display() {
        assert_eq!(LabelValue::from("x").to_string(), "x");
        assert_eq!(LabelValue::from(42u64).to_string(), "42");
        assert_eq!(LabelValue::from(false).to_string(), "false");
    }
}
