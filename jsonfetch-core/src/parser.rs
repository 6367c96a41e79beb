use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde_json::Value;

use crate::error::ParseError;

/// Turns a raw response body into a JSON value.
///
/// Failures are reported through the `Err` variant only; a parser never
/// signals an error by returning a value that looks like one.
pub trait JsonParser: Send + Sync {
    fn parse(&self, raw: &[u8]) -> Result<Value, ParseError>;
}

impl<F> JsonParser for F
where
    F: Fn(&[u8]) -> Result<Value, ParseError> + Send + Sync,
{
    fn parse(&self, raw: &[u8]) -> Result<Value, ParseError> {
        self(raw)
    }
}

/// [`JsonParser`] backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonParser;

impl JsonParser for SerdeJsonParser {
    fn parse(&self, raw: &[u8]) -> Result<Value, ParseError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Holds the default parser used by adapters without a parser of their own.
///
/// A process-wide registry is available through [`ParserRegistry::global`];
/// adapters can also be given their own registry, which keeps tests and
/// embedded uses independent of global state.
pub struct ParserRegistry {
    default: RwLock<Option<Arc<dyn JsonParser>>>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<ParserRegistry>> = OnceLock::new();

impl ParserRegistry {
    pub const fn new() -> Self {
        ParserRegistry {
            default: RwLock::new(None),
        }
    }

    pub fn with_default(parser: Arc<dyn JsonParser>) -> Self {
        ParserRegistry {
            default: RwLock::new(Some(parser)),
        }
    }

    /// The registry shared by every adapter built without an explicit one.
    /// Starts out with no default parser.
    pub fn global() -> Arc<ParserRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(ParserRegistry::new()))
            .clone()
    }

    /// Replace the default parser, returning the previous binding. Passing
    /// `None` clears it.
    pub fn set_default(&self, parser: Option<Arc<dyn JsonParser>>) -> Option<Arc<dyn JsonParser>> {
        let mut slot = self.default.write().unwrap_or_else(|poisoned| {
            log::warn!("parser registry lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        });
        std::mem::replace(&mut *slot, parser)
    }

    pub fn default_parser(&self) -> Option<Arc<dyn JsonParser>> {
        self.default
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("has_default", &self.default_parser().is_some())
            .finish()
    }
}

/// Set the process-wide default parser. Last writer wins.
pub fn set_default_parser<P: JsonParser + 'static>(parser: P) -> Option<Arc<dyn JsonParser>> {
    ParserRegistry::global().set_default(Some(Arc::new(parser)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serde_parser_decodes_objects() {
        let value = SerdeJsonParser.parse(br#"{"items":[1,2,3]}"#).unwrap();
        assert_eq!(value, json!({"items": [1, 2, 3]}));
    }

    #[test]
    fn serde_parser_rejects_garbage() {
        let err = SerdeJsonParser.parse(b"not json").unwrap_err();
        assert!(matches!(err, ParseError::Decode(_)));
    }

    #[test]
    fn serde_parser_rejects_empty_body() {
        assert!(SerdeJsonParser.parse(b"").is_err());
    }

    #[test]
    fn closures_are_parsers() {
        let parser = |raw: &[u8]| -> Result<Value, ParseError> { Ok(json!(raw.len())) };
        assert_eq!(parser.parse(b"abcd").unwrap(), json!(4));
    }

    #[test]
    fn set_default_returns_previous_binding() {
        let registry = ParserRegistry::new();
        assert!(registry.default_parser().is_none());

        let first: Arc<dyn JsonParser> = Arc::new(SerdeJsonParser);
        assert!(registry.set_default(Some(first.clone())).is_none());

        let second: Arc<dyn JsonParser> =
            Arc::new(|_: &[u8]| -> Result<Value, ParseError> { Ok(Value::Null) });
        let previous = registry.set_default(Some(second.clone())).unwrap();
        assert!(Arc::ptr_eq(&previous, &first));

        let current = registry.default_parser().unwrap();
        assert!(Arc::ptr_eq(&current, &second));

        assert!(registry.set_default(None).is_some());
        assert!(registry.default_parser().is_none());
    }
}
