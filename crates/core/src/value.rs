use crate::object::ObjectRef;
use std::collections::HashMap;

/// String-keyed dictionary of tagged values (iteration order is irrelevant)
pub type TaggedDict = HashMap<String, TaggedValue>;

/// Ordered sequence of tagged values
pub type TaggedArray = Vec<TaggedValue>;

/// TaggedValue: What native code hands across the bridge
///
/// A closed set of shapes the bridge knows how to marshal into the
/// scripting engine. Values are immutable once built and are never retained
/// by the bridge after a push.
///
/// Every variant occupies exactly one slot on the evaluation stack when
/// pushed: dictionaries and arrays become a single table.
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    /// Integer value
    Integer(i64),

    /// Floating-point value (IEEE 754 double precision)
    Float(f64),

    /// Boolean value
    Boolean(bool),

    /// UTF-8 string
    String(String),

    /// String-keyed map, pushed as a table with string keys
    Dict(TaggedDict),

    /// Ordered list, pushed as a table with keys 1..=len
    Array(TaggedArray),

    /// Reference to a native object, pushed as a typed proxy
    Object(ObjectRef),
}

impl TaggedValue {
    /// Short name of the variant, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            TaggedValue::Integer(_) => "integer",
            TaggedValue::Float(_) => "float",
            TaggedValue::Boolean(_) => "boolean",
            TaggedValue::String(_) => "string",
            TaggedValue::Dict(_) => "dict",
            TaggedValue::Array(_) => "array",
            TaggedValue::Object(_) => "object",
        }
    }

    /// True for Integer, Float, Boolean and String
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            TaggedValue::Integer(_)
                | TaggedValue::Float(_)
                | TaggedValue::Boolean(_)
                | TaggedValue::String(_)
        )
    }

    /// Evaluation stack slots a push of this value occupies
    ///
    /// Always 1: containers are pushed as a single table.
    pub fn logical_size(&self) -> usize {
        match self {
            TaggedValue::Integer(_)
            | TaggedValue::Float(_)
            | TaggedValue::Boolean(_)
            | TaggedValue::String(_)
            | TaggedValue::Dict(_)
            | TaggedValue::Array(_)
            | TaggedValue::Object(_) => 1,
        }
    }

    /// Number of values nested under this one, counting itself
    ///
    /// Used by diagnostics; the stack effect of a push is always one slot
    /// regardless of this number.
    pub fn total_values(&self) -> usize {
        match self {
            TaggedValue::Dict(dict) => 1 + dict.values().map(Self::total_values).sum::<usize>(),
            TaggedValue::Array(items) => 1 + items.iter().map(Self::total_values).sum::<usize>(),
            TaggedValue::Integer(_)
            | TaggedValue::Float(_)
            | TaggedValue::Boolean(_)
            | TaggedValue::String(_)
            | TaggedValue::Object(_) => 1,
        }
    }
}

impl From<i64> for TaggedValue {
    fn from(value: i64) -> Self {
        TaggedValue::Integer(value)
    }
}

impl From<i32> for TaggedValue {
    fn from(value: i32) -> Self {
        TaggedValue::Integer(i64::from(value))
    }
}

impl From<f64> for TaggedValue {
    fn from(value: f64) -> Self {
        TaggedValue::Float(value)
    }
}

impl From<bool> for TaggedValue {
    fn from(value: bool) -> Self {
        TaggedValue::Boolean(value)
    }
}

impl From<&str> for TaggedValue {
    fn from(value: &str) -> Self {
        TaggedValue::String(value.to_string())
    }
}

impl From<String> for TaggedValue {
    fn from(value: String) -> Self {
        TaggedValue::String(value)
    }
}

impl From<TaggedDict> for TaggedValue {
    fn from(value: TaggedDict) -> Self {
        TaggedValue::Dict(value)
    }
}

impl From<TaggedArray> for TaggedValue {
    fn from(value: TaggedArray) -> Self {
        TaggedValue::Array(value)
    }
}

impl From<ObjectRef> for TaggedValue {
    fn from(value: ObjectRef) -> Self {
        TaggedValue::Object(value)
    }
}

impl<K: Into<String>, V: Into<TaggedValue>> FromIterator<(K, V)> for TaggedValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TaggedValue::Dict(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(TaggedValue::from(7), TaggedValue::Integer(7));
        assert_eq!(TaggedValue::from(7i64), TaggedValue::Integer(7));
        assert_eq!(TaggedValue::from(1.5), TaggedValue::Float(1.5));
        assert_eq!(TaggedValue::from(true), TaggedValue::Boolean(true));
        assert_eq!(
            TaggedValue::from("hi"),
            TaggedValue::String("hi".to_string())
        );
    }

    #[test]
    fn test_dict_from_pairs() {
        let value: TaggedValue = [("a", TaggedValue::from(1)), ("b", TaggedValue::from("x"))]
            .into_iter()
            .collect();

        match value {
            TaggedValue::Dict(dict) => {
                assert_eq!(dict.len(), 2);
                assert_eq!(dict.get("a"), Some(&TaggedValue::Integer(1)));
                assert_eq!(dict.get("b"), Some(&TaggedValue::String("x".into())));
            }
            other => panic!("Expected Dict, got {:?}", other),
        }
    }

    #[test]
    fn test_total_values_counts_nested_entries() {
        let inner = TaggedValue::Array(vec![1.into(), 2.into(), 3.into()]);
        let outer: TaggedValue = [("list", inner), ("flag", true.into())]
            .into_iter()
            .collect();

        // outer dict + list + 3 ints + flag
        assert_eq!(outer.total_values(), 6);
        assert!(!outer.is_scalar());
        assert_eq!(outer.type_name(), "dict");
        assert_eq!(outer.logical_size(), 1);
    }

    #[test]
    fn test_empty_containers_are_single_values() {
        assert_eq!(TaggedValue::Array(Vec::new()).total_values(), 1);
        assert_eq!(TaggedValue::Dict(TaggedDict::new()).total_values(), 1);
    }
}
