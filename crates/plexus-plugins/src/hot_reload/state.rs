//! Plugin state carried across reloads
//!
//! [`StateValue`] is a tree of plain data plus opaque host handles. Plain
//! data is copied structurally by [`deep_clone`]; opaque handles follow the
//! configured [`OpaqueStatePolicy`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use plexus_kernel::plugin::OpaqueStatePolicy;

/// Handle to a host object that cannot be copied structurally
#[derive(Clone)]
pub struct OpaqueValue(Arc<dyn Any + Send + Sync>);

impl OpaqueValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether both handles point at the same object
    pub fn ptr_eq(&self, other: &OpaqueValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OpaqueValue(..)")
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Plugin state value
///
/// `Clone` copies plain data and shares opaque handles. Use [`deep_clone`]
/// when opaque handles must be rejected.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StateValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<StateValue>),
    Map(BTreeMap<String, StateValue>),
    Opaque(OpaqueValue),
}

impl StateValue {
    /// Build a map value from key/value pairs
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<StateValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        StateValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        StateValue::Opaque(OpaqueValue::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Float(f) => Some(*f),
            StateValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StateValue]> {
        match self {
            StateValue::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, StateValue>> {
        match self {
            StateValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&OpaqueValue> {
        match self {
            StateValue::Opaque(handle) => Some(handle),
            _ => None,
        }
    }

    /// Look up a key of a map value
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Look up a key of a map value and deserialize it
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(StateValue::to_json)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Whether the tree holds any opaque handle
    pub fn contains_opaque(&self) -> bool {
        match self {
            StateValue::Opaque(_) => true,
            StateValue::List(items) => items.iter().any(StateValue::contains_opaque),
            StateValue::Map(map) => map.values().any(StateValue::contains_opaque),
            _ => false,
        }
    }

    /// Convert to JSON
    ///
    /// `None` when the tree holds opaque handles or non-finite floats, which
    /// JSON cannot represent.
    pub fn to_json(&self) -> Option<Value> {
        Some(match self {
            StateValue::Null => Value::Null,
            StateValue::Bool(b) => Value::Bool(*b),
            StateValue::Integer(i) => Value::from(*i),
            StateValue::Float(f) => Value::Number(serde_json::Number::from_f64(*f)?),
            StateValue::String(s) => Value::String(s.clone()),
            StateValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(StateValue::to_json)
                    .collect::<Option<Vec<_>>>()?,
            ),
            StateValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| v.to_json().map(|v| (k.clone(), v)))
                    .collect::<Option<serde_json::Map<_, _>>>()?,
            ),
            StateValue::Opaque(_) => return None,
        })
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => StateValue::Null,
            Value::Bool(b) => StateValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => StateValue::Integer(i),
                None => StateValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => StateValue::String(s),
            Value::Array(items) => StateValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                StateValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Bool(value)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::Integer(value)
    }
}

impl From<i32> for StateValue {
    fn from(value: i32) -> Self {
        StateValue::Integer(value.into())
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Float(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::String(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::String(value)
    }
}

impl<T: Into<StateValue>> From<Vec<T>> for StateValue {
    fn from(items: Vec<T>) -> Self {
        StateValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, StateValue>> for StateValue {
    fn from(map: BTreeMap<String, StateValue>) -> Self {
        StateValue::Map(map)
    }
}

/// State that could not be copied into the new plugin version
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("state value at `{path}` is opaque and cannot be copied")]
pub struct StateCloneError {
    /// Location of the offending value, e.g. `$.handles[0]`
    pub path: String,
}

/// Copy a state tree so that no plain-data allocation is shared with the
/// source
pub fn deep_clone(
    value: &StateValue,
    policy: OpaqueStatePolicy,
) -> Result<StateValue, StateCloneError> {
    clone_at(value, policy, &mut String::from("$"))
}

fn clone_at(
    value: &StateValue,
    policy: OpaqueStatePolicy,
    path: &mut String,
) -> Result<StateValue, StateCloneError> {
    Ok(match value {
        StateValue::Null => StateValue::Null,
        StateValue::Bool(b) => StateValue::Bool(*b),
        StateValue::Integer(i) => StateValue::Integer(*i),
        StateValue::Float(f) => StateValue::Float(*f),
        StateValue::String(s) => StateValue::String(s.as_str().to_owned()),
        StateValue::List(items) => {
            let mut copied = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let len = path.len();
                path.push_str(&format!("[{index}]"));
                copied.push(clone_at(item, policy, path)?);
                path.truncate(len);
            }
            StateValue::List(copied)
        }
        StateValue::Map(map) => {
            let mut copied = BTreeMap::new();
            for (key, item) in map {
                let len = path.len();
                path.push('.');
                path.push_str(key);
                copied.insert(key.clone(), clone_at(item, policy, path)?);
                path.truncate(len);
            }
            StateValue::Map(copied)
        }
        StateValue::Opaque(handle) => match policy {
            OpaqueStatePolicy::Reject => {
                return Err(StateCloneError { path: path.clone() });
            }
            OpaqueStatePolicy::Share => {
                warn!(path = %path, "Sharing opaque state value with the reloaded plugin");
                StateValue::Opaque(handle.clone())
            }
        },
    })
}
