//! Parameter replacements: a model path plus a typed value to override.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use super::value::{ParamType, Value, ValueError};

/// One parameter override sent to the simulation server.
///
/// The value bytes are always a valid encoding of `param_type`; this is
/// checked when a replacement is built from raw bytes and cannot change
/// afterwards because the fields are private.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ReplacementSpec")]
pub struct Replacement {
    path: String,
    param_type: ParamType,
    value: Vec<u8>,
}

/// JSON form: `{"path": "...", "value": {"type": "integer", "value": 5}}`.
#[derive(Serialize, Deserialize)]
struct ReplacementSpec {
    path: String,
    value: Value,
}

impl Replacement {
    pub fn new(path: impl Into<String>, value: &Value) -> Self {
        Self {
            path: path.into(),
            param_type: value.param_type(),
            value: value.encode(),
        }
    }

    pub fn int(path: impl Into<String>, value: i32) -> Self {
        Self::new(path, &Value::Integer(value))
    }

    pub fn double(path: impl Into<String>, value: f64) -> Self {
        Self::new(path, &Value::Double(value))
    }

    pub fn boolean(path: impl Into<String>, value: bool) -> Self {
        Self::new(path, &Value::Boolean(value))
    }

    pub fn string(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(path, &Value::String(value.into()))
    }

    /// Build from an already-encoded payload, validating it against `param_type`.
    pub fn from_raw(
        path: impl Into<String>,
        param_type: ParamType,
        value: Vec<u8>,
    ) -> Result<Self, ValueError> {
        Value::decode(param_type, &value)?;
        Ok(Self {
            path: path.into(),
            param_type,
            value,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub const fn param_type(&self) -> ParamType {
        self.param_type
    }

    /// The encoded value payload as sent on the wire.
    pub fn value_bytes(&self) -> &[u8] {
        &self.value
    }

    /// Decode the typed value.
    pub fn value(&self) -> Result<Value, ValueError> {
        Value::decode(self.param_type, &self.value)
    }
}

impl From<ReplacementSpec> for Replacement {
    fn from(spec: ReplacementSpec) -> Self {
        Self::new(spec.path, &spec.value)
    }
}

impl Serialize for Replacement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.value().map_err(serde::ser::Error::custom)?;
        ReplacementSpec {
            path: self.path.clone(),
            value,
        }
        .serialize(serializer)
    }
}

impl fmt::Display for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Ok(Value::String(s)) => write!(f, "{} = {s:?}", self.path),
            Ok(Value::Integer(v)) => write!(f, "{} = {v}", self.path),
            Ok(Value::Double(v)) => write!(f, "{} = {v}", self.path),
            Ok(Value::Boolean(v)) => write!(f, "{} = {v}", self.path),
            Ok(Value::IntegerArray(vs)) => write!(f, "{} = {vs:?}", self.path),
            Ok(Value::DoubleArray(vs)) => write!(f, "{} = {vs:?}", self.path),
            Ok(Value::BooleanArray(vs)) => write!(f, "{} = {vs:?}", self.path),
            Err(_) => write!(f, "{} = <{} bytes>", self.path, self.value.len()),
        }
    }
}

impl FromStr for Replacement {
    type Err = ValueError;

    /// Parse `PATH=TYPE:VALUE`, e.g. `[Wheat].Sow.Population=double:120.5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValueError::InvalidAssignment(s.to_string());
        let (path, typed) = s.split_once('=').ok_or_else(invalid)?;
        let (type_name, text) = typed.split_once(':').ok_or_else(invalid)?;

        let param_type: ParamType = type_name.parse()?;
        let value = Value::parse(param_type, text)?;
        Ok(Self::new(path.trim(), &value))
    }
}
