//! Typed parameter values and their wire encoding.
//!
//! All fixed-width numbers are little-endian. Strings are raw UTF-8 with no
//! terminator; their length is carried by the enclosing frame. Arrays are the
//! concatenation of their elements' encodings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag identifying how a value payload is interpreted.
///
/// Sent on the wire as the little-endian `i32` ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ParamType {
    Integer = 0,
    Double = 1,
    Boolean = 2,
    String = 3,
    IntegerArray = 4,
    DoubleArray = 5,
    BooleanArray = 6,
}

impl ParamType {
    pub const ALL: [Self; 7] = [
        Self::Integer,
        Self::Double,
        Self::Boolean,
        Self::String,
        Self::IntegerArray,
        Self::DoubleArray,
        Self::BooleanArray,
    ];

    pub const fn ordinal(self) -> i32 {
        self as i32
    }

    pub fn from_ordinal(ordinal: i32) -> Result<Self, ValueError> {
        Self::ALL
            .into_iter()
            .find(|t| t.ordinal() == ordinal)
            .ok_or(ValueError::UnknownParamType(ordinal))
    }

    /// The 4-byte tag payload.
    pub const fn to_wire(self) -> [u8; 4] {
        self.ordinal().to_le_bytes()
    }

    /// Parse a tag payload. It must be exactly 4 bytes.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, ValueError> {
        let tag: [u8; 4] = bytes
            .try_into()
            .map_err(|_| ValueError::TagLength(bytes.len()))?;
        Self::from_ordinal(i32::from_le_bytes(tag))
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::IntegerArray => "integer_array",
            Self::DoubleArray => "double_array",
            Self::BooleanArray => "boolean_array",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamType {
    type Err = ValueError;

    /// Accepts the long names plus the short `int`, `double`, `bool`,
    /// `string`/`str` spellings, with a `[]` suffix for arrays.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(Self::Integer),
            "double" | "float" => Ok(Self::Double),
            "bool" | "boolean" => Ok(Self::Boolean),
            "str" | "string" => Ok(Self::String),
            "int[]" | "integer_array" => Ok(Self::IntegerArray),
            "double[]" | "double_array" => Ok(Self::DoubleArray),
            "bool[]" | "boolean_array" => Ok(Self::BooleanArray),
            _ => Err(ValueError::UnknownTypeName(s.to_string())),
        }
    }
}

/// A value payload that cannot be interpreted as its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("{param_type} value must be {expected} bytes, got {actual}")]
    WrongLength {
        param_type: ParamType,
        expected: usize,
        actual: usize,
    },

    #[error("{param_type} value must be a multiple of {element_width} bytes, got {actual}")]
    RaggedArray {
        param_type: ParamType,
        element_width: usize,
        actual: usize,
    },

    #[error("Param type tag must be 4 bytes, got {0}")]
    TagLength(usize),

    #[error("Unknown param type ordinal {0}")]
    UnknownParamType(i32),

    #[error("Unknown param type name {0:?}")]
    UnknownTypeName(String),

    #[error("Boolean byte must be 0 or 1, got {0}")]
    InvalidBoolean(u8),

    #[error("String value is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Cannot parse {text:?} as {param_type}")]
    Unparseable { param_type: ParamType, text: String },

    #[error("Expected PATH=TYPE:VALUE, got {0:?}")]
    InvalidAssignment(String),
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Integer(i32),
    Double(f64),
    Boolean(bool),
    String(String),
    IntegerArray(Vec<i32>),
    DoubleArray(Vec<f64>),
    BooleanArray(Vec<bool>),
}

impl Value {
    pub const fn param_type(&self) -> ParamType {
        match self {
            Self::Integer(_) => ParamType::Integer,
            Self::Double(_) => ParamType::Double,
            Self::Boolean(_) => ParamType::Boolean,
            Self::String(_) => ParamType::String,
            Self::IntegerArray(_) => ParamType::IntegerArray,
            Self::DoubleArray(_) => ParamType::DoubleArray,
            Self::BooleanArray(_) => ParamType::BooleanArray,
        }
    }

    /// Encode the value payload.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Integer(v) => v.to_le_bytes().to_vec(),
            Self::Double(v) => v.to_le_bytes().to_vec(),
            Self::Boolean(v) => vec![u8::from(*v)],
            Self::String(v) => v.as_bytes().to_vec(),
            Self::IntegerArray(vs) => vs.iter().flat_map(|v| v.to_le_bytes()).collect(),
            Self::DoubleArray(vs) => vs.iter().flat_map(|v| v.to_le_bytes()).collect(),
            Self::BooleanArray(vs) => vs.iter().map(|v| u8::from(*v)).collect(),
        }
    }

    /// Decode a value payload of the given type.
    pub fn decode(param_type: ParamType, bytes: &[u8]) -> Result<Self, ValueError> {
        let value = match param_type {
            ParamType::Integer => Self::Integer(i32::from_le_bytes(fixed(param_type, bytes)?)),
            ParamType::Double => Self::Double(f64::from_le_bytes(fixed(param_type, bytes)?)),
            ParamType::Boolean => {
                let [byte] = fixed::<1>(param_type, bytes)?;
                Self::Boolean(decode_bool(byte)?)
            }
            ParamType::String => Self::String(std::str::from_utf8(bytes)?.to_owned()),
            ParamType::IntegerArray => Self::IntegerArray(
                elements(param_type, 4, bytes)?
                    .map(|chunk| fixed(param_type, chunk).map(i32::from_le_bytes))
                    .collect::<Result<_, _>>()?,
            ),
            ParamType::DoubleArray => Self::DoubleArray(
                elements(param_type, 8, bytes)?
                    .map(|chunk| fixed(param_type, chunk).map(f64::from_le_bytes))
                    .collect::<Result<_, _>>()?,
            ),
            ParamType::BooleanArray => Self::BooleanArray(
                elements(param_type, 1, bytes)?
                    .map(|chunk| decode_bool(chunk[0]))
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(value)
    }

    /// Parse a textual value, e.g. from the command line.
    ///
    /// Array elements are comma separated; an empty string is an empty array.
    pub fn parse(param_type: ParamType, text: &str) -> Result<Self, ValueError> {
        let unparseable = || ValueError::Unparseable {
            param_type,
            text: text.to_string(),
        };
        let items = || {
            text.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
        };

        let value = match param_type {
            ParamType::Integer => Self::Integer(text.trim().parse().map_err(|_| unparseable())?),
            ParamType::Double => Self::Double(text.trim().parse().map_err(|_| unparseable())?),
            ParamType::Boolean => Self::Boolean(text.trim().parse().map_err(|_| unparseable())?),
            ParamType::String => Self::String(text.to_string()),
            ParamType::IntegerArray => Self::IntegerArray(
                items()
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .map_err(|_| unparseable())?,
            ),
            ParamType::DoubleArray => Self::DoubleArray(
                items()
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .map_err(|_| unparseable())?,
            ),
            ParamType::BooleanArray => Self::BooleanArray(
                items()
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .map_err(|_| unparseable())?,
            ),
        };
        Ok(value)
    }
}

fn fixed<const N: usize>(param_type: ParamType, bytes: &[u8]) -> Result<[u8; N], ValueError> {
    bytes.try_into().map_err(|_| ValueError::WrongLength {
        param_type,
        expected: N,
        actual: bytes.len(),
    })
}

fn elements(
    param_type: ParamType,
    element_width: usize,
    bytes: &[u8],
) -> Result<std::slice::ChunksExact<'_, u8>, ValueError> {
    if bytes.len() % element_width != 0 {
        return Err(ValueError::RaggedArray {
            param_type,
            element_width,
            actual: bytes.len(),
        });
    }
    Ok(bytes.chunks_exact(element_width))
}

const fn decode_bool(byte: u8) -> Result<bool, ValueError> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ValueError::InvalidBoolean(other)),
    }
}
