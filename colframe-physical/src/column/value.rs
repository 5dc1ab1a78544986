//! This module defines [Value], a single column element of any type,
//! together with the conversions used by cast columns.

use std::{fmt::Display, sync::Arc};

use num::{NumCast, ToPrimitive};

use crate::stype::{Object, SType};

/// A single non-NA element.
#[derive(Debug, Clone)]
pub enum Value {
    /// A boolean
    Bool(bool),
    /// An integer of any width
    Int(i64),
    /// A 64-bit floating point number
    Float(f64),
    /// A 32-bit floating point number, kept apart so it prints at its own precision
    Float32(f32),
    /// A string
    Str(String),
    /// A host object
    Obj(Object),
}

impl Value {
    /// Returns the type a column holding only this value would have.
    pub fn natural_stype(&self) -> SType {
        match self {
            Value::Bool(_) => SType::Bool,
            Value::Int(_) => SType::Int64,
            Value::Float(_) => SType::Float64,
            Value::Float32(_) => SType::Float32,
            Value::Str(_) => SType::Str32,
            Value::Obj(_) => SType::Obj,
        }
    }

    /// Converts the value into a boolean.
    ///
    /// Numbers are true unless zero, strings must spell out a boolean.
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Int(value) => Some(*value != 0),
            Value::Float(value) if value.is_nan() => None,
            Value::Float(value) => Some(*value != 0.0),
            Value::Float32(value) if value.is_nan() => None,
            Value::Float32(value) => Some(*value != 0.0),
            Value::Str(value) => match value.trim() {
                "true" | "True" | "TRUE" | "1" => Some(true),
                "false" | "False" | "FALSE" | "0" => Some(false),
                _ => None,
            },
            Value::Obj(_) => None,
        }
    }

    /// Converts the value into an integer of type `T`.
    ///
    /// Floats are truncated; values outside of the range of `T` fail.
    /// The NA sentinel of `T` is never returned.
    pub fn to_int<T>(&self) -> Option<T>
    where
        T: NumCast + num::Bounded + PartialEq,
    {
        let result = match self {
            Value::Bool(value) => T::from(<u8 as From<bool>>::from(*value)),
            Value::Int(value) => T::from(*value),
            Value::Float(value) => T::from(value.trunc()),
            Value::Float32(value) => T::from(value.trunc()),
            Value::Str(value) => value.trim().parse::<i64>().ok().and_then(T::from),
            Value::Obj(_) => None,
        };
        // The smallest value encodes NA.
        result.filter(|value| *value != T::min_value())
    }

    /// Converts the value into a 64-bit float.
    pub fn to_f64(&self) -> Option<f64> {
        let result = match self {
            Value::Bool(value) => Some(<f64 as From<u8>>::from(<u8 as From<bool>>::from(*value))),
            Value::Int(value) => value.to_f64(),
            Value::Float(value) => Some(*value),
            Value::Float32(value) => Some(<f64 as From<f32>>::from(*value)),
            Value::Str(value) => value.trim().parse::<f64>().ok(),
            Value::Obj(_) => None,
        };
        result.filter(|value| !value.is_nan())
    }

    /// Converts the value into a 32-bit float.
    ///
    /// Finite values beyond the range of `f32` fail instead of becoming infinite.
    pub fn to_f32(&self) -> Option<f32> {
        let result = match self {
            Value::Float32(value) => Some(*value),
            _ => self
                .to_f64()
                .filter(|value| !value.is_finite() || value.abs() <= <f64 as From<f32>>::from(f32::MAX))
                .and_then(|value| value.to_f32()),
        };
        result.filter(|value| !value.is_nan())
    }

    /// Returns the textual representation of the value.
    /// Objects have none.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Bool(value) => Some(value.to_string()),
            Value::Int(value) => Some(value.to_string()),
            Value::Float(value) => Some(value.to_string()),
            Value::Float32(value) => Some(value.to_string()),
            Value::Str(value) => Some(value.clone()),
            Value::Obj(_) => None,
        }
    }

    /// Returns the value as a host object, wrapping plain values.
    pub fn to_object(&self) -> Option<Object> {
        Some(match self {
            Value::Bool(value) => Arc::new(*value),
            Value::Int(value) => Arc::new(*value),
            Value::Float(value) => Arc::new(*value),
            Value::Float32(value) => Arc::new(*value),
            Value::Str(value) => Arc::new(value.clone()),
            Value::Obj(value) => Arc::clone(value),
        })
    }

    /// Converts the value into the canonical representation for columns of type `stype`.
    ///
    /// Returns `None` if the value cannot be represented.
    pub fn convert(&self, stype: SType) -> Option<Value> {
        match stype {
            SType::Void => None,
            SType::Bool => self.to_bool().map(Value::Bool),
            SType::Int8 => self.to_int::<i8>().map(|v| Value::Int(v.into())),
            SType::Int16 => self.to_int::<i16>().map(|v| Value::Int(v.into())),
            SType::Int32 => self.to_int::<i32>().map(|v| Value::Int(v.into())),
            SType::Int64 => self.to_int::<i64>().map(Value::Int),
            SType::Float32 => self.to_f32().map(Value::Float32),
            SType::Float64 => self.to_f64().map(Value::Float),
            SType::Str32 | SType::Str64 => self.to_text().map(Value::Str),
            SType::Obj => self.to_object().map(Value::Obj),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Float32(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value:?}"),
            Value::Obj(_) => write!(f, "<object>"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float32(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}
