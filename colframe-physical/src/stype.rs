//! This module defines [SType], the physical storage type of column elements,
//! as well as the in-band encoding of missing values (NA).
//!
//! # NA encoding
//!
//! All NA sentinels used anywhere in the crate are defined in this module:
//!
//! * integers use the minimum value of their type, e.g. [`i32::MIN`] for [`SType::Int32`];
//! * floating point numbers use NaN;
//! * booleans are stored as [`i8`] with values `0` and `1`, and NA is [`i8::MIN`];
//! * string columns flag NA by setting the most significant bit of the
//!   end offset of the element, see [StrOffset::NA_BIT];
//! * object columns store a null pointer for NA;
//! * explicit row indices use the 32- or 64-bit integer sentinel to mean "no source row".

use std::{any::Any, fmt::Display, sync::Arc};

/// Opaque value owned by the host application, stored in columns of type [SType::Obj].
pub type Object = Arc<dyn Any + Send + Sync>;

/// Descriptors to refer to the storage types of column elements at runtime.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum SType {
    /// Column without any storage; every element is NA.
    Void,
    /// Booleans, stored as [`i8`] holding `0` or `1`.
    Bool,
    /// Data type [`i8`]
    Int8,
    /// Data type [`i16`]
    Int16,
    /// Data type [`i32`]
    Int32,
    /// Data type [`i64`]
    Int64,
    /// Data type [`f32`]
    Float32,
    /// Data type [`f64`]
    Float64,
    /// Strings, addressed through [`u32`] offsets into a character buffer.
    Str32,
    /// Strings, addressed through [`u64`] offsets into a character buffer.
    Str64,
    /// Host objects of type [Object].
    Obj,
}

/// A list of all [SType]s,
/// in the order they appear in the enum.
pub const STYPES: &[SType] = &[
    SType::Void,
    SType::Bool,
    SType::Int8,
    SType::Int16,
    SType::Int32,
    SType::Int64,
    SType::Float32,
    SType::Float64,
    SType::Str32,
    SType::Str64,
    SType::Obj,
];

impl SType {
    /// Number of bytes a single element occupies in the (first) data buffer.
    pub fn elemsize(&self) -> usize {
        match self {
            SType::Void => 0,
            SType::Bool | SType::Int8 => 1,
            SType::Int16 => 2,
            SType::Int32 | SType::Float32 | SType::Str32 => 4,
            SType::Int64 | SType::Float64 | SType::Str64 => 8,
            SType::Obj => std::mem::size_of::<usize>(),
        }
    }

    /// Returns a short name of this type.
    pub fn name(&self) -> &'static str {
        match self {
            SType::Void => "void",
            SType::Bool => "bool8",
            SType::Int8 => "int8",
            SType::Int16 => "int16",
            SType::Int32 => "int32",
            SType::Int64 => "int64",
            SType::Float32 => "float32",
            SType::Float64 => "float64",
            SType::Str32 => "str32",
            SType::Str64 => "str64",
            SType::Obj => "obj64",
        }
    }

    /// Returns `true` for the signed integer types (not including [SType::Bool]).
    pub fn is_integer(&self) -> bool {
        matches!(self, SType::Int8 | SType::Int16 | SType::Int32 | SType::Int64)
    }

    /// Returns `true` for the floating point types.
    pub fn is_float(&self) -> bool {
        matches!(self, SType::Float32 | SType::Float64)
    }

    /// Returns `true` for the string types.
    pub fn is_string(&self) -> bool {
        matches!(self, SType::Str32 | SType::Str64)
    }

    /// Returns `true` if elements are stored in a single buffer of fixed-size slots.
    pub fn is_fixed_width(&self) -> bool {
        !self.is_string() && *self != SType::Void
    }
}

impl Display for SType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a physical column represents missing values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NaStorage {
    /// The column cannot contain NAs.
    None,
    /// NAs are encoded in-band with a sentinel value.
    Sentinel,
    /// A separate bit mask marks valid elements.
    Bitmask,
    /// Validity is computed on demand, as the column has no storage.
    Virtual,
}

/// Fixed-width primitive types that can be stored directly in a buffer.
pub trait FwElement: Copy + std::fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Value used to encode NA.
    const NA: Self;
    /// Storage type whose elements are of this type.
    const STYPE: SType;

    /// Returns whether this value encodes NA.
    fn is_na(self) -> bool;
}

macro_rules! impl_fw_element_int {
    ($type:ty, $stype:expr) => {
        impl FwElement for $type {
            const NA: Self = <$type>::MIN;
            const STYPE: SType = $stype;

            fn is_na(self) -> bool {
                self == Self::NA
            }
        }
    };
}

impl_fw_element_int!(i8, SType::Int8);
impl_fw_element_int!(i16, SType::Int16);
impl_fw_element_int!(i32, SType::Int32);
impl_fw_element_int!(i64, SType::Int64);

impl FwElement for f32 {
    const NA: Self = f32::NAN;
    const STYPE: SType = SType::Float32;

    fn is_na(self) -> bool {
        self.is_nan()
    }
}

impl FwElement for f64 {
    const NA: Self = f64::NAN;
    const STYPE: SType = SType::Float64;

    fn is_na(self) -> bool {
        self.is_nan()
    }
}

/// Unsigned offset types addressing the character buffer of a string column.
pub trait StrOffset: Copy + std::fmt::Debug + Send + Sync + 'static {
    /// Bit that marks the end offset of an NA element.
    const NA_BIT: Self;
    /// Storage type using this kind of offsets.
    const STYPE: SType;

    /// Returns the offset with the NA flag cleared.
    fn position(self) -> usize;
    /// Returns whether the NA flag is set.
    fn is_na(self) -> bool;
    /// Converts a position into an offset, optionally flagged as NA.
    ///
    /// # Panics
    /// Panics if the position does not fit below the NA bit.
    fn from_position(position: usize, na: bool) -> Self;
}

impl StrOffset for u32 {
    const NA_BIT: Self = 1 << 31;
    const STYPE: SType = SType::Str32;

    fn position(self) -> usize {
        (self & !Self::NA_BIT) as usize
    }

    fn is_na(self) -> bool {
        self & Self::NA_BIT != 0
    }

    fn from_position(position: usize, na: bool) -> Self {
        let offset = u32::try_from(position)
            .ok()
            .filter(|offset| offset & Self::NA_BIT == 0)
            .expect("string data is too large for 32-bit offsets");
        if na {
            offset | Self::NA_BIT
        } else {
            offset
        }
    }
}

impl StrOffset for u64 {
    const NA_BIT: Self = 1 << 63;
    const STYPE: SType = SType::Str64;

    fn position(self) -> usize {
        usize::try_from(self & !Self::NA_BIT).expect("string offset exceeds the address space")
    }

    fn is_na(self) -> bool {
        self & Self::NA_BIT != 0
    }

    fn from_position(position: usize, na: bool) -> Self {
        let offset = position as u64;
        assert!(offset & Self::NA_BIT == 0, "string data is too large");
        if na {
            offset | Self::NA_BIT
        } else {
            offset
        }
    }
}

#[cfg(test)]
mod test {
    use super::{FwElement, SType, StrOffset, STYPES};
    use test_log::test;

    #[test]
    fn sentinels() {
        assert!(i8::NA.is_na());
        assert!(i64::MIN.is_na());
        assert!(!0i32.is_na());
        assert!(f64::NAN.is_na());
        assert!(!f32::INFINITY.is_na());
    }

    #[test]
    fn string_offsets() {
        let offset = u32::from_position(17, true);
        assert!(offset.is_na());
        assert_eq!(offset.position(), 17);
        assert!(!u64::from_position(3, false).is_na());
    }

    #[test]
    fn classification() {
        for stype in STYPES {
            let kinds = [stype.is_integer(), stype.is_float(), stype.is_string()];
            assert!(kinds.iter().filter(|&&k| k).count() <= 1);
        }
        assert_eq!(SType::Bool.elemsize(), 1);
        assert!(!SType::Void.is_fixed_width());
        assert_eq!(SType::Str64.to_string(), "str64");
    }
}
