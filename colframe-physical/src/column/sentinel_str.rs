//! This module defines [SentinelStr], a column of strings.

use crate::{
    buffer::{Buffer, Pod},
    ensure_integrity,
    error::Error,
    stype::{NaStorage, SType, StrOffset},
};

use super::column_impl::ColumnImpl;

/// Strings stored back to back in a character buffer.
///
/// The offsets buffer holds `nrows + 1` offsets, starting with zero. Element `i`
/// spans the characters from `offsets[i]` to `offsets[i + 1]`, and is NA if the
/// NA bit of `offsets[i + 1]` is set. Offsets are [`u32`] for [SType::Str32]
/// and [`u64`] for [SType::Str64].
#[derive(Debug, Clone)]
pub(crate) struct SentinelStr {
    offsets: Buffer,
    strdata: Buffer,
    wide: bool,
}

/// Largest amount of character data that 32-bit offsets can address.
const MAX_STR32: usize = (u32::NA_BIT - 1) as usize;

fn encode<O: StrOffset + Pod, S: AsRef<str>>(values: &[Option<S>]) -> (Vec<O>, Vec<u8>) {
    let mut offsets = Vec::with_capacity(values.len() + 1);
    let mut strdata = Vec::new();
    offsets.push(O::from_position(0, false));

    for value in values {
        if let Some(value) = value {
            strdata.extend_from_slice(value.as_ref().as_bytes());
        }
        offsets.push(O::from_position(strdata.len(), value.is_none()));
    }

    (offsets, strdata)
}

impl SentinelStr {
    pub(crate) fn new(stype: SType, offsets: Buffer, strdata: Buffer) -> Self {
        debug_assert!(stype.is_string());
        Self {
            offsets,
            strdata,
            wide: stype == SType::Str64,
        }
    }

    /// Stores `values` in a column of type `stype`.
    pub(crate) fn from_strings<S: AsRef<str>>(
        values: &[Option<S>],
        stype: SType,
    ) -> Result<Self, Error> {
        let (offsets, strdata) = if stype == SType::Str64 {
            let (offsets, strdata) = encode::<u64, S>(values);
            (Buffer::from_slice(&offsets)?, strdata)
        } else {
            let total = values
                .iter()
                .flatten()
                .map(|value| value.as_ref().len())
                .sum::<usize>();
            if total > MAX_STR32 {
                return Err(Error::Value(format!(
                    "{total} bytes of string data cannot be addressed by {stype} offsets"
                )));
            }
            let (offsets, strdata) = encode::<u32, S>(values);
            (Buffer::from_slice(&offsets)?, strdata)
        };

        Ok(Self::new(stype, offsets, Buffer::from_bytes(&strdata)?))
    }

    /// Returns the type that fits the given strings best.
    pub(crate) fn stype_for<S: AsRef<str>>(values: &[Option<S>]) -> SType {
        let total = values
            .iter()
            .flatten()
            .map(|value| value.as_ref().len())
            .sum::<usize>();
        if total > MAX_STR32 {
            SType::Str64
        } else {
            SType::Str32
        }
    }

    fn read<O: StrOffset + Pod>(&self, row: usize) -> Option<String> {
        let end = self.offsets.get_element::<O>(row + 1);
        if end.is_na() {
            return None;
        }
        let start = self.offsets.get_element::<O>(row).position();

        let chars = self.strdata.rdata();
        Some(String::from_utf8_lossy(&chars[start..end.position()]).into_owned())
    }

    fn positions<O: StrOffset + Pod>(&self) -> Vec<(usize, bool)> {
        self.offsets
            .to_vec::<O>()
            .into_iter()
            .map(|offset| (offset.position(), offset.is_na()))
            .collect()
    }
}

impl ColumnImpl for SentinelStr {
    fn name(&self) -> &'static str {
        "sentinel_str"
    }

    fn is_virtual(&self) -> bool {
        false
    }

    fn na_storage(&self) -> NaStorage {
        NaStorage::Sentinel
    }

    fn num_data_buffers(&self) -> usize {
        2
    }

    fn data_buffer(&self, k: usize) -> &Buffer {
        match k {
            0 => &self.offsets,
            1 => &self.strdata,
            _ => panic!("string columns have two data buffers, requested {k}"),
        }
    }

    fn data_buffer_mut(&mut self, k: usize) -> &mut Buffer {
        match k {
            0 => &mut self.offsets,
            1 => &mut self.strdata,
            _ => panic!("string columns have two data buffers, requested {k}"),
        }
    }

    fn get_str(&self, row: usize) -> Option<String> {
        if self.wide {
            self.read::<u64>(row)
        } else {
            self.read::<u32>(row)
        }
    }

    fn verify(&self, nrows: usize, stype: SType) -> Result<(), Error> {
        ensure_integrity!(stype.is_string(), "string column cannot have type {stype}");
        ensure_integrity!(
            self.wide == (stype == SType::Str64),
            "offsets of a {stype} column have the wrong width"
        );
        let required = (nrows + 1) * stype.elemsize();
        ensure_integrity!(
            self.offsets.size() >= required,
            "offsets buffer has {} bytes, but {nrows} rows need {required}",
            self.offsets.size()
        );

        let positions = if self.wide {
            self.positions::<u64>()
        } else {
            self.positions::<u32>()
        };
        ensure_integrity!(
            positions[0] == (0, false),
            "first string offset is {:?} instead of zero",
            positions[0]
        );
        for row in 0..nrows {
            ensure_integrity!(
                positions[row].0 <= positions[row + 1].0,
                "string offsets decrease in row {row}: {} > {}",
                positions[row].0,
                positions[row + 1].0
            );
            ensure_integrity!(
                !positions[row + 1].1 || positions[row].0 == positions[row + 1].0,
                "NA string in row {row} has non-empty data"
            );
        }
        ensure_integrity!(
            positions[nrows].0 <= self.strdata.size(),
            "string offsets reach {}, but the character buffer has {} bytes",
            positions[nrows].0,
            self.strdata.size()
        );

        self.offsets.verify_integrity()?;
        self.strdata.verify_integrity()
    }
}
