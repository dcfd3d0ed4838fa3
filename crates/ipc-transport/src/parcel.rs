use bytes::Bytes;
use thiserror::Error;

use crate::endpoint::RemoteObject;

/// Hard ceiling for a single raw-data blob carried beside a parcel.
pub const MAX_RAWDATA_SIZE: usize = 128 * 1024 * 1024;
/// Inline data ceiling for a transported parcel.
pub const DEFAULT_PARCEL_CAPACITY: usize = 200 * 1024;
/// Longest string, in bytes, either side accepts.
pub const MAX_STRING_LEN: usize = 64 * 1024;

const ALIGN: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParcelError {
    #[error("unexpected end of parcel")]
    UnexpectedEof,
    #[error("parcel capacity exceeded: {needed} > {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },
    #[error("invalid data: {0}")]
    InvalidData(&'static str),
    #[error("count {count} exceeds bound {max}")]
    CountOutOfBounds { count: u32, max: usize },
    #[error("raw data length {0} exceeds limit")]
    RawDataTooLarge(usize),
    #[error("raw data region missing or mismatched")]
    RawDataMismatch,
    #[error("remote object slot {0} missing")]
    MissingObject(u32),
    #[error("string length {len} exceeds limit {max}")]
    StringTooLong { len: usize, max: usize },
    #[error("invalid {kind} value {value}")]
    InvalidEnum { kind: &'static str, value: i64 },
}

/// A value with a fixed field order on the wire.
///
/// `marshal` and `unmarshal` must visit fields in the same order; there is no
/// version tag, both peers ship together.
pub trait Parcelable: Sized {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError>;
    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError>;
}

/// Message buffer exchanged with a remote object.
///
/// Writes append to the inline data; reads consume it through a cursor.
/// Raw blobs live in a side region that does not count toward the inline
/// capacity, remote objects in an object table referenced by index.
#[derive(Debug, Clone)]
pub struct Parcel {
    data: Vec<u8>,
    pos: usize,
    capacity: usize,
    objects: Vec<RemoteObject>,
    raw: Vec<Bytes>,
    raw_pos: usize,
}

impl Default for Parcel {
    fn default() -> Self {
        Self::new()
    }
}

impl Parcel {
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_PARCEL_CAPACITY)
    }

    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(64),
            pos: 0,
            capacity,
            objects: Vec::new(),
            raw: Vec::new(),
            raw_pos: 0,
        }
    }

    /// Wraps bytes produced by another parcel's [`Parcel::data`] for reading.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            pos: 0,
            capacity: MAX_RAWDATA_SIZE,
            objects: Vec::new(),
            raw: Vec::new(),
            raw_pos: 0,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn raw_size(&self) -> usize {
        self.raw.iter().map(Bytes::len).sum()
    }

    /// Moves both read cursors back to the start.
    pub fn rewind(&mut self) {
        self.pos = 0;
        self.raw_pos = 0;
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), ParcelError> {
        self.write_aligned(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), ParcelError> {
        self.write_aligned(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), ParcelError> {
        self.write_aligned(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), ParcelError> {
        self.write_aligned(&value.to_le_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), ParcelError> {
        self.write_aligned(&value.to_le_bytes())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), ParcelError> {
        self.write_aligned(&value.to_le_bytes())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), ParcelError> {
        self.write_i32(value as i32)
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), ParcelError> {
        if value.len() > MAX_STRING_LEN {
            return Err(ParcelError::StringTooLong {
                len: value.len(),
                max: MAX_STRING_LEN,
            });
        }
        let len = value.len() as i32;
        self.ensure_room(4 + padded(value.len()))?;
        self.write_i32(len)?;
        self.write_aligned(value.as_bytes())
    }

    pub fn write_interface_token(&mut self, descriptor: &str) -> Result<(), ParcelError> {
        self.write_string(descriptor)
    }

    /// Writes a presence flag and, for `Some`, the object's slot index.
    pub fn write_remote_object(&mut self, object: Option<&RemoteObject>) -> Result<(), ParcelError> {
        match object {
            Some(object) => {
                let slot = u32::try_from(self.objects.len())
                    .map_err(|_| ParcelError::InvalidData("object table full"))?;
                self.ensure_room(8)?;
                self.write_bool(true)?;
                self.write_u32(slot)?;
                self.objects.push(object.clone());
                Ok(())
            }
            None => self.write_bool(false),
        }
    }

    /// Appends a blob to the raw side region.
    pub fn write_raw_data(&mut self, bytes: Bytes) -> Result<(), ParcelError> {
        if bytes.len() > MAX_RAWDATA_SIZE {
            return Err(ParcelError::RawDataTooLarge(bytes.len()));
        }
        self.raw.push(bytes);
        Ok(())
    }

    pub fn write_parcelable<T: Parcelable>(&mut self, value: &T) -> Result<(), ParcelError> {
        value.marshal(self)
    }

    /// Count-prefixed inline list.
    pub fn write_parcelable_vec<T: Parcelable>(&mut self, values: &[T]) -> Result<(), ParcelError> {
        self.write_count(values.len())?;
        for value in values {
            value.marshal(self)?;
        }
        Ok(())
    }

    pub fn write_string_vec(&mut self, values: &[String]) -> Result<(), ParcelError> {
        self.write_count(values.len())?;
        for value in values {
            self.write_string(value)?;
        }
        Ok(())
    }

    pub fn write_i64_vec(&mut self, values: &[i64]) -> Result<(), ParcelError> {
        self.write_count(values.len())?;
        for value in values {
            self.write_i64(*value)?;
        }
        Ok(())
    }

    pub fn write_count(&mut self, count: usize) -> Result<(), ParcelError> {
        let count = u32::try_from(count).map_err(|_| ParcelError::InvalidData("count exceeds u32"))?;
        self.write_u32(count)
    }

    pub fn read_i32(&mut self) -> Result<i32, ParcelError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ParcelError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, ParcelError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, ParcelError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, ParcelError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, ParcelError> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, ParcelError> {
        match self.read_i32()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ParcelError::InvalidData("invalid boolean")),
        }
    }

    pub fn read_string(&mut self) -> Result<String, ParcelError> {
        let len = self.read_i32()?;
        let len = usize::try_from(len).map_err(|_| ParcelError::InvalidData("negative string length"))?;
        if len > MAX_STRING_LEN {
            return Err(ParcelError::StringTooLong {
                len,
                max: MAX_STRING_LEN,
            });
        }
        let bytes = self.read_aligned(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ParcelError::InvalidData("invalid utf-8"))
    }

    pub fn read_interface_token(&mut self) -> Result<String, ParcelError> {
        self.read_string()
    }

    pub fn read_remote_object(&mut self) -> Result<Option<RemoteObject>, ParcelError> {
        if !self.read_bool()? {
            return Ok(None);
        }
        let slot = self.read_u32()?;
        self.objects
            .get(slot as usize)
            .cloned()
            .map(Some)
            .ok_or(ParcelError::MissingObject(slot))
    }

    /// Takes the next raw blob, which must be exactly `len` bytes long.
    ///
    /// `len` is checked against [`MAX_RAWDATA_SIZE`] before anything is read.
    pub fn read_raw_data(&mut self, len: usize) -> Result<Bytes, ParcelError> {
        if len > MAX_RAWDATA_SIZE {
            return Err(ParcelError::RawDataTooLarge(len));
        }
        let blob = self.raw.get(self.raw_pos).ok_or(ParcelError::RawDataMismatch)?;
        if blob.len() != len {
            return Err(ParcelError::RawDataMismatch);
        }
        let blob = blob.clone();
        self.raw_pos += 1;
        Ok(blob)
    }

    pub fn read_parcelable<T: Parcelable>(&mut self) -> Result<T, ParcelError> {
        T::unmarshal(self)
    }

    pub fn read_parcelable_vec<T: Parcelable>(&mut self, max: usize) -> Result<Vec<T>, ParcelError> {
        let count = self.read_count(max)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(T::unmarshal(self)?);
        }
        Ok(values)
    }

    pub fn read_string_vec(&mut self, max: usize) -> Result<Vec<String>, ParcelError> {
        let count = self.read_count(max)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_string()?);
        }
        Ok(values)
    }

    pub fn read_i64_vec(&mut self, max: usize) -> Result<Vec<i64>, ParcelError> {
        let count = self.read_count(max)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_i64()?);
        }
        Ok(values)
    }

    /// Reads an element count, rejecting anything above `max` before the
    /// caller allocates for it.
    pub fn read_count(&mut self, max: usize) -> Result<usize, ParcelError> {
        let count = self.read_u32()?;
        if count as usize > max {
            return Err(ParcelError::CountOutOfBounds { count, max });
        }
        Ok(count as usize)
    }

    fn ensure_room(&self, len: usize) -> Result<(), ParcelError> {
        let needed = self.data.len() + len;
        if needed > self.capacity {
            return Err(ParcelError::CapacityExceeded {
                needed,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn write_aligned(&mut self, bytes: &[u8]) -> Result<(), ParcelError> {
        let total = padded(bytes.len());
        self.ensure_room(total)?;
        self.data.extend_from_slice(bytes);
        self.data.resize(self.data.len() + (total - bytes.len()), 0);
        Ok(())
    }

    fn read_aligned(&mut self, len: usize) -> Result<&[u8], ParcelError> {
        let total = padded(len);
        if total > self.remaining() {
            return Err(ParcelError::UnexpectedEof);
        }
        let start = self.pos;
        self.pos += total;
        Ok(&self.data[start..start + len])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ParcelError> {
        let slice = self.read_aligned(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

fn padded(len: usize) -> usize {
    (len + ALIGN - 1) & !(ALIGN - 1)
}
