//! Collections of records sent as one raw blob.
//!
//! Layout inside the carrying parcel:
//!
//! ```text
//! [u32 count]
//!   if count != 0:
//!     [u32 byte_len]   + raw blob of byte_len bytes: count records back to back
//! ```
//!
//! An empty collection is only the zero count; nothing else is written or read.

use bytes::Bytes;
use ipc_transport::{Parcel, ParcelError, Parcelable, MAX_RAWDATA_SIZE};

use super::MAX_ALLOW_SIZE;

/// Owned, still-encoded form of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchBuffer {
    pub count: u32,
    pub bytes: Bytes,
}

impl BatchBuffer {
    pub fn encode<T: Parcelable>(records: &[T]) -> Result<Self, ParcelError> {
        if records.len() > MAX_ALLOW_SIZE {
            return Err(ParcelError::CountOutOfBounds {
                count: u32::try_from(records.len()).unwrap_or(u32::MAX),
                max: MAX_ALLOW_SIZE,
            });
        }
        if records.is_empty() {
            return Ok(Self::default());
        }
        let mut sub = Parcel::with_capacity_limit(MAX_RAWDATA_SIZE);
        for record in records {
            record.marshal(&mut sub)?;
        }
        Ok(Self {
            count: records.len() as u32,
            bytes: Bytes::copy_from_slice(sub.data()),
        })
    }

    /// Parses the blob as an independent parcel holding exactly `count`
    /// records.
    pub fn decode<T: Parcelable>(&self) -> Result<Vec<T>, ParcelError> {
        let count = self.count as usize;
        if count > MAX_ALLOW_SIZE {
            return Err(ParcelError::CountOutOfBounds {
                count: self.count,
                max: MAX_ALLOW_SIZE,
            });
        }
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut sub = Parcel::from_bytes(&self.bytes);
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(T::unmarshal(&mut sub)?);
        }
        if sub.remaining() != 0 {
            return Err(ParcelError::InvalidData("trailing bytes after batch records"));
        }
        Ok(records)
    }

    pub fn write_to(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_u32(self.count)?;
        if self.count == 0 {
            return Ok(());
        }
        let len = u32::try_from(self.bytes.len())
            .map_err(|_| ParcelError::RawDataTooLarge(self.bytes.len()))?;
        parcel.write_u32(len)?;
        parcel.write_raw_data(self.bytes.clone())
    }

    pub fn read_from(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        let count = parcel.read_count(MAX_ALLOW_SIZE)?;
        if count == 0 {
            return Ok(Self::default());
        }
        let len = parcel.read_u32()? as usize;
        if len > MAX_RAWDATA_SIZE {
            return Err(ParcelError::RawDataTooLarge(len));
        }
        let bytes = parcel.read_raw_data(len)?;
        Ok(Self {
            count: count as u32,
            bytes,
        })
    }
}

pub fn write_batch<T: Parcelable>(parcel: &mut Parcel, records: &[T]) -> Result<(), ParcelError> {
    BatchBuffer::encode(records)?.write_to(parcel)
}

pub fn read_batch<T: Parcelable>(parcel: &mut Parcel) -> Result<Vec<T>, ParcelError> {
    BatchBuffer::read_from(parcel)?.decode()
}
