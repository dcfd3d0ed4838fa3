//! Wire layout of every value in [`crate::model`].
//!
//! Each type marshals its fields in declaration order with no framing or
//! version tag; both peers are deployed together. Inline collections are
//! count-prefixed and bounded by [`MAX_ALLOW_SIZE`]. Large collections of
//! elements go through [`batch`] instead.

pub mod batch;
mod element;
mod payload;

use std::collections::BTreeMap;

use ipc_transport::{Parcel, ParcelError};

use crate::model::WireEnum;

pub use batch::{read_batch, write_batch, BatchBuffer};

/// Upper bound for any count read off the wire.
pub const MAX_ALLOW_SIZE: usize = 5000;

/// Typed helpers layered over [`Parcel`].
pub trait ParcelExt {
    fn write_enum<E: WireEnum>(&mut self, value: E) -> Result<(), ParcelError>;

    /// Fails with [`ParcelError::InvalidEnum`] for values outside the set.
    fn read_enum<E: WireEnum>(&mut self) -> Result<E, ParcelError>;

    fn write_optional<T: ipc_transport::Parcelable>(
        &mut self,
        value: Option<&T>,
    ) -> Result<(), ParcelError>;

    fn read_optional<T: ipc_transport::Parcelable>(&mut self) -> Result<Option<T>, ParcelError>;

    fn write_string_map(&mut self, map: &BTreeMap<String, String>) -> Result<(), ParcelError>;

    fn read_string_map(&mut self) -> Result<BTreeMap<String, String>, ParcelError>;
}

impl ParcelExt for Parcel {
    fn write_enum<E: WireEnum>(&mut self, value: E) -> Result<(), ParcelError> {
        self.write_i32(value.value())
    }

    fn read_enum<E: WireEnum>(&mut self) -> Result<E, ParcelError> {
        let raw = self.read_i32()?;
        E::from_value(raw).ok_or(ParcelError::InvalidEnum {
            kind: E::KIND,
            value: raw as i64,
        })
    }

    fn write_optional<T: ipc_transport::Parcelable>(
        &mut self,
        value: Option<&T>,
    ) -> Result<(), ParcelError> {
        match value {
            Some(value) => {
                self.write_bool(true)?;
                value.marshal(self)
            }
            None => self.write_bool(false),
        }
    }

    fn read_optional<T: ipc_transport::Parcelable>(&mut self) -> Result<Option<T>, ParcelError> {
        if self.read_bool()? {
            Ok(Some(T::unmarshal(self)?))
        } else {
            Ok(None)
        }
    }

    fn write_string_map(&mut self, map: &BTreeMap<String, String>) -> Result<(), ParcelError> {
        self.write_count(map.len())?;
        for (key, value) in map {
            self.write_string(key)?;
            self.write_string(value)?;
        }
        Ok(())
    }

    fn read_string_map(&mut self) -> Result<BTreeMap<String, String>, ParcelError> {
        let mut map = BTreeMap::new();
        for _ in 0..self.read_count(MAX_ALLOW_SIZE)? {
            let key = self.read_string()?;
            map.insert(key, self.read_string()?);
        }
        Ok(map)
    }
}

/// Element with every nested section populated.
#[cfg(test)]
pub(crate) fn sample_element(element_id: i64) -> crate::model::ElementInfo {
    use crate::model::{
        AccessibleAction, ActionType, ElementInfo, GridInfo, GridItemInfo, RangeInfo, Rect,
        SpanInfo,
    };

    let mut info = ElementInfo::new(3, element_id);
    info.parent_id = 1;
    info.bundle_name = "com.example.notes".into();
    info.component_type = "Button".into();
    info.text = format!("item {element_id}");
    info.child_ids = vec![element_id * 10, element_id * 10 + 1];
    info.offset = 1.5;
    info.clickable = true;
    info.accessibility_focused = element_id % 2 == 0;
    info.rect = Rect::new(0, 10, 200, 60);
    info.range = RangeInfo {
        min: 0.0,
        max: 100.0,
        current: 42.5,
    };
    info.grid = GridInfo {
        row_count: 4,
        column_count: 2,
        selection_mode: 1,
    };
    info.grid_item = GridItemInfo {
        heading: true,
        column_index: 1,
        row_index: 2,
        column_span: 1,
        row_span: 1,
        selected: false,
    };
    info.actions = vec![
        AccessibleAction::new(ActionType::Click, "tap"),
        AccessibleAction::new(ActionType::AccessibilityFocus, ""),
    ];
    info.extra.string_values.insert("CheckboxGroupSelectedStatus".into(), "1".into());
    info.extra.int_values.insert("hierarchyLevel".into(), 2);
    info.spans = vec![SpanInfo {
        span_id: 9,
        span_text: "link".into(),
        ..SpanInfo::default()
    }];
    info
}
