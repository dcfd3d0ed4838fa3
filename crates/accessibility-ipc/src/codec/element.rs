use std::collections::BTreeMap;

use ipc_transport::{Parcel, ParcelError, Parcelable};

use super::{ParcelExt, MAX_ALLOW_SIZE};
use crate::model::{
    AccessibleAction, ElementInfo, ExtraElementInfo, GridInfo, GridItemInfo, RangeInfo, Rect,
    SpanInfo,
};

impl Parcelable for Rect {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_i32(self.left_top_x)?;
        parcel.write_i32(self.left_top_y)?;
        parcel.write_i32(self.right_bottom_x)?;
        parcel.write_i32(self.right_bottom_y)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            left_top_x: parcel.read_i32()?,
            left_top_y: parcel.read_i32()?,
            right_bottom_x: parcel.read_i32()?,
            right_bottom_y: parcel.read_i32()?,
        })
    }
}

impl Parcelable for RangeInfo {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_f64(self.min)?;
        parcel.write_f64(self.max)?;
        parcel.write_f64(self.current)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            min: parcel.read_f64()?,
            max: parcel.read_f64()?,
            current: parcel.read_f64()?,
        })
    }
}

impl Parcelable for GridInfo {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_i32(self.row_count)?;
        parcel.write_i32(self.column_count)?;
        parcel.write_i32(self.selection_mode)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            row_count: parcel.read_i32()?,
            column_count: parcel.read_i32()?,
            selection_mode: parcel.read_i32()?,
        })
    }
}

impl Parcelable for GridItemInfo {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_bool(self.heading)?;
        parcel.write_i32(self.column_index)?;
        parcel.write_i32(self.row_index)?;
        parcel.write_i32(self.column_span)?;
        parcel.write_i32(self.row_span)?;
        parcel.write_bool(self.selected)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            heading: parcel.read_bool()?,
            column_index: parcel.read_i32()?,
            row_index: parcel.read_i32()?,
            column_span: parcel.read_i32()?,
            row_span: parcel.read_i32()?,
            selected: parcel.read_bool()?,
        })
    }
}

impl Parcelable for AccessibleAction {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_enum(self.action_type)?;
        parcel.write_string(&self.description)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            action_type: parcel.read_enum()?,
            description: parcel.read_string()?,
        })
    }
}

impl Parcelable for ExtraElementInfo {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_string_map(&self.string_values)?;
        parcel.write_count(self.int_values.len())?;
        for (key, value) in &self.int_values {
            parcel.write_string(key)?;
            parcel.write_i32(*value)?;
        }
        Ok(())
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        let string_values = parcel.read_string_map()?;
        let mut int_values = BTreeMap::new();
        for _ in 0..parcel.read_count(MAX_ALLOW_SIZE)? {
            let key = parcel.read_string()?;
            int_values.insert(key, parcel.read_i32()?);
        }
        Ok(Self {
            string_values,
            int_values,
        })
    }
}

impl Parcelable for SpanInfo {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_i32(self.span_id)?;
        parcel.write_string(&self.span_text)?;
        parcel.write_string(&self.accessibility_text)?;
        parcel.write_string(&self.accessibility_description)?;
        parcel.write_string(&self.accessibility_level)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            span_id: parcel.read_i32()?,
            span_text: parcel.read_string()?,
            accessibility_text: parcel.read_string()?,
            accessibility_description: parcel.read_string()?,
            accessibility_level: parcel.read_string()?,
        })
    }
}

impl Parcelable for ElementInfo {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_i32(self.page_id)?;
        parcel.write_i32(self.window_id)?;
        parcel.write_i64(self.element_id)?;
        parcel.write_i64(self.parent_id)?;
        parcel.write_i32(self.belong_tree_id)?;
        parcel.write_i32(self.child_tree_id)?;
        parcel.write_i32(self.child_window_id)?;
        parcel.write_i32(self.parent_window_id)?;
        parcel.write_i32(self.main_window_id)?;

        for text in [
            &self.bundle_name,
            &self.component_type,
            &self.text,
            &self.hint_text,
            &self.description,
            &self.component_resource_id,
            &self.accessibility_text,
            &self.accessibility_description,
            &self.accessibility_level,
            &self.latest_content,
            &self.error,
            &self.text_type,
        ] {
            parcel.write_string(text)?;
        }

        parcel.write_i64_vec(&self.child_ids)?;

        parcel.write_i32(self.text_length_limit)?;
        parcel.write_i32(self.current_index)?;
        parcel.write_i32(self.begin_index)?;
        parcel.write_i32(self.end_index)?;
        parcel.write_i32(self.items_length)?;
        parcel.write_i32(self.input_type)?;
        parcel.write_i32(self.live_region)?;
        parcel.write_i64(self.label_id)?;
        parcel.write_i64(self.navi_destination_id)?;
        parcel.write_f32(self.offset)?;
        parcel.write_i32(self.text_move_step)?;

        for flag in [
            self.checkable,
            self.checked,
            self.focusable,
            self.focused,
            self.visible,
            self.accessibility_focused,
            self.selected,
            self.clickable,
            self.long_clickable,
            self.enabled,
            self.password,
            self.scrollable,
            self.editable,
            self.multi_line,
            self.deletable,
            self.hinting,
            self.essential,
            self.content_invalid,
            self.accessibility_group,
            self.accessibility_visible,
            self.active,
            self.valid,
        ] {
            parcel.write_bool(flag)?;
        }

        self.rect.marshal(parcel)?;
        self.range.marshal(parcel)?;
        self.grid.marshal(parcel)?;
        self.grid_item.marshal(parcel)?;
        parcel.write_parcelable_vec(&self.actions)?;
        self.extra.marshal(parcel)?;
        parcel.write_parcelable_vec(&self.spans)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            page_id: parcel.read_i32()?,
            window_id: parcel.read_i32()?,
            element_id: parcel.read_i64()?,
            parent_id: parcel.read_i64()?,
            belong_tree_id: parcel.read_i32()?,
            child_tree_id: parcel.read_i32()?,
            child_window_id: parcel.read_i32()?,
            parent_window_id: parcel.read_i32()?,
            main_window_id: parcel.read_i32()?,

            bundle_name: parcel.read_string()?,
            component_type: parcel.read_string()?,
            text: parcel.read_string()?,
            hint_text: parcel.read_string()?,
            description: parcel.read_string()?,
            component_resource_id: parcel.read_string()?,
            accessibility_text: parcel.read_string()?,
            accessibility_description: parcel.read_string()?,
            accessibility_level: parcel.read_string()?,
            latest_content: parcel.read_string()?,
            error: parcel.read_string()?,
            text_type: parcel.read_string()?,

            child_ids: parcel.read_i64_vec(MAX_ALLOW_SIZE)?,

            text_length_limit: parcel.read_i32()?,
            current_index: parcel.read_i32()?,
            begin_index: parcel.read_i32()?,
            end_index: parcel.read_i32()?,
            items_length: parcel.read_i32()?,
            input_type: parcel.read_i32()?,
            live_region: parcel.read_i32()?,
            label_id: parcel.read_i64()?,
            navi_destination_id: parcel.read_i64()?,
            offset: parcel.read_f32()?,
            text_move_step: parcel.read_i32()?,

            checkable: parcel.read_bool()?,
            checked: parcel.read_bool()?,
            focusable: parcel.read_bool()?,
            focused: parcel.read_bool()?,
            visible: parcel.read_bool()?,
            accessibility_focused: parcel.read_bool()?,
            selected: parcel.read_bool()?,
            clickable: parcel.read_bool()?,
            long_clickable: parcel.read_bool()?,
            enabled: parcel.read_bool()?,
            password: parcel.read_bool()?,
            scrollable: parcel.read_bool()?,
            editable: parcel.read_bool()?,
            multi_line: parcel.read_bool()?,
            deletable: parcel.read_bool()?,
            hinting: parcel.read_bool()?,
            essential: parcel.read_bool()?,
            content_invalid: parcel.read_bool()?,
            accessibility_group: parcel.read_bool()?,
            accessibility_visible: parcel.read_bool()?,
            active: parcel.read_bool()?,
            valid: parcel.read_bool()?,

            rect: Rect::unmarshal(parcel)?,
            range: RangeInfo::unmarshal(parcel)?,
            grid: GridInfo::unmarshal(parcel)?,
            grid_item: GridItemInfo::unmarshal(parcel)?,
            actions: parcel.read_parcelable_vec(MAX_ALLOW_SIZE)?,
            extra: ExtraElementInfo::unmarshal(parcel)?,
            spans: parcel.read_parcelable_vec(MAX_ALLOW_SIZE)?,
        })
    }
}
