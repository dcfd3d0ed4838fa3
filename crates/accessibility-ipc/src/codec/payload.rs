use ipc_transport::{Parcel, ParcelError, Parcelable};

use super::{ParcelExt, MAX_ALLOW_SIZE};
use crate::model::{
    AbilityInfo, CaptionProperty, ElementBasicInfo, EventInfo, GesturePath, GesturePoint,
    KeyEvent, Rect, RegistrationPara, WindowInfo,
};

impl Parcelable for WindowInfo {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_i32(self.window_id)?;
        parcel.write_enum(self.window_type)?;
        parcel.write_i32(self.layer)?;
        self.bounds.marshal(parcel)?;
        parcel.write_bool(self.active)?;
        parcel.write_bool(self.focused)?;
        parcel.write_bool(self.accessibility_focused)?;
        parcel.write_u64(self.display_id)?;
        parcel.write_i32(self.inner_window_id)?;
        parcel.write_i32(self.main_window_id)?;
        parcel.write_string(&self.bundle_name)?;
        parcel.write_parcelable_vec(&self.touch_hot_areas)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            window_id: parcel.read_i32()?,
            window_type: parcel.read_enum()?,
            layer: parcel.read_i32()?,
            bounds: Rect::unmarshal(parcel)?,
            active: parcel.read_bool()?,
            focused: parcel.read_bool()?,
            accessibility_focused: parcel.read_bool()?,
            display_id: parcel.read_u64()?,
            inner_window_id: parcel.read_i32()?,
            main_window_id: parcel.read_i32()?,
            bundle_name: parcel.read_string()?,
            touch_hot_areas: parcel.read_parcelable_vec(MAX_ALLOW_SIZE)?,
        })
    }
}

impl Parcelable for EventInfo {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_enum(self.event_type)?;
        parcel.write_i32(self.window_id)?;
        parcel.write_i64(self.element_id)?;
        parcel.write_i32(self.page_id)?;
        parcel.write_string(&self.bundle_name)?;
        parcel.write_string(&self.component_type)?;
        parcel.write_enum(self.text_move_unit)?;
        parcel.write_i32(self.gesture_type)?;
        parcel.write_i32(self.window_change_types)?;
        parcel.write_string_vec(&self.contents)?;
        parcel.write_string(&self.description)?;
        parcel.write_string(&self.before_text)?;
        parcel.write_string(&self.latest_content)?;
        parcel.write_i64(self.timestamp_ms)?;
        parcel.write_i64(self.request_focus_element_id)?;
        parcel.write_optional(self.element_info.as_ref())
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            event_type: parcel.read_enum()?,
            window_id: parcel.read_i32()?,
            element_id: parcel.read_i64()?,
            page_id: parcel.read_i32()?,
            bundle_name: parcel.read_string()?,
            component_type: parcel.read_string()?,
            text_move_unit: parcel.read_enum()?,
            gesture_type: parcel.read_i32()?,
            window_change_types: parcel.read_i32()?,
            contents: parcel.read_string_vec(MAX_ALLOW_SIZE)?,
            description: parcel.read_string()?,
            before_text: parcel.read_string()?,
            latest_content: parcel.read_string()?,
            timestamp_ms: parcel.read_i64()?,
            request_focus_element_id: parcel.read_i64()?,
            element_info: parcel.read_optional()?,
        })
    }
}

impl Parcelable for KeyEvent {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_i32(self.key_code)?;
        parcel.write_i32(self.action)?;
        parcel.write_i64(self.action_time)?;
        parcel.write_i32(self.device_id)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            key_code: parcel.read_i32()?,
            action: parcel.read_i32()?,
            action_time: parcel.read_i64()?,
            device_id: parcel.read_i32()?,
        })
    }
}

impl Parcelable for GesturePoint {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_f32(self.x)?;
        parcel.write_f32(self.y)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            x: parcel.read_f32()?,
            y: parcel.read_f32()?,
        })
    }
}

impl Parcelable for GesturePath {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_parcelable_vec(&self.points)?;
        parcel.write_i64(self.duration_ms)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            points: parcel.read_parcelable_vec(MAX_ALLOW_SIZE)?,
            duration_ms: parcel.read_i64()?,
        })
    }
}

impl Parcelable for AbilityInfo {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_string(&self.id)?;
        parcel.write_string(&self.name)?;
        parcel.write_string(&self.bundle_name)?;
        parcel.write_string(&self.module_name)?;
        parcel.write_string(&self.description)?;
        parcel.write_u32(self.ability_types)?;
        parcel.write_u32(self.capabilities)?;
        parcel.write_u32(self.event_types)?;
        parcel.write_string_vec(&self.target_bundle_names)?;
        parcel.write_bool(self.is_important)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            id: parcel.read_string()?,
            name: parcel.read_string()?,
            bundle_name: parcel.read_string()?,
            module_name: parcel.read_string()?,
            description: parcel.read_string()?,
            ability_types: parcel.read_u32()?,
            capabilities: parcel.read_u32()?,
            event_types: parcel.read_u32()?,
            target_bundle_names: parcel.read_string_vec(MAX_ALLOW_SIZE)?,
            is_important: parcel.read_bool()?,
        })
    }
}

impl Parcelable for CaptionProperty {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_bool(self.enabled)?;
        parcel.write_string(&self.font_family)?;
        parcel.write_i32(self.font_scale)?;
        parcel.write_u32(self.font_color)?;
        parcel.write_string(&self.font_edge_type)?;
        parcel.write_u32(self.background_color)?;
        parcel.write_u32(self.window_color)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            enabled: parcel.read_bool()?,
            font_family: parcel.read_string()?,
            font_scale: parcel.read_i32()?,
            font_color: parcel.read_u32()?,
            font_edge_type: parcel.read_string()?,
            background_color: parcel.read_u32()?,
            window_color: parcel.read_u32()?,
        })
    }
}

impl Parcelable for ElementBasicInfo {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_i32(self.window_id)?;
        parcel.write_i32(self.tree_id)?;
        parcel.write_i64(self.element_id)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            window_id: parcel.read_i32()?,
            tree_id: parcel.read_i32()?,
            element_id: parcel.read_i64()?,
        })
    }
}

impl Parcelable for RegistrationPara {
    fn marshal(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_i32(self.window_id)?;
        parcel.write_i32(self.parent_window_id)?;
        parcel.write_i32(self.parent_tree_id)?;
        parcel.write_i64(self.element_id)
    }

    fn unmarshal(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            window_id: parcel.read_i32()?,
            parent_window_id: parcel.read_i32()?,
            parent_tree_id: parcel.read_i32()?,
            element_id: parcel.read_i64()?,
        })
    }
}
