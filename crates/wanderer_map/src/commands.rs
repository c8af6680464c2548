//! Typed single-attribute updates for systems and connections.
//!
//! API clients address attributes by name; [`SystemUpdate::from_attribute`]
//! and [`ConnectionUpdate::from_attribute`] turn those into a closed set of
//! variants. Unknown attribute names or unusable values parse to `None` and
//! are ignored by the engine.

use crate::types::{
    Connection, ConnectionType, MassStatus, Position, ShipSizeType, System, SystemStatus, TimeStatus,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "attribute", content = "value", rename_all = "snake_case")]
pub enum SystemUpdate {
    Name(Option<String>),
    TemporaryName(Option<String>),
    Description(Option<String>),
    Status(SystemStatus),
    Tag(Option<String>),
    Locked(bool),
    Labels(Option<String>),
    Position(Position),
    LinkedSignature(Option<String>),
}

impl SystemUpdate {
    pub fn from_attribute(attribute: &str, value: &Value) -> Option<Self> {
        Some(match attribute {
            "name" | "custom_name" => Self::Name(optional_text(value)?),
            "temporary_name" => Self::TemporaryName(optional_text(value)?),
            "description" => Self::Description(optional_text(value)?),
            "status" => Self::Status(coded(value, SystemStatus::from_code)?),
            "tag" => Self::Tag(optional_text(value)?),
            "locked" => Self::Locked(value.as_bool()?),
            "labels" => Self::Labels(optional_text(value)?),
            "position" => Self::Position(Position::new(
                value.get("x")?.as_i64()?.try_into().ok()?,
                value.get("y")?.as_i64()?.try_into().ok()?,
            )),
            "linked_sig_eve_id" | "linked_signature_eve_id" => Self::LinkedSignature(optional_text(value)?),
            _ => return None,
        })
    }

    pub fn attribute(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::TemporaryName(_) => "temporary_name",
            Self::Description(_) => "description",
            Self::Status(_) => "status",
            Self::Tag(_) => "tag",
            Self::Locked(_) => "locked",
            Self::Labels(_) => "labels",
            Self::Position(_) => "position",
            Self::LinkedSignature(_) => "linked_signature_eve_id",
        }
    }

    pub(crate) fn apply(self, system: &mut System) {
        match self {
            Self::Name(name) => system.custom_name = name,
            Self::TemporaryName(name) => system.temporary_name = name,
            Self::Description(description) => system.description = description,
            Self::Status(status) => system.status = status,
            Self::Tag(tag) => system.tag = tag,
            Self::Locked(locked) => system.locked = locked,
            Self::Labels(labels) => system.labels = labels,
            Self::Position(position) => {
                system.position_x = position.x;
                system.position_y = position.y;
            }
            Self::LinkedSignature(eve_id) => system.linked_signature_eve_id = eve_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "attribute", content = "value", rename_all = "snake_case")]
pub enum ConnectionUpdate {
    MassStatus(MassStatus),
    TimeStatus(TimeStatus),
    ShipSizeType(ShipSizeType),
    Type(ConnectionType),
    Locked(bool),
    CustomInfo(Option<String>),
}

impl ConnectionUpdate {
    pub fn from_attribute(attribute: &str, value: &Value) -> Option<Self> {
        Some(match attribute {
            "mass_status" => Self::MassStatus(coded(value, |code| match code {
                0 => Some(MassStatus::Normal),
                1 => Some(MassStatus::Reduced),
                2 => Some(MassStatus::Critical),
                _ => None,
            })?),
            "time_status" => Self::TimeStatus(coded(value, |code| match code {
                0 => Some(TimeStatus::Normal),
                1 => Some(TimeStatus::EndOfLife),
                _ => None,
            })?),
            "ship_size_type" => Self::ShipSizeType(coded(value, |code| match code {
                0 => Some(ShipSizeType::Small),
                1 => Some(ShipSizeType::Medium),
                2 => Some(ShipSizeType::Large),
                3 => Some(ShipSizeType::Freight),
                4 => Some(ShipSizeType::Capital),
                _ => None,
            })?),
            "type" => Self::Type(coded(value, |code| match code {
                0 => Some(ConnectionType::Wormhole),
                1 => Some(ConnectionType::Stargate),
                _ => None,
            })?),
            "locked" => Self::Locked(value.as_bool()?),
            "custom_info" => Self::CustomInfo(optional_text(value)?),
            _ => return None,
        })
    }

    pub fn attribute(&self) -> &'static str {
        match self {
            Self::MassStatus(_) => "mass_status",
            Self::TimeStatus(_) => "time_status",
            Self::ShipSizeType(_) => "ship_size_type",
            Self::Type(_) => "type",
            Self::Locked(_) => "locked",
            Self::CustomInfo(_) => "custom_info",
        }
    }

    pub(crate) fn apply(self, connection: &mut Connection) {
        match self {
            Self::MassStatus(status) => connection.mass_status = status,
            Self::TimeStatus(status) => connection.time_status = status,
            Self::ShipSizeType(size) => connection.ship_size_type = size,
            Self::Type(connection_type) => connection.connection_type = connection_type,
            Self::Locked(locked) => connection.locked = locked,
            Self::CustomInfo(info) => connection.custom_info = info,
        }
    }
}

/// `null` and `""` clear the field; any other string sets it.
fn optional_text(value: &Value) -> Option<Option<String>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) if s.is_empty() => Some(None),
        Value::String(s) => Some(Some(s.clone())),
        _ => None,
    }
}

/// Accepts either the enum's snake_case name or its numeric code.
fn coded<T: DeserializeOwned>(value: &Value, from_code: impl Fn(i64) -> Option<T>) -> Option<T> {
    match value {
        Value::Number(n) => from_code(n.as_i64()?),
        Value::String(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_system_attributes() {
        assert_eq!(
            SystemUpdate::from_attribute("status", &json!(3)),
            Some(SystemUpdate::Status(SystemStatus::TargetPrimary))
        );
        assert_eq!(
            SystemUpdate::from_attribute("status", &json!("home")),
            Some(SystemUpdate::Status(SystemStatus::Home))
        );
        assert_eq!(
            SystemUpdate::from_attribute("tag", &json!("")),
            Some(SystemUpdate::Tag(None))
        );
        assert_eq!(
            SystemUpdate::from_attribute("position", &json!({"x": 10, "y": -4})),
            Some(SystemUpdate::Position(Position::new(10, -4)))
        );
    }

    #[test]
    fn unknown_attributes_and_bad_values_are_dropped() {
        assert_eq!(SystemUpdate::from_attribute("colour", &json!("red")), None);
        assert_eq!(SystemUpdate::from_attribute("locked", &json!("yes")), None);
        assert_eq!(ConnectionUpdate::from_attribute("wormhole_type", &json!("K162")), None);
        assert_eq!(ConnectionUpdate::from_attribute("mass_status", &json!(9)), None);
    }

    #[test]
    fn parses_connection_attributes() {
        assert_eq!(
            ConnectionUpdate::from_attribute("mass_status", &json!(2)),
            Some(ConnectionUpdate::MassStatus(MassStatus::Critical))
        );
        assert_eq!(
            ConnectionUpdate::from_attribute("time_status", &json!("end_of_life")),
            Some(ConnectionUpdate::TimeStatus(TimeStatus::EndOfLife))
        );
        assert_eq!(
            ConnectionUpdate::from_attribute("type", &json!(1)),
            Some(ConnectionUpdate::Type(ConnectionType::Stargate))
        );
    }

    #[test]
    fn apply_changes_one_field() {
        let mut system = System::new(crate::types::MapId::new(), 1, "A", Position::default());
        SystemUpdate::Locked(true).apply(&mut system);
        assert!(system.locked);
        assert_eq!(system.tag, None);
    }
}
