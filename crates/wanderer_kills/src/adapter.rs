//! Normalizes incoming killmail payloads.
//!
//! Three shapes arrive on the feed:
//!
//! - **flat**: already the internal shape (`kill_time`, a `victim` object
//!   with flat fields, optional `final_blow`); validated and passed through
//! - **nested**: the service shape with `victim`, an `attackers` array and a
//!   `zkb` object; flattened, keeping the attacker flagged `final_blow`
//! - **legacy zKillboard**: recognised and rejected
//!
//! Anything else is rejected with a typed [`AdapterError`].

use crate::error::AdapterError;
use crate::time_handler::parse_kill_time;
use crate::types::{Killmail, Participant};
use serde_json::{Map, Value};

/// Payload shapes the adapter can tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Flat,
    Nested,
    LegacyZkillboard,
    Unknown,
}

pub fn detect_shape(payload: &Value) -> PayloadShape {
    let Some(object) = payload.as_object() else {
        return PayloadShape::Unknown;
    };

    if object.contains_key("killID") || (object.contains_key("zkb") && !object.contains_key("victim")) {
        PayloadShape::LegacyZkillboard
    } else if object.contains_key("attackers") || object.contains_key("zkb") {
        PayloadShape::Nested
    } else if ["killmail_id", "kill_time", "victim"]
        .iter()
        .any(|key| object.contains_key(*key))
    {
        PayloadShape::Flat
    } else {
        PayloadShape::Unknown
    }
}

/// Turns any supported payload into a [`Killmail`].
pub fn adapt_kill_data(payload: &Value) -> Result<Killmail, AdapterError> {
    match detect_shape(payload) {
        PayloadShape::Flat => adapt_flat(as_object(payload)?),
        PayloadShape::Nested => adapt_nested(as_object(payload)?),
        PayloadShape::LegacyZkillboard => Err(AdapterError::ZkillboardFormatNotSupported),
        PayloadShape::Unknown => Err(AdapterError::InvalidFormat),
    }
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, AdapterError> {
    payload.as_object().ok_or(AdapterError::InvalidFormat)
}

/// Required fields shared by both shapes, resolved to their values.
struct Core<'a> {
    killmail_id: i64,
    kill_time: chrono::DateTime<chrono::Utc>,
    solar_system_id: i64,
    victim: &'a Map<String, Value>,
}

fn core_fields<'a>(object: &'a Map<String, Value>, time_keys: [&str; 2]) -> Result<Core<'a>, AdapterError> {
    let killmail_id = object.get("killmail_id");
    let kill_time = time_keys.iter().find_map(|key| object.get(*key));
    let solar_system_id = object.get("solar_system_id").or_else(|| object.get("system_id"));
    let victim = object.get("victim");

    let missing: Vec<&'static str> = [
        ("killmail_id", killmail_id.is_none()),
        ("kill_time", kill_time.is_none()),
        ("solar_system_id", solar_system_id.is_none()),
        ("victim", victim.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();
    if !missing.is_empty() {
        return Err(AdapterError::MissingRequiredFields(missing));
    }

    let killmail_id = killmail_id
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid("killmail_id"))?;
    let kill_time = kill_time
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("kill_time"))
        .and_then(|raw| parse_kill_time(raw).map_err(|_| invalid("kill_time")))?;
    let solar_system_id = solar_system_id
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid("solar_system_id"))?;
    let victim = victim.and_then(Value::as_object).ok_or_else(|| invalid("victim"))?;

    Ok(Core {
        killmail_id,
        kill_time,
        solar_system_id,
        victim,
    })
}

fn adapt_flat(object: &Map<String, Value>) -> Result<Killmail, AdapterError> {
    let core = core_fields(object, ["kill_time", "killmail_time"])?;
    let victim: Participant =
        serde_json::from_value(Value::Object(core.victim.clone())).map_err(|_| invalid("victim"))?;
    let final_blow = match object.get("final_blow") {
        None | Some(Value::Null) => None,
        Some(value) => Some(serde_json::from_value(value.clone()).map_err(|_| invalid("final_blow"))?),
    };

    Ok(Killmail {
        killmail_id: core.killmail_id,
        kill_time: core.kill_time,
        solar_system_id: core.solar_system_id,
        victim,
        final_blow,
        attacker_count: optional_u32(object, "attacker_count")?.unwrap_or(0),
        total_value: optional_f64(object, "total_value")?.unwrap_or(0.0),
        npc: optional_bool(object, "npc")?.unwrap_or(false),
    })
}

fn adapt_nested(object: &Map<String, Value>) -> Result<Killmail, AdapterError> {
    let core = core_fields(object, ["killmail_time", "kill_time"])?;

    let attackers = match object.get("attackers") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(attackers)) => attackers
            .iter()
            .map(|a| a.as_object().ok_or_else(|| invalid("attackers")))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(invalid("attackers")),
    };
    let final_blow = attackers
        .iter()
        .find(|a| a.get("final_blow").and_then(Value::as_bool) == Some(true))
        .map(|a| participant(a, "damage_done"))
        .transpose()?;

    let (total_value, npc) = match object.get("zkb") {
        Some(Value::Object(zkb)) => (
            optional_f64(zkb, "totalValue")?
                .or(optional_f64(zkb, "total_value")?)
                .unwrap_or(0.0),
            optional_bool(zkb, "npc")?.unwrap_or(false),
        ),
        None | Some(Value::Null) => (0.0, false),
        Some(_) => return Err(invalid("zkb")),
    };

    Ok(Killmail {
        killmail_id: core.killmail_id,
        kill_time: core.kill_time,
        solar_system_id: core.solar_system_id,
        victim: participant(core.victim, "damage_taken")?,
        final_blow,
        attacker_count: u32::try_from(attackers.len()).unwrap_or(u32::MAX),
        total_value,
        npc,
    })
}

/// Reads a nested-shape participant; only ids and damage are present.
fn participant(object: &Map<String, Value>, damage_key: &str) -> Result<Participant, AdapterError> {
    Ok(Participant {
        character_id: optional_i64(object, "character_id")?,
        corporation_id: optional_i64(object, "corporation_id")?,
        alliance_id: optional_i64(object, "alliance_id")?,
        ship_type_id: optional_i64(object, "ship_type_id")?,
        damage: optional_i64(object, damage_key)?,
        ..Participant::default()
    })
}

fn invalid(field: &str) -> AdapterError {
    AdapterError::InvalidFieldTypes(field.to_string())
}

fn optional<T>(
    object: &Map<String, Value>,
    key: &str,
    read: impl Fn(&Value) -> Option<T>,
) -> Result<Option<T>, AdapterError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => read(value).map(Some).ok_or_else(|| invalid(key)),
    }
}

fn optional_i64(object: &Map<String, Value>, key: &str) -> Result<Option<i64>, AdapterError> {
    optional(object, key, Value::as_i64)
}

fn optional_u32(object: &Map<String, Value>, key: &str) -> Result<Option<u32>, AdapterError> {
    optional(object, key, |v| v.as_u64().and_then(|n| u32::try_from(n).ok()))
}

fn optional_f64(object: &Map<String, Value>, key: &str) -> Result<Option<f64>, AdapterError> {
    optional(object, key, Value::as_f64)
}

fn optional_bool(object: &Map<String, Value>, key: &str) -> Result<Option<bool>, AdapterError> {
    optional(object, key, Value::as_bool)
}
