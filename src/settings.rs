//! Decoders for the device's two settings dumps.
//!
//! The controller reports its configuration in two formats that overlap in
//! content but not in shape:
//!
//! - `pc` returns one semicolon-delimited line of 24 positional register
//!   fields, several of which are reserved by the firmware;
//! - `p` returns one `pUSB:`-prefixed line of space-separated
//!   `key=value` (integer) and `key:value` (boolean) tokens using short
//!   key names.
//!
//! Both decode paths produce the same [`SettingsRecord`] shape so
//! downstream consumers never care where a value came from. Two fixups are
//! applied symmetrically: the microstep wire code `6` is translated to the
//! logical resolution `16`, and when both the resolution and the speed
//! register are present two derived fields are computed from them.

use crate::error::{Result, WattPilotError};
use log::warn;
use std::collections::BTreeMap;
use std::fmt;

/// First token of a live parameter dump. Anything else means the device
/// is not attached or not powered.
const LIVE_DUMP_PREFIX: &str = "pUSB:";

/// Speed register value at which the angular speed formula degenerates.
const SPEED_CEILING: i64 = 65_535;

/// Step timer base frequency, in Hz.
const TIMER_HZ: f64 = 14_400_000.0;

/// Fixed divider between the step timer and the speed register.
const TIMER_DIVIDER: f64 = 78.0;

/// Full steps per revolution of the waveplate rotation stage.
const FULL_STEPS_PER_REVOLUTION: i64 = 15_600;

/// A single decoded register value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingValue {
    /// On/off register.
    Bool(bool),
    /// Numeric register, transmitted as decimal text.
    Int(i64),
    /// Derived quantity, never transmitted by the device.
    Float(f64),
}

impl SettingValue {
    /// The boolean payload, if this is a [`SettingValue::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The integer payload, if this is a [`SettingValue::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Float(value) => Some(*value),
            SettingValue::Int(value) => Some(*value as f64),
            SettingValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(value) => write!(f, "{value}"),
            SettingValue::Int(value) => write!(f, "{value}"),
            SettingValue::Float(value) => write!(f, "{value}"),
        }
    }
}

/// Named register values decoded from one settings dump.
///
/// Registers the dump did not carry are absent, never defaulted. The two
/// decode provenances (`pc` and `p`) populate the same shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsRecord {
    values: BTreeMap<&'static str, SettingValue>,
}

impl SettingsRecord {
    /// Look up a register by name.
    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }

    /// Integer register by name, if present and of integer type.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(SettingValue::as_int)
    }

    /// Boolean register by name, if present and of boolean type.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(SettingValue::as_bool)
    }

    /// Numeric register by name as a float, widening integers.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|value| value.as_f64())
    }

    /// Whether a register is present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of populated registers.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over registers in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &SettingValue)> {
        self.values.iter().map(|(name, value)| (*name, value))
    }

    fn insert(&mut self, name: &'static str, value: SettingValue) {
        self.values.insert(name, value);
    }
}

#[derive(Clone, Copy)]
enum FieldType {
    Bool,
    Int,
}

/// Positional schema of the `pc` register dump. `None` positions are
/// reserved by the firmware and decode to nothing.
const FULL_DUMP_SCHEMA: [Option<(&str, FieldType)>; 24] = [
    Some(("operating_mode", FieldType::Bool)),
    Some(("current_motor_run_state", FieldType::Int)),
    Some(("acceleration", FieldType::Int)),
    Some(("deceleration", FieldType::Int)),
    Some(("speed", FieldType::Int)),
    Some(("motion_current", FieldType::Int)),
    Some(("idle_current", FieldType::Int)),
    Some(("motion_current_in_step_dir_mode", FieldType::Int)),
    Some(("micro_stepping_resolution", FieldType::Int)),
    Some(("motor_enabled", FieldType::Bool)),
    None,
    Some(("reset_position_on_zero_position", FieldType::Bool)),
    Some(("report_when_hitting_zero_position", FieldType::Bool)),
    None,
    None,
    None,
    Some(("motor_direction_in_step_dir_mode", FieldType::Bool)),
    Some(("motor_enable_in_step_dir_mode", FieldType::Bool)),
    None,
    Some(("switch_SW_F", FieldType::Bool)),
    Some(("switch_SW_E", FieldType::Bool)),
    None,
    None,
    None,
];

/// Short key names of the `p` live dump and the registers they map to.
const LIVE_KEYS: [(&str, &'static str); 10] = [
    ("a", "acceleration"),
    ("d", "deceleration"),
    ("r", "micro_stepping_resolution"),
    ("s", "speed"),
    ("wm", "motion_current"),
    ("ws", "idle_current"),
    ("wt", "motion_current_in_step_dir_mode"),
    ("en", "motor_enabled"),
    ("zr", "report_when_hitting_zero_position"),
    ("zs", "reset_position_on_zero_position"),
];

fn live_key(short: &str) -> Option<&'static str> {
    LIVE_KEYS
        .iter()
        .find(|(key, _)| *key == short)
        .map(|(_, name)| *name)
}

fn malformed(response: &str, reason: &'static str) -> WattPilotError {
    WattPilotError::MalformedResponse {
        response: response.to_string(),
        reason,
    }
}

fn parse_int(raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| malformed(raw, "expected an integer"))
}

/// Registers are transmitted as decimal text even when boolean; `0` is
/// false and anything nonzero is true.
fn parse_bool(raw: &str) -> Result<bool> {
    Ok(parse_int(raw)? != 0)
}

/// Decode the `pc` full register dump.
///
/// The trailing `;` is stripped before splitting; reserved positions are
/// omitted from the record. A field count other than 24 is tolerated with
/// a warning, pairing fields positionally as far as they go.
pub fn decode_full_dump(line: &str) -> Result<SettingsRecord> {
    let line = line.trim();
    if line.is_empty() {
        return Err(WattPilotError::NoData);
    }

    let fields: Vec<&str> = line.trim_end_matches(';').split(';').collect();
    if fields.len() != FULL_DUMP_SCHEMA.len() {
        warn!(
            "register dump carries {} fields, expected {}",
            fields.len(),
            FULL_DUMP_SCHEMA.len()
        );
    }

    let mut record = SettingsRecord::default();
    for (slot, raw) in FULL_DUMP_SCHEMA.iter().zip(fields) {
        let Some((name, kind)) = *slot else {
            continue;
        };
        let value = match kind {
            FieldType::Bool => SettingValue::Bool(parse_bool(raw)?),
            FieldType::Int => SettingValue::Int(parse_int(raw)?),
        };
        record.insert(name, value);
    }

    apply_fixups(&mut record)?;
    Ok(record)
}

/// Decode the `p` live parameter dump.
///
/// Returns `Ok(None)` when the line does not start with `pUSB:`, which is
/// how the device presents as absent or powered off. The second
/// whitespace token is the operating-mode flag; the remaining tokens are
/// `key=value` integers or `key:value` booleans. Unknown keys are skipped
/// with a warning.
pub fn decode_live_dump(line: &str) -> Result<Option<SettingsRecord>> {
    let line = line.trim();
    if !line.starts_with(LIVE_DUMP_PREFIX) {
        return Ok(None);
    }

    let mut tokens = line.split_whitespace();
    let _prefix = tokens.next();
    let mode = tokens
        .next()
        .ok_or_else(|| malformed(line, "missing operating-mode flag"))?;

    let mut record = SettingsRecord::default();
    record.insert("operating_mode", SettingValue::Bool(parse_bool(mode)?));

    for token in tokens {
        if let Some((key, value)) = token.split_once('=') {
            match live_key(key) {
                Some(name) => record.insert(name, SettingValue::Int(parse_int(value)?)),
                None => warn!("skipping unknown parameter key '{}' in live dump", key),
            }
        } else if let Some((key, value)) = token.split_once(':') {
            match live_key(key) {
                Some(name) => record.insert(name, SettingValue::Bool(parse_bool(value)?)),
                None => warn!("skipping unknown parameter key '{}' in live dump", key),
            }
        } else {
            warn!("skipping malformed token '{}' in live dump", token);
        }
    }

    apply_fixups(&mut record)?;
    Ok(Some(record))
}

/// Post-processing shared by both decode paths: the microstep wire remap
/// and the derived motion quantities.
fn apply_fixups(record: &mut SettingsRecord) -> Result<()> {
    if record.get_int("micro_stepping_resolution") == Some(6) {
        record.insert("micro_stepping_resolution", SettingValue::Int(16));
    }

    let (Some(resolution), Some(speed)) = (
        record.get_int("micro_stepping_resolution"),
        record.get_int("speed"),
    ) else {
        return Ok(());
    };

    if resolution == 0 || speed == SPEED_CEILING {
        return Err(WattPilotError::DivisionByZero("angular_rotation_speed"));
    }

    let angular =
        TIMER_HZ / TIMER_DIVIDER / resolution as f64 / (SPEED_CEILING - speed) as f64;
    record.insert("angular_rotation_speed", SettingValue::Float(angular));
    record.insert(
        "steps_per_revolution",
        SettingValue::Int(FULL_STEPS_PER_REVOLUTION * resolution),
    );
    Ok(())
}

/// Microstepping granularity of the stepper driver.
///
/// The logical resolutions are 1, 2, 4, 8 and 16 microsteps per full
/// step. On the wire the device encodes 16 as the code `6`; the mapping
/// is applied symmetrically by [`wire_code`](Self::wire_code) and
/// [`from_wire`](Self::from_wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MicrostepResolution {
    /// Full steps.
    Full,
    /// Half steps.
    Half,
    /// Quarter steps.
    Quarter,
    /// Eighth steps.
    Eighth,
    /// Sixteenth steps.
    Sixteenth,
}

impl MicrostepResolution {
    /// All resolutions the device supports.
    pub const ALL: [MicrostepResolution; 5] = [
        MicrostepResolution::Full,
        MicrostepResolution::Half,
        MicrostepResolution::Quarter,
        MicrostepResolution::Eighth,
        MicrostepResolution::Sixteenth,
    ];

    /// Microsteps per full step.
    pub fn steps(self) -> u8 {
        match self {
            MicrostepResolution::Full => 1,
            MicrostepResolution::Half => 2,
            MicrostepResolution::Quarter => 4,
            MicrostepResolution::Eighth => 8,
            MicrostepResolution::Sixteenth => 16,
        }
    }

    /// The code transmitted in the `r` command. 16 goes out as `6`.
    pub fn wire_code(self) -> u8 {
        match self {
            MicrostepResolution::Sixteenth => 6,
            other => other.steps(),
        }
    }

    /// Resolution from a logical microstep count.
    pub fn from_steps(steps: u8) -> Result<Self> {
        match steps {
            1 => Ok(MicrostepResolution::Full),
            2 => Ok(MicrostepResolution::Half),
            4 => Ok(MicrostepResolution::Quarter),
            8 => Ok(MicrostepResolution::Eighth),
            16 => Ok(MicrostepResolution::Sixteenth),
            other => Err(WattPilotError::InvalidArgument {
                name: "microstep resolution",
                value: i64::from(other),
                allowed: "1, 2, 4, 8 or 16",
            }),
        }
    }

    /// Resolution from the on-wire code. `6` decodes as 16.
    pub fn from_wire(code: u8) -> Result<Self> {
        match code {
            6 => Ok(MicrostepResolution::Sixteenth),
            other => Self::from_steps(other).map_err(|_| WattPilotError::InvalidArgument {
                name: "microstep resolution wire code",
                value: i64::from(code),
                allowed: "1, 2, 4, 8 or 6",
            }),
        }
    }
}

impl fmt::Display for MicrostepResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1/{}", self.steps())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_code_round_trips_every_resolution() {
        for resolution in MicrostepResolution::ALL {
            assert_eq!(
                MicrostepResolution::from_wire(resolution.wire_code()).unwrap(),
                resolution
            );
            assert_eq!(
                MicrostepResolution::from_steps(resolution.steps()).unwrap(),
                resolution
            );
        }
    }

    #[test]
    fn sixteenth_is_the_only_remapped_code() {
        assert_eq!(MicrostepResolution::Sixteenth.wire_code(), 6);
        for resolution in MicrostepResolution::ALL {
            if resolution != MicrostepResolution::Sixteenth {
                assert_eq!(resolution.wire_code(), resolution.steps());
            }
        }
    }

    #[test]
    fn invalid_resolutions_are_rejected() {
        assert!(MicrostepResolution::from_steps(3).is_err());
        assert!(MicrostepResolution::from_steps(32).is_err());
        // 16 is a logical value, not a wire code.
        assert!(MicrostepResolution::from_wire(16).is_err());
    }

    #[test]
    fn fixups_translate_wire_resolution() {
        let mut record = SettingsRecord::default();
        record.insert("micro_stepping_resolution", SettingValue::Int(6));
        apply_fixups(&mut record).unwrap();
        assert_eq!(record.get_int("micro_stepping_resolution"), Some(16));
        // No speed present, so nothing was derived.
        assert!(!record.contains("angular_rotation_speed"));
        assert!(!record.contains("steps_per_revolution"));
    }

    #[test]
    fn fixups_guard_the_speed_ceiling() {
        let mut record = SettingsRecord::default();
        record.insert("micro_stepping_resolution", SettingValue::Int(4));
        record.insert("speed", SettingValue::Int(SPEED_CEILING));
        assert!(matches!(
            apply_fixups(&mut record),
            Err(WattPilotError::DivisionByZero("angular_rotation_speed"))
        ));
    }
}
