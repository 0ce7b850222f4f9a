//! Run-state reports from the `o` status query.

use crate::error::{Result, WattPilotError};
use std::fmt;

/// Motion phase reported by the controller firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Motor at rest. Terminal state for a motion wait.
    Stopped,
    /// Ramping up towards the travel speed.
    Accelerating,
    /// Ramping down towards a stop.
    Decelerating,
    /// Travelling at speed.
    Moving,
}

impl RunState {
    /// Decode the firmware's numeric state code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(RunState::Stopped),
            1 => Ok(RunState::Accelerating),
            2 => Ok(RunState::Decelerating),
            3 => Ok(RunState::Moving),
            _ => Err(WattPilotError::MalformedResponse {
                response: code.to_string(),
                reason: "run state code out of range 0..=3",
            }),
        }
    }

    /// The firmware's numeric state code.
    pub fn code(self) -> u8 {
        match self {
            RunState::Stopped => 0,
            RunState::Accelerating => 1,
            RunState::Decelerating => 2,
            RunState::Moving => 3,
        }
    }

    /// Human-readable state name.
    pub fn description(self) -> &'static str {
        match self {
            RunState::Stopped => "stopped",
            RunState::Accelerating => "accelerating",
            RunState::Decelerating => "decelerating",
            RunState::Moving => "moving",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One sample of the motion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionReport {
    /// Current motion phase.
    pub run_state: RunState,
    /// Position in microsteps, signed.
    pub position: i32,
}

impl MotionReport {
    /// Parse a `run_state;position` line.
    ///
    /// An empty line means the device had nothing to report yet and
    /// decodes as `None`; the caller retries rather than treating it as
    /// terminal.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let mut parts = line.split(';');
        let state_raw = parts.next().unwrap_or_default();
        let position_raw = parts.next().ok_or(WattPilotError::MalformedResponse {
            response: line.to_string(),
            reason: "expected 'run_state;position'",
        })?;

        let code: i64 = state_raw
            .trim()
            .parse()
            .map_err(|_| WattPilotError::MalformedResponse {
                response: line.to_string(),
                reason: "run state is not an integer",
            })?;
        let position: i32 =
            position_raw
                .trim()
                .parse()
                .map_err(|_| WattPilotError::MalformedResponse {
                    response: line.to_string(),
                    reason: "position is not an integer",
                })?;

        Ok(Some(MotionReport {
            run_state: RunState::from_code(code)?,
            position,
        }))
    }

    /// Whether the motor has come to rest.
    pub fn is_stopped(&self) -> bool {
        self.run_state == RunState::Stopped
    }
}
