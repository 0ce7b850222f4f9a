//! High-level facade over the command channel.
//!
//! One [`WattPilot`] owns one serial connection and serializes every
//! interaction with the device through its [`CommandChannel`]. The device
//! is half-duplex; concurrent writers would interleave commands and
//! corrupt echo verification, so the controller takes `&mut self`
//! throughout.

use crate::channel::{Command, CommandChannel};
use crate::config::{ConnectionConfig, ProtocolSettings};
use crate::error::{Result, WattPilotError};
use crate::motion::MotionReport;
use crate::settings::{self, MicrostepResolution, SettingsRecord};
use crate::transport::LineTransport;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Driver facade for the Watt Pilot attenuator.
pub struct WattPilot<T> {
    channel: CommandChannel<T>,
    protocol: ProtocolSettings,
    full_settings: SettingsRecord,
    live_settings: Option<SettingsRecord>,
}

impl WattPilot<crate::transport::SerialTransport> {
    /// Open the serial port described by `config` and connect.
    pub async fn open(config: &ConnectionConfig, protocol: ProtocolSettings) -> Result<Self> {
        let transport = crate::transport::SerialTransport::open(config)?;
        info!(
            "Connecting to Watt Pilot on '{}' at {} baud",
            config.port, config.baud_rate
        );
        Self::connect(transport, protocol).await
    }
}

impl<T: LineTransport> WattPilot<T> {
    /// Build a controller over an already-open transport.
    ///
    /// Performs the initial settings refresh over both dump formats
    /// before the controller is handed out.
    pub async fn connect(transport: T, protocol: ProtocolSettings) -> Result<Self> {
        let channel = CommandChannel::new(transport, &protocol);
        let mut controller = Self {
            channel,
            protocol,
            full_settings: SettingsRecord::default(),
            live_settings: None,
        };
        controller.refresh_settings().await?;
        info!("Watt Pilot connected");
        Ok(controller)
    }

    /// Re-read both settings dumps and retain them as the last known
    /// configuration.
    ///
    /// The live dump is legitimately absent while the device is powered
    /// off; that is tolerated with a warning.
    pub async fn refresh_settings(&mut self) -> Result<()> {
        self.full_settings = self.read_full_settings().await?;
        self.live_settings = self.read_live_settings().await?;
        if self.live_settings.is_none() {
            warn!("Watt Pilot is not attached or turned on; live parameters unavailable");
        }
        Ok(())
    }

    /// Query the `pc` full register dump.
    pub async fn read_full_settings(&mut self) -> Result<SettingsRecord> {
        self.channel.send(&Command::new("pc")?).await?;
        let line = self.channel.read_line().await?;
        settings::decode_full_dump(&line)
    }

    /// Query the `p` live parameter dump.
    ///
    /// The response line is the payload, not an echo, so echo
    /// verification is skipped for this command.
    pub async fn read_live_settings(&mut self) -> Result<Option<SettingsRecord>> {
        self.channel.send_unechoed(&Command::new("p")?).await?;
        let line = self.channel.read_line().await?;
        settings::decode_live_dump(&line)
    }

    /// Last known full register dump.
    pub fn full_settings(&self) -> &SettingsRecord {
        &self.full_settings
    }

    /// Last known live parameters, if the device was reachable.
    pub fn live_settings(&self) -> Option<&SettingsRecord> {
        self.live_settings.as_ref()
    }

    /// Query the current run state and position.
    ///
    /// `None` means the device did not answer within the read timeout;
    /// callers retry rather than treating it as terminal.
    pub async fn state(&mut self) -> Result<Option<MotionReport>> {
        self.channel.send(&Command::new("o")?).await?;
        let line = self.channel.read_line().await?;
        MotionReport::parse(&line)
    }

    /// Poll the run state until the motor reports stopped.
    ///
    /// Polls through any number of missing reports. With a deadline the
    /// wait fails with [`WattPilotError::MotionTimeout`] once it expires;
    /// without one it polls for as long as the motor keeps running.
    pub async fn wait_until_stopped(
        &mut self,
        deadline: Option<Duration>,
    ) -> Result<MotionReport> {
        let started = Instant::now();
        loop {
            match self.state().await? {
                Some(report) if report.is_stopped() => return Ok(report),
                Some(report) => debug!(
                    "motor {} at position {}",
                    report.run_state, report.position
                ),
                None => debug!("no run-state report; still polling"),
            }

            if let Some(limit) = deadline {
                if started.elapsed() >= limit {
                    return Err(WattPilotError::MotionTimeout(limit));
                }
            }
            sleep(self.protocol.poll_interval()).await;
        }
    }

    /// Move by a relative number of microsteps.
    pub async fn move_by(&mut self, steps: i32, wait: bool) -> Result<()> {
        info!("Moving by {} steps", steps);
        self.command(&format!("m {steps}")).await?;
        self.wait_if(wait).await
    }

    /// Move to an absolute position.
    ///
    /// Requires a run-state report first; transmits nothing when the
    /// reported position already equals the target.
    pub async fn move_to(&mut self, position: i32, wait: bool) -> Result<()> {
        let current = self.state().await?.ok_or(WattPilotError::NoData)?;
        if current.position == position {
            debug!("already at position {}; nothing to transmit", position);
            return Ok(());
        }

        info!("Moving to position {}", position);
        self.command(&format!("g {position}")).await?;
        self.wait_if(wait).await
    }

    /// Run the homing sequence towards the zero switch.
    pub async fn home(&mut self, wait: bool) -> Result<()> {
        info!("Homing");
        self.command("zp").await?;
        self.wait_if(wait).await
    }

    /// Halt immediately. Fire and forget.
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stop requested");
        self.command("st").await
    }

    /// Overwrite the position counter.
    ///
    /// Zero routes to the dedicated zero-set command.
    pub async fn set_position(&mut self, value: i32) -> Result<()> {
        if value == 0 {
            self.command("h").await
        } else {
            self.command(&format!("i {value}")).await
        }
    }

    /// Set the acceleration ramp. Valid values are 1..=254.
    pub async fn set_acceleration(&mut self, value: u8) -> Result<()> {
        validate_ramp("acceleration", value)?;
        self.command(&format!("a {value}")).await
    }

    /// Set the deceleration ramp. Valid values are 1..=254.
    pub async fn set_deceleration(&mut self, value: u8) -> Result<()> {
        validate_ramp("deceleration", value)?;
        self.command(&format!("d {value}")).await
    }

    /// Select the microstepping resolution.
    pub async fn set_microstep_resolution(
        &mut self,
        resolution: MicrostepResolution,
    ) -> Result<()> {
        info!("Setting microstep resolution to {}", resolution);
        self.command(&format!("r {}", resolution.wire_code())).await
    }

    /// Enable or disable unsolicited position reports.
    pub async fn set_position_reporting(&mut self, enabled: bool) -> Result<()> {
        self.command(&format!("zr {}", u8::from(enabled))).await
    }

    /// Persist the current settings to the controller's flash.
    pub async fn save_settings(&mut self) -> Result<()> {
        self.command("ss").await
    }

    /// Reboot the controller firmware.
    pub async fn reset_controller(&mut self) -> Result<()> {
        self.command("j").await
    }

    /// Query the device name string.
    pub async fn device_name(&mut self) -> Result<String> {
        self.channel.send(&Command::new("n")?).await?;
        let line = self.channel.read_line().await?;
        if line.is_empty() {
            return Err(WattPilotError::NoData);
        }
        Ok(line)
    }

    /// The underlying transport, for diagnostics.
    pub fn transport(&self) -> &T {
        self.channel.transport()
    }

    /// Whether the transport still holds an open handle.
    pub fn is_open(&self) -> bool {
        self.channel.transport().is_open()
    }

    /// Release the serial connection. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        self.channel.close().await
    }

    async fn command(&mut self, text: &str) -> Result<()> {
        self.channel.send(&Command::new(text)?).await
    }

    async fn wait_if(&mut self, wait: bool) -> Result<()> {
        if wait {
            self.wait_until_stopped(self.protocol.wait_timeout()).await?;
        }
        Ok(())
    }
}

fn validate_ramp(name: &'static str, value: u8) -> Result<()> {
    // The firmware accepts the open interval (0, 255); 0 would disable
    // the ramp and 255 is the register sentinel.
    if value == 0 || value == u8::MAX {
        return Err(WattPilotError::InvalidArgument {
            name,
            value: i64::from(value),
            allowed: "1..=254",
        });
    }
    Ok(())
}
