//! # Watt Pilot driver
//!
//! Serial driver for the Watt Pilot motorized waveplate attenuator, a
//! stepper-motor controller behind a USB-serial bridge. The optical layer
//! that maps waveplate angle to transmitted power lives in the host
//! application; this crate owns the wire protocol.
//!
//! ## Protocol
//!
//! Commands are ASCII lines terminated with CRLF at 38400 baud. The
//! device echoes most commands back before answering and silently drops
//! commands spaced closer than 50 ms apart, both of which the
//! [`channel::CommandChannel`] deals with.
//!
//! | Command | Purpose | Response |
//! |---|---|---|
//! | `pc` | full register dump | 24 `;`-separated fields |
//! | `p` | live parameter dump | `pUSB:`-prefixed token line |
//! | `o` | motion state | `run_state;position` |
//! | `n` | device name | free text |
//! | `m <steps>` | relative move | echo |
//! | `g <position>` | absolute move | echo |
//! | `zp` | home | echo |
//! | `st` | stop | echo |
//! | `h` | zero the position counter | echo |
//! | `i <value>` | set position counter | echo |
//! | `a <value>` / `d <value>` | set accel/decel ramp | echo |
//! | `r <code>` | set microstep resolution (16 as `6`) | echo |
//! | `zr <0/1>` | toggle position reporting | echo |
//! | `ss` | save settings | echo |
//! | `j` | reset controller | echo |
//!
//! ## Crate structure
//!
//! - **`transport`**: byte-level line transports; the `serialport`-backed
//!   [`transport::SerialTransport`] and a scripted
//!   [`transport::MockTransport`] for tests.
//! - **`channel`**: command canonicalization, the 50 ms inter-command
//!   throttle and bounded echo verification.
//! - **`settings`**: decoders for the two settings dump formats and the
//!   [`settings::MicrostepResolution`] wire mapping.
//! - **`motion`**: typed run-state reports.
//! - **`controller`**: the [`WattPilot`] facade composing the above.
//! - **`config`**/**`error`**: connection parameters and the error
//!   taxonomy.
//!
//! ## Example
//!
//! ```no_run
//! use watt_pilot::{ConnectionConfig, ProtocolSettings, WattPilot};
//!
//! # async fn example() -> watt_pilot::Result<()> {
//! let config = ConnectionConfig::new("/dev/ttyUSB0");
//! let mut pilot = WattPilot::open(&config, ProtocolSettings::default()).await?;
//!
//! pilot.home(true).await?;
//! pilot.move_to(15_600, true).await?;
//! println!("device: {}", pilot.device_name().await?);
//!
//! pilot.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod motion;
pub mod settings;
pub mod transport;

pub use channel::{Command, CommandChannel};
pub use config::{ConnectionConfig, ProtocolSettings, DEFAULT_BAUD_RATE};
pub use controller::WattPilot;
pub use error::{Result, WattPilotError};
pub use motion::{MotionReport, RunState};
pub use settings::{MicrostepResolution, SettingValue, SettingsRecord};
pub use transport::LineTransport;
