use super::{DeviceId, ReadingValue, Sensor, SensorError, SensorReading};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHARGER_FAILURE_RATE: f64 = 0.02;
pub const DEFAULT_CHARGING_POWER_KW: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChargerStatus {
    pub connected: bool,
    pub charging: bool,
    pub power_kw: f64,
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChargerCommand {
    Connect,
    Disconnect,
    StartCharging(f64),
    StopCharging,
}

/// EV charger sensor. The failure draw runs on every read, so a charger can
/// fail while a vehicle is charging on it. Failure is permanent for the run.
#[derive(Debug)]
pub struct ChargerSensor {
    index: u32,
    connected: bool,
    charging: bool,
    power_kw: f64,
    failed: bool,
    failure_rate: f64,
}

impl ChargerSensor {
    pub fn new(index: u32, failure_rate: f64) -> Self {
        Self {
            index,
            connected: false,
            charging: false,
            power_kw: 0.0,
            failed: false,
            failure_rate,
        }
    }

    pub fn status(&self) -> ChargerStatus {
        ChargerStatus {
            connected: self.connected,
            charging: self.charging && !self.failed,
            power_kw: if self.failed { 0.0 } else { self.power_kw },
            failed: self.failed,
        }
    }

    pub fn inject_failure(&mut self) {
        self.fail();
    }

    fn fail(&mut self) {
        self.failed = true;
        self.charging = false;
        self.power_kw = 0.0;
    }
}

impl Sensor for ChargerSensor {
    type Command = ChargerCommand;

    fn device(&self) -> DeviceId {
        DeviceId::charger(self.index)
    }

    fn read<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SensorReading {
        if rng.gen::<f64>() < self.failure_rate {
            self.fail();
        }

        SensorReading {
            device: self.device(),
            value: ReadingValue::Charger(self.status()),
            is_fault: self.failed,
        }
    }

    fn execute_command(&mut self, command: Self::Command) -> Result<(), SensorError> {
        match command {
            ChargerCommand::Connect => {
                self.connected = true;
                Ok(())
            }
            ChargerCommand::Disconnect => {
                self.connected = false;
                self.charging = false;
                self.power_kw = 0.0;
                Ok(())
            }
            ChargerCommand::StartCharging(power_kw) => {
                if self.failed {
                    return Err(SensorError::ChargerFailed(self.index));
                }
                if !self.connected {
                    return Err(SensorError::ChargerNotConnected(self.index));
                }
                self.charging = true;
                self.power_kw = power_kw;
                Ok(())
            }
            ChargerCommand::StopCharging => {
                self.charging = false;
                self.power_kw = 0.0;
                Ok(())
            }
        }
    }

    fn is_failed(&self) -> bool {
        self.failed
    }
}
