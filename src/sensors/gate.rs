use super::{DeviceId, ReadingValue, Sensor, SensorError, SensorReading};
use rand::Rng;

pub const DEFAULT_GATE_FAILURE_RATE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateCommand {
    Open,
    Close,
}

/// Gate position sensor. A failure is sticky: the gate reports closed and
/// ignores commands for the rest of the run.
#[derive(Debug)]
pub struct GateSensor {
    index: u32,
    is_open: bool,
    failed: bool,
    failure_rate: f64,
}

impl GateSensor {
    pub fn new(index: u32, failure_rate: f64) -> Self {
        Self {
            index,
            is_open: false,
            failed: false,
            failure_rate,
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn inject_failure(&mut self) {
        self.failed = true;
    }
}

impl Sensor for GateSensor {
    type Command = GateCommand;

    fn device(&self) -> DeviceId {
        DeviceId::gate(self.index)
    }

    fn read<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SensorReading {
        if rng.gen::<f64>() < self.failure_rate {
            self.failed = true;
        }

        SensorReading {
            device: self.device(),
            value: ReadingValue::Flag(self.is_open && !self.failed),
            is_fault: self.failed,
        }
    }

    fn execute_command(&mut self, command: Self::Command) -> Result<(), SensorError> {
        if self.failed {
            return Err(SensorError::GateStuck(self.index));
        }
        self.is_open = command == GateCommand::Open;
        Ok(())
    }

    fn is_failed(&self) -> bool {
        self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_gate_follows_commands() {
        let mut gate = GateSensor::new(0, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        assert_eq!(gate.read(&mut rng).value, ReadingValue::Flag(false));
        gate.execute_command(GateCommand::Open).unwrap();
        let reading = gate.read(&mut rng);
        assert_eq!(reading.value, ReadingValue::Flag(true));
        assert!(!reading.is_fault);
    }

    #[test]
    fn test_failed_gate_ignores_commands() {
        let mut gate = GateSensor::new(1, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        gate.execute_command(GateCommand::Open).unwrap();
        gate.inject_failure();

        assert_eq!(gate.execute_command(GateCommand::Close), Err(SensorError::GateStuck(1)));
        assert!(gate.is_open());

        let reading = gate.read(&mut rng);
        assert_eq!(reading.value, ReadingValue::Flag(false));
        assert!(reading.is_fault);
    }

    #[test]
    fn test_certain_failure_rate_fails_on_first_read() {
        let mut gate = GateSensor::new(0, 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        assert!(gate.read(&mut rng).is_fault);
        assert!(gate.is_failed());
    }
}
