use super::{DeviceId, ReadingValue, Sensor, SensorError, SensorReading};
use rand::Rng;

pub const DEFAULT_NOISE_RATE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyCommand {
    Set(bool),
}

/// Parking spot occupancy sensor.
///
/// Noise flips the reported value for a single read only; the underlying
/// occupancy is never touched by a noisy read.
#[derive(Debug)]
pub struct OccupancySensor {
    index: u32,
    occupied: bool,
    noise_rate: f64,
}

impl OccupancySensor {
    pub fn new(index: u32, noise_rate: f64) -> Self {
        Self {
            index,
            occupied: false,
            noise_rate,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    pub fn noise_rate(&self) -> f64 {
        self.noise_rate
    }
}

impl Sensor for OccupancySensor {
    type Command = OccupancyCommand;

    fn device(&self) -> DeviceId {
        DeviceId::spot(self.index)
    }

    fn read<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SensorReading {
        let noisy = rng.gen::<f64>() < self.noise_rate;

        SensorReading {
            device: self.device(),
            value: ReadingValue::Flag(self.occupied ^ noisy),
            is_fault: noisy,
        }
    }

    fn execute_command(&mut self, command: Self::Command) -> Result<(), SensorError> {
        match command {
            OccupancyCommand::Set(occupied) => self.occupied = occupied,
        }
        Ok(())
    }

    fn is_failed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_noise_free_reads_truth() {
        let mut sensor = OccupancySensor::new(0, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(10);

        sensor.execute_command(OccupancyCommand::Set(true)).unwrap();
        for _ in 0..50 {
            let reading = sensor.read(&mut rng);
            assert_eq!(reading.value, ReadingValue::Flag(true));
            assert!(!reading.is_fault);
        }
    }

    #[test]
    fn test_noise_is_transient() {
        let mut sensor = OccupancySensor::new(2, 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let reading = sensor.read(&mut rng);
        assert_eq!(reading.value, ReadingValue::Flag(true));
        assert!(reading.is_fault);
        assert!(!sensor.is_occupied());
    }

    #[test]
    fn test_noise_rate_roughly_respected() {
        let mut sensor = OccupancySensor::new(0, 0.25);
        let mut rng = ChaCha8Rng::seed_from_u64(12);

        let noisy = (0..4000).filter(|_| sensor.read(&mut rng).is_fault).count();
        assert!(noisy > 800 && noisy < 1200, "noisy reads: {}", noisy);
    }
}
