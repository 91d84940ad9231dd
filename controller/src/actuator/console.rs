//! Console actuator: logs primitives instead of moving hardware.

use tracing::info;

use super::Actuator;

/// Logs each primitive at info level.
#[derive(Debug, Default)]
pub struct ConsoleActuator {
    /// Number of primitives issued so far.
    pub issued: u64,
}

impl ConsoleActuator {
    pub fn new() -> Self {
        info!("Console actuator ready (no hardware attached)");
        Self::default()
    }
}

impl Actuator for ConsoleActuator {
    fn drive_distance(&mut self, velocity: i32, distance: i32) -> anyhow::Result<()> {
        self.issued += 1;
        info!(velocity, distance, "drive");
        Ok(())
    }

    fn spin_angle(&mut self, velocity: i32, degrees: i32) -> anyhow::Result<()> {
        self.issued += 1;
        info!(velocity, degrees, "spin");
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.issued += 1;
        info!("stop");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_commands() {
        let mut actuator = ConsoleActuator::new();
        actuator.drive_distance(100, 10).unwrap();
        actuator.spin_angle(500, -15).unwrap();
        actuator.stop().unwrap();
        assert_eq!(actuator.issued, 3);
    }
}
