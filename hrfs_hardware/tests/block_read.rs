use hrfs_hardware::block::parse_block;
use hrfs_hardware::{BlockReadTransport, SimulatedSensor};
use hrfs_traits::{I2cBus, RegisterTransport};

/// Bus that returns whatever it was primed with.
struct CannedBus(Vec<u8>);

impl I2cBus for CannedBus {
    fn read_register(
        &mut self,
        _reg: u8,
        _len: usize,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.0.clone())
    }
}

#[test]
fn short_block_invalidates_the_sample() {
    let mut t = BlockReadTransport::new(CannedBus(vec![4, 1, 0, 0]));
    let err = t.read_registers().expect_err("short block");
    assert!(err.to_string().contains("expected 10 bytes but got 4"));
}

#[test]
fn disconnected_sentinel_reads_as_no_response() {
    let mut data = vec![0xff, 0];
    data.extend_from_slice(&[0; 8]);
    // the layout itself still parses
    assert_eq!(parse_block(&data).unwrap().magnet_state, 0xff);

    let mut t = BlockReadTransport::new(CannedBus(data));
    let err = t.read_registers().expect_err("sentinel block");
    assert!(err.to_string().contains("no response from sensor"));
}

#[test]
fn bus_failure_is_an_error_not_a_panic() {
    let sensor = SimulatedSensor::new();
    sensor.set_connected(false);
    let mut t = BlockReadTransport::new(sensor.clone()).with_attempts(3);
    assert!(t.read_registers().is_err());
    assert_eq!(sensor.requests(), 3);
}
