use hrfs_hardware::error::HwError;
use hrfs_hardware::uart::{
    BROADCAST_MARKER, FRAME_MARKER, MarkerCheck, add_serial_bits, crc8, decode_read,
};
use hrfs_hardware::{Register, SerialFrameTransport, SimulatedSensor};
use hrfs_traits::RegisterTransport;
use rstest::rstest;

fn frame(reg: u8, payload: &[u8]) -> Vec<u8> {
    let mut f = vec![FRAME_MARKER, BROADCAST_MARKER, reg];
    f.extend_from_slice(payload);
    f.push(crc8(&f));
    f
}

#[test]
fn tampered_payload_with_stale_crc_is_rejected() {
    let mut f = frame(Register::FullTurns.addr(), &[1, 2, 3, 4]);
    f[4] ^= 0x40;
    let err = decode_read(Register::FullTurns.addr(), &add_serial_bits(&f), MarkerCheck::Lenient)
        .expect_err("crc must fail");
    assert!(matches!(err, HwError::CrcMismatch { .. }));
}

#[test]
fn valid_frame_payload_is_extracted() {
    let f = frame(Register::Angle.addr(), &1234i32.to_le_bytes());
    let payload =
        decode_read(Register::Angle.addr(), &add_serial_bits(&f), MarkerCheck::Lenient).unwrap();
    assert_eq!(payload, 1234i32.to_le_bytes());
}

#[test]
fn echoed_register_must_match() {
    let f = frame(Register::Angle.addr(), &[0, 0, 0, 0]);
    let err = decode_read(Register::FullTurns.addr(), &add_serial_bits(&f), MarkerCheck::Lenient)
        .expect_err("register mismatch");
    match err {
        HwError::RegisterMismatch { expected, actual } => {
            assert_eq!(expected, 0x23);
            assert_eq!(actual, 0x24);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[rstest]
#[case(FRAME_MARKER, BROADCAST_MARKER, MarkerCheck::Lenient, true)]
#[case(0x00, BROADCAST_MARKER, MarkerCheck::Lenient, true)]
#[case(FRAME_MARKER, 0x00, MarkerCheck::Lenient, true)]
#[case(0x00, 0x00, MarkerCheck::Lenient, false)]
#[case(0x00, BROADCAST_MARKER, MarkerCheck::Strict, false)]
#[case(FRAME_MARKER, 0x00, MarkerCheck::Strict, false)]
#[case(FRAME_MARKER, BROADCAST_MARKER, MarkerCheck::Strict, true)]
fn marker_acceptance(
    #[case] m0: u8,
    #[case] m1: u8,
    #[case] policy: MarkerCheck,
    #[case] accepted: bool,
) {
    let mut f = vec![m0, m1, 0x21, 0x04];
    f.push(crc8(&f));
    let res = decode_read(0x21, &add_serial_bits(&f), policy);
    assert_eq!(res.is_ok(), accepted, "{res:?}");
}

#[test]
fn trailing_padding_bits_do_not_break_decoding() {
    let mut raw = add_serial_bits(&frame(0x22, &[1]));
    raw.resize(7, 0);
    assert_eq!(decode_read(0x22, &raw, MarkerCheck::Lenient).unwrap(), vec![1]);
}

#[test]
fn corrupted_frames_are_retried_per_field() {
    let sensor = SimulatedSensor::new();
    sensor.rotate_counts(4095 * 2 + 17);
    sensor.corrupt_next_frames(4);
    let mut t = SerialFrameTransport::new(sensor.clone(), 0);

    let r = t.read_registers().expect("retries absorb four bad frames");
    assert_eq!(r.full_turns, 2);
    assert_eq!(r.angle, 17);
    // 4 corrupted + 4 good replies
    assert_eq!(sensor.requests(), 8);
}

#[test]
fn field_gives_up_after_retries() {
    let sensor = SimulatedSensor::new();
    sensor.corrupt_next_frames(5);
    let mut t = SerialFrameTransport::new(sensor.clone(), 0);
    assert!(t.read_registers().is_err());
    // first field burns all five attempts, the other three succeed first time
    assert_eq!(sensor.requests(), 8);
}

#[test]
fn disconnected_sensor_fails_every_field() {
    let sensor = SimulatedSensor::new();
    sensor.set_connected(false);
    let mut t = SerialFrameTransport::new(sensor.clone(), 0).with_retries(2);
    assert!(t.read_registers().is_err());
    assert_eq!(sensor.requests(), 8);
}

#[test]
fn typed_reads_unpack_signed_and_unsigned() {
    let sensor = SimulatedSensor::new();
    sensor.rotate_counts(-10);
    sensor.set_magnet_state(2);
    let mut t = SerialFrameTransport::new(sensor, 0);
    assert_eq!(t.read_reg1(Register::MagnetState).unwrap(), 2);
    assert_eq!(t.read_reg4(Register::FullTurns).unwrap(), -1);
    assert_eq!(t.read_reg4(Register::Angle).unwrap(), 4085);
}
