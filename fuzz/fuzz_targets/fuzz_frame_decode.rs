#![no_main]
use hrfs_hardware::block::parse_block;
use hrfs_hardware::uart::{MarkerCheck, add_serial_bits, decode_read, remove_serial_bits};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u8, bool, Vec<u8>)| {
    let (reg, strict, data) = input;
    let markers = if strict {
        MarkerCheck::Strict
    } else {
        MarkerCheck::Lenient
    };
    // Raw line noise, then a well-stuffed frame around arbitrary bytes.
    let _ = decode_read(reg, &data, markers);
    let _ = decode_read(reg, &add_serial_bits(&data), markers);

    // Stuffing must invert exactly.
    let unstuffed = remove_serial_bits(&add_serial_bits(&data));
    assert_eq!(&unstuffed[..data.len()], &data[..]);

    let _ = parse_block(&data);
});
