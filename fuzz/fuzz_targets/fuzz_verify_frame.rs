#![no_main]

use arbitrary::Arbitrary;
use ble_modbus::{FrameCodec, ResponseLayout};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    received: Vec<u8>,
    header_len: u8,
    payload_len: u8,
    registers: u8,
}

fuzz_target!(|input: Input| {
    // Any byte sequence must yield Ok or Err, never a panic.
    if let Ok(body) = FrameCodec::verify_frame(&input.received) {
        assert_eq!(body.len() + 2, input.received.len());
    }

    let layouts = [
        ResponseLayout::ReadHolding {
            registers: input.registers as u16,
        },
        ResponseLayout::PresetEcho {
            registers: input.registers as u16,
        },
        ResponseLayout::Custom {
            header_len: input.header_len as usize,
            payload_len: input.payload_len as usize,
        },
    ];
    for layout in layouts {
        if let Ok(payload) = FrameCodec::extract_payload(&input.received, layout) {
            assert_eq!(payload.len(), layout.payload_len());
        }
    }
});
