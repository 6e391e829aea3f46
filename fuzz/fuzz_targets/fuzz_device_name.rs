#![no_main]

use ble_modbus::{DeviceAddress, FrameCodec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|name: &str| {
    if let Ok(address) = DeviceAddress::from_name(name) {
        let frame = FrameCodec::build_read_holding_frame(name, 4004, 3)
            .expect("valid name must build a frame");
        assert_eq!(frame.device_address(), Some(address));
        assert!(FrameCodec::verify_frame(frame.as_slice()).is_ok());
    }
});
