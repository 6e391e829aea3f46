//! Packet logging helpers
//!
//! Frames are rendered as uppercase hex pairs, e.g. `FF 18 00 2A 03 0F A4 00 03 D1 72`.

use tracing::info;

/// Direction of a logged frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Recv => "recv",
        }
    }
}

/// Format raw bytes as a space-separated hex string
pub fn format_hex_frame(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log a frame with its direction and device
pub fn log_packet(direction: Direction, device_id: &str, data: &[u8]) {
    info!(
        "[BLE-MODBUS] {} device:{} {}",
        direction.as_str(),
        device_id,
        format_hex_frame(data)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hex_frame() {
        assert_eq!(format_hex_frame(&[0xFF, 0x18, 0x00, 0x2A]), "FF 18 00 2A");
        assert_eq!(format_hex_frame(&[]), "");
    }
}
