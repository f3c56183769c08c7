//! UBX rate configuration for u-blox receivers
//!
//! The timing gate is evaluated once per fix, so the receiver is switched to
//! a higher navigation rate at start-up with a legacy UBX-CFG-RATE frame.
//! Frames are built into caller buffers and written straight to the UART.

const UBX_SYNC_1: u8 = 0xB5;
const UBX_SYNC_2: u8 = 0x62;

const UBX_CLASS_CFG: u8 = 0x06;
const UBX_CFG_RATE: u8 = 0x08;

/// Time reference for CFG-RATE (1 = GPS time)
const TIME_REF_GPS: u16 = 1;

/// Header (6) + payload (6) + checksum (2)
pub const CFG_RATE_LEN: usize = 14;

/// 8-bit Fletcher checksum over class, id, length and payload
fn ubx_checksum(data: &[u8]) -> (u8, u8) {
    let mut ck_a: u8 = 0;
    let mut ck_b: u8 = 0;

    for &byte in data {
        ck_a = ck_a.wrapping_add(byte);
        ck_b = ck_b.wrapping_add(ck_a);
    }

    (ck_a, ck_b)
}

/// Frame `payload` into `buffer`, returns the frame length
fn build_ubx_message(class: u8, id: u8, payload: &[u8], buffer: &mut [u8]) -> usize {
    let payload_len = payload.len() as u16;

    buffer[0] = UBX_SYNC_1;
    buffer[1] = UBX_SYNC_2;
    buffer[2] = class;
    buffer[3] = id;
    buffer[4..6].copy_from_slice(&payload_len.to_le_bytes());
    buffer[6..6 + payload.len()].copy_from_slice(payload);

    let (ck_a, ck_b) = ubx_checksum(&buffer[2..6 + payload.len()]);
    buffer[6 + payload.len()] = ck_a;
    buffer[7 + payload.len()] = ck_b;

    8 + payload.len()
}

/// Build UBX-CFG-RATE for `rate_hz` (clamped to 1..=25 Hz)
///
/// Payload: measRate (ms, U2), navRate (cycles, U2), timeRef (U2).
pub fn cfg_rate(rate_hz: u8, buffer: &mut [u8; CFG_RATE_LEN]) -> usize {
    let rate_hz = rate_hz.clamp(1, 25);
    let meas_rate_ms = 1000 / u16::from(rate_hz);

    let mut payload = [0u8; 6];
    payload[0..2].copy_from_slice(&meas_rate_ms.to_le_bytes());
    payload[2..4].copy_from_slice(&1u16.to_le_bytes());
    payload[4..6].copy_from_slice(&TIME_REF_GPS.to_le_bytes());

    build_ubx_message(UBX_CLASS_CFG, UBX_CFG_RATE, &payload, buffer)
}

/// Convenience wrapper returning the frame by value
pub fn rate_command(rate_hz: u8) -> [u8; CFG_RATE_LEN] {
    let mut buffer = [0u8; CFG_RATE_LEN];
    cfg_rate(rate_hz, &mut buffer);
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ubx_checksum() {
        let data = [0x06, 0x08, 0x06, 0x00, 0x64, 0x00, 0x01, 0x00, 0x01, 0x00];
        assert_eq!(ubx_checksum(&data), (0x7A, 0x12));
    }

    #[test]
    fn test_cfg_rate_10hz() {
        assert_eq!(
            rate_command(10),
            [0xB5, 0x62, 0x06, 0x08, 0x06, 0x00, 0x64, 0x00, 0x01, 0x00, 0x01, 0x00, 0x7A, 0x12]
        );
    }

    #[test]
    fn test_cfg_rate_5hz_measurement_period() {
        let mut buffer = [0u8; CFG_RATE_LEN];
        let len = cfg_rate(5, &mut buffer);
        assert_eq!(len, CFG_RATE_LEN);
        assert_eq!(u16::from_le_bytes([buffer[6], buffer[7]]), 200);
    }

    #[test]
    fn test_cfg_rate_clamps_zero() {
        let frame = rate_command(0);
        assert_eq!(u16::from_le_bytes([frame[6], frame[7]]), 1000);
    }
}
