//! ---
//! rcc_section: "02-messaging-ipc-data-model"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "SCK frame codec."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
//! CRC-16 used by SCK frames.
//!
//! The parameterisation is CRC-16/MODBUS: reflected polynomial 0x8005
//! (0xA001 in the shift-right form), initial value 0xFFFF, no final XOR.
//! The checksum travels little-endian and covers LENGTH, ROLE, CMD and
//! PAYLOAD. The TID byte sits between LENGTH and ROLE but is not covered.

use crc::{Crc, CRC_16_MODBUS};

const SCK_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Checksum over a sequence of non-contiguous regions.
pub fn crc16(regions: &[&[u8]]) -> u16 {
    let mut digest = SCK_CRC.digest();
    for region in regions {
        digest.update(region);
    }
    digest.finalize()
}
