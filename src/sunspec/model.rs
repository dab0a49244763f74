//! # SunSpec Meter Model 213
//!
//! In-memory image of the registers a SunSpec-aware inverter expects from
//! a 3-phase float meter. The smallest addressable element is a 16-bit
//! register; wider values (u32, f32) span two consecutive registers. The
//! whole image is kept in wire order (big-endian bytes), so serving a
//! Modbus read is a plain memory copy.
//!
//! Layout (0-based register index, address base 40000):
//!
//! | Index    | Content                                   |
//! |----------|-------------------------------------------|
//! | 0..=1    | "SunS" well-known identifier              |
//! | 2..=3    | Common block id (1) and length (65)       |
//! | 4..=67   | Common block (manufacturer, model, ...)   |
//! | 68       | Device (Modbus) address                   |
//! | 69..=70  | Meter model id (213) and length (124)     |
//! | 71..=194 | Meter block (floats, two registers each)  |
//! | 195..=196| End block (0xFFFF, 0)                     |

/// Modbus address of register index 0.
pub const REGISTER_ADDRESS_BASE: u32 = 40000;

/// Registers in the common block including the "SunS" header.
pub const REGISTER_COMMON_COUNT: usize = 4 + 65;

/// Registers in the meter block including its two-register header.
pub const REGISTER_METER_COUNT: usize = 2 + 124;

/// Registers in the end block.
pub const REGISTER_END_COUNT: usize = 2;

/// Total register count of the image.
pub const REGISTER_TOTAL_COUNT: usize =
    REGISTER_COMMON_COUNT + REGISTER_METER_COUNT + REGISTER_END_COUNT;

/// SunSpec well-known identifier, "SunS".
const SUNSPEC_MAGIC: u32 = 0x5375_6e53;

/// Model id of a 3-phase meter with float values.
const METER_MODEL_ID: u16 = 213;

// Meter-block register indices of the float groups.
const REG_AC_CURRENT: usize = 71;
const REG_VOLTAGE_TO_NEUTRAL: usize = 79;
const REG_VOLTAGE_PHASE_TO_PHASE: usize = 87;
const REG_FREQUENCY: usize = 95;
const REG_POWER: usize = 97;
const REG_APPARENT_POWER: usize = 105;
const REG_REACTIVE_POWER: usize = 113;
const REG_POWER_FACTOR: usize = 121;
const REG_WH_EXPORTED: usize = 129;
const REG_WH_IMPORTED: usize = 137;
const REG_VAH_EXPORTED: usize = 145;
const REG_VAH_IMPORTED: usize = 153;

/// The register image, stored byte-exact in network byte order.
pub struct SunSpecImage {
    registers: [u8; REGISTER_TOTAL_COUNT * 2],
}

impl SunSpecImage {
    /// Build the image with its static blocks in place.
    ///
    /// The common block, meter-model header, and end block are fixed at
    /// construction and never written again.
    pub fn new(modbus_address: u8) -> Self {
        let mut image = Self {
            registers: [0; REGISTER_TOTAL_COUNT * 2],
        };

        // Common block
        image.set_u32(0, SUNSPEC_MAGIC);
        image.set_u16(2, 0x0001);
        image.set_u16(3, (REGISTER_COMMON_COUNT - 4) as u16);
        image.set_ascii(4, "OpenMeter"); // manufacturer
        image.set_ascii(20, "DlmsSunSpec"); // model
        image.set_ascii(44, "V0.1.0"); // version
        image.set_u16(68, u16::from(modbus_address));

        // Meter block header
        image.set_u16(69, METER_MODEL_ID);
        image.set_u16(70, (REGISTER_METER_COUNT - 2) as u16);

        // End block
        image.set_u16(195, 0xFFFF);
        image.set_u16(196, 0);

        image
    }

    pub fn set_ac_current(&mut self, total: f32, phase_a: f32, phase_b: f32, phase_c: f32) {
        self.set_floats(REG_AC_CURRENT, &[total, phase_a, phase_b, phase_c]);
    }

    pub fn set_voltage_to_neutral(&mut self, average: f32, phase_a: f32, phase_b: f32, phase_c: f32) {
        self.set_floats(REG_VOLTAGE_TO_NEUTRAL, &[average, phase_a, phase_b, phase_c]);
    }

    pub fn set_voltage_phase_to_phase(&mut self, average: f32, ab: f32, bc: f32, ca: f32) {
        self.set_floats(REG_VOLTAGE_PHASE_TO_PHASE, &[average, ab, bc, ca]);
    }

    pub fn set_frequency(&mut self, value: f32) {
        self.set_floats(REG_FREQUENCY, &[value]);
    }

    pub fn set_power(&mut self, total: f32, phase_a: f32, phase_b: f32, phase_c: f32) {
        self.set_floats(REG_POWER, &[total, phase_a, phase_b, phase_c]);
    }

    pub fn set_apparent_power(&mut self, total: f32, phase_a: f32, phase_b: f32, phase_c: f32) {
        self.set_floats(REG_APPARENT_POWER, &[total, phase_a, phase_b, phase_c]);
    }

    pub fn set_reactive_power(&mut self, total: f32, phase_a: f32, phase_b: f32, phase_c: f32) {
        self.set_floats(REG_REACTIVE_POWER, &[total, phase_a, phase_b, phase_c]);
    }

    /// cos-phi, total and per phase.
    pub fn set_power_factor(&mut self, total: f32, phase_a: f32, phase_b: f32, phase_c: f32) {
        self.set_floats(REG_POWER_FACTOR, &[total, phase_a, phase_b, phase_c]);
    }

    pub fn set_total_wh_exported(&mut self, total: f32, phase_a: f32, phase_b: f32, phase_c: f32) {
        self.set_floats(REG_WH_EXPORTED, &[total, phase_a, phase_b, phase_c]);
    }

    pub fn set_total_wh_imported(&mut self, total: f32, phase_a: f32, phase_b: f32, phase_c: f32) {
        self.set_floats(REG_WH_IMPORTED, &[total, phase_a, phase_b, phase_c]);
    }

    pub fn set_total_vah_exported(&mut self, total: f32, phase_a: f32, phase_b: f32, phase_c: f32) {
        self.set_floats(REG_VAH_EXPORTED, &[total, phase_a, phase_b, phase_c]);
    }

    pub fn set_total_vah_imported(&mut self, total: f32, phase_a: f32, phase_b: f32, phase_c: f32) {
        self.set_floats(REG_VAH_IMPORTED, &[total, phase_a, phase_b, phase_c]);
    }

    /// Copy `count` registers starting at a 40000-based address as raw
    /// wire bytes. None when the range leaves the image.
    pub fn get_raw(&self, register_address: u32, register_count: u16) -> Option<Vec<u8>> {
        let index = self.register_index_for_range(register_address, register_count)?;
        let start = index * 2;
        let end = start + usize::from(register_count) * 2;
        Some(self.registers[start..end].to_vec())
    }

    /// Bounds check without copying.
    pub fn is_valid_range(&self, register_address: u32, register_count: u16) -> bool {
        self.register_index_for_range(register_address, register_count)
            .is_some()
    }

    /// Translate a 40000-based address range to a register index.
    fn register_index_for_range(&self, register_address: u32, register_count: u16) -> Option<usize> {
        if register_count < 1 {
            return None;
        }
        let index = register_address.checked_sub(REGISTER_ADDRESS_BASE)? as usize;
        if index + usize::from(register_count) > REGISTER_TOTAL_COUNT {
            return None;
        }
        Some(index)
    }

    fn set_u16(&mut self, index: usize, value: u16) {
        self.registers[index * 2..index * 2 + 2].copy_from_slice(&value.to_be_bytes());
    }

    fn set_u32(&mut self, index: usize, value: u32) {
        self.registers[index * 2..index * 2 + 4].copy_from_slice(&value.to_be_bytes());
    }

    fn set_f32(&mut self, index: usize, value: f32) {
        self.registers[index * 2..index * 2 + 4].copy_from_slice(&value.to_be_bytes());
    }

    fn set_floats(&mut self, index: usize, values: &[f32]) {
        for (i, value) in values.iter().enumerate() {
            self.set_f32(index + i * 2, *value);
        }
    }

    /// Pack an ASCII string two characters per register.
    fn set_ascii(&mut self, index: usize, text: &str) {
        for (i, byte) in text.bytes().enumerate() {
            self.registers[index * 2 + i] = byte;
        }
    }
}
