// src/hal/types.rs
//! Shared types crossing the hardware abstraction boundary

/// One raw triaxial accelerometer sample, in sensor counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccelSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl AccelSample {
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }
}

/// Latched event/source flags read back from the sensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFlags {
    /// Orientation/interrupt-1 source register; low 6 bits are the 6D position
    pub int1_src: u8,
    /// Tap/click source register
    pub click_src: u8,
    /// FIFO source register; bit 6 is the overrun flag
    pub fifo_src: u8,
}

impl EventFlags {
    /// FIFO overran before it was drained
    pub fn overrun(&self) -> bool {
        self.fifo_src & 0x40 != 0
    }

    /// 6D orientation code (low 6 bits of the INT1 source)
    pub fn orientation(&self) -> u8 {
        self.int1_src & 0x3F
    }

    /// Double-tap detected
    pub fn double_tap(&self) -> bool {
        self.click_src & 0x20 != 0 && self.click_src & 0x07 != 0
    }
}

/// Completion notice for an asynchronous storage operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageEvent {
    /// A queued write/update finished
    WriteDone { ok: bool },
    /// A queued bulk erase finished
    ClearDone { ok: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_flags() {
        let flags = EventFlags {
            int1_src: 0xC5,
            click_src: 0x25,
            fifo_src: 0x40,
        };
        assert!(flags.overrun());
        assert_eq!(flags.orientation(), 0x05);
        assert!(flags.double_tap());
    }

}
