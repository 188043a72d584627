//! The hardware abstraction the firmware core is generic over.
//!
//! Grounded on `hardware/mod.rs`'s `GpioPin`/`Adc` traits and `server.rs`'s `MakeHardware`: rather
//! than threading a fn-pointer per peripheral through every call (the original C's `struct
//! chip_manager` of callbacks), the collaborators are grouped into one trait so a caller only
//! needs to carry around a single generic parameter, and a test double can implement the whole
//! surface at once the way `ListenerPin`/`Dummy` stand in for real GPIO.

use crate::accel::AccelSample;
use crate::charger::ChargeState;

/// Everything the firmware core needs from the outside world: driving the two LEDs, reading the
/// button and sensors, and touching flash/DFU. A concrete implementation wires these to real
/// MCU peripherals; [`DummyHal`] below wires them to in-memory state for host testing.
pub trait Hal {
    type Error: std::fmt::Debug;

    /// Drive the legacy monochrome bulb pin.
    fn write_bulb(&mut self, high: bool) -> Result<(), Self::Error>;

    /// Drive the RGB LED via PWM.
    fn write_rgb(&mut self, r: u8, g: u8, b: u8) -> Result<(), Self::Error>;

    /// Read the debounced-at-the-hardware-level raw button pin state (`true` = pressed).
    fn read_button(&mut self) -> Result<bool, Self::Error>;

    /// Read the accelerometer over I2C.
    fn read_accel(&mut self) -> Result<AccelSample, Self::Error>;

    /// Read the charger IC's state over I2C.
    fn read_charger(&mut self) -> Result<ChargeState, Self::Error>;

    /// Put the charger IC into ship mode.
    fn lock_charger(&mut self) -> Result<(), Self::Error>;

    /// Read the raw bytes of a flash page.
    fn read_flash_page(&mut self, page: usize) -> Result<Vec<u8>, Self::Error>;

    /// Erase and write a flash page.
    fn write_flash_page(&mut self, page: usize, data: &[u8]) -> Result<(), Self::Error>;

    /// Reset into the bootloader's DFU mode. Does not return on success.
    fn enter_dfu(&mut self) -> Result<(), Self::Error>;
}

/// A host-only `Hal` that records writes and returns scripted readings, standing in for real
/// MCU peripherals the same way `hardware::ListenerPin` stands in for a real GPIO line.
pub struct DummyHal {
    pub bulb_history: Vec<bool>,
    pub rgb_history: Vec<(u8, u8, u8)>,
    pub button_pressed: bool,
    pub accel_sample: AccelSample,
    pub charger_state: ChargeState,
    pub charger_locked: bool,
    pub flash_pages: Vec<Vec<u8>>,
    pub dfu_entered: bool,
}

impl DummyHal {
    pub fn new(flash_page_count: usize, flash_page_size: usize) -> Self {
        DummyHal {
            bulb_history: Vec::new(),
            rgb_history: Vec::new(),
            button_pressed: false,
            accel_sample: AccelSample::default(),
            charger_state: ChargeState::NotConnected,
            charger_locked: false,
            flash_pages: vec![vec![0xFF; flash_page_size]; flash_page_count],
            dfu_entered: false,
        }
    }
}

impl Hal for DummyHal {
    type Error = std::convert::Infallible;

    fn write_bulb(&mut self, high: bool) -> Result<(), Self::Error> {
        self.bulb_history.push(high);
        Ok(())
    }

    fn write_rgb(&mut self, r: u8, g: u8, b: u8) -> Result<(), Self::Error> {
        self.rgb_history.push((r, g, b));
        Ok(())
    }

    fn read_button(&mut self) -> Result<bool, Self::Error> {
        Ok(self.button_pressed)
    }

    fn read_accel(&mut self) -> Result<AccelSample, Self::Error> {
        Ok(self.accel_sample)
    }

    fn read_charger(&mut self) -> Result<ChargeState, Self::Error> {
        Ok(self.charger_state)
    }

    fn lock_charger(&mut self) -> Result<(), Self::Error> {
        self.charger_locked = true;
        Ok(())
    }

    fn read_flash_page(&mut self, page: usize) -> Result<Vec<u8>, Self::Error> {
        Ok(self.flash_pages[page].clone())
    }

    fn write_flash_page(&mut self, page: usize, data: &[u8]) -> Result<(), Self::Error> {
        self.flash_pages[page] = data.to_vec();
        Ok(())
    }

    fn enter_dfu(&mut self) -> Result<(), Self::Error> {
        self.dfu_entered = true;
        Ok(())
    }
}
