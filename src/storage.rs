//! Flash-backed persistence for modes and settings. See spec §6.
//!
//! There is no real flash peripheral to talk to on a host, so [`FlashPage`] models the two
//! properties of the real one that the rest of the crate depends on: an erased page reads back as
//! all `0xFF` bytes, and writes must be padded to a double-word boundary (the STM32 flash
//! controller refuses any write that isn't). Grounded on `config::Configuration::parse`'s
//! parse-at-the-I/O-boundary style — reading a page and reading a config file are both "bytes in,
//! typed value or `None` out" operations.

/// Size of one flash page, matching the STM32C071's erase granularity.
pub const FLASH_PAGE_SIZE: usize = 2048;
/// Flash writes must be aligned to this many bytes (a "double word" on this part).
pub const WORD_ALIGN: usize = 8;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The data to write, once padded, would not fit in a single page.
    TooLarge { len: usize, capacity: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::TooLarge { len, capacity } => {
                write!(f, "{len} bytes (after alignment padding) exceeds page capacity {capacity}")
            }
        }
    }
}

/// Pad `data` with trailing `0xFF` bytes up to the next multiple of [`WORD_ALIGN`].
///
/// `0xFF` is the erased-flash value, so padding with it means a page holding a string shorter
/// than its capacity still reads back correctly as that string: the padding looks identical to
/// untouched, never-written flash.
fn pad_to_word_align(data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    let remainder = padded.len() % WORD_ALIGN;
    if remainder != 0 {
        padded.resize(padded.len() + (WORD_ALIGN - remainder), 0xFF);
    }
    padded
}

/// One page of flash, modeled as a byte buffer that starts (and can be reset to) the erased
/// state.
pub struct FlashPage {
    bytes: Vec<u8>,
}

impl FlashPage {
    /// Construct a fresh, erased page.
    pub fn erased() -> Self {
        FlashPage { bytes: vec![0xFF; FLASH_PAGE_SIZE] }
    }

    /// Erase the page back to all `0xFF`.
    pub fn erase(&mut self) {
        self.bytes.fill(0xFF);
    }

    /// Erase the page and write `data` (padded to a double-word boundary) at its start.
    pub fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        let padded = pad_to_word_align(data);
        if padded.len() > FLASH_PAGE_SIZE {
            return Err(Error::TooLarge { len: padded.len(), capacity: FLASH_PAGE_SIZE });
        }
        self.erase();
        self.bytes[..padded.len()].copy_from_slice(&padded);
        Ok(())
    }

    /// Read the page back as a UTF-8 string, stopping at the first `0x00` or `0xFF` byte.
    ///
    /// A page that is still fully erased (its first byte is `0xFF`) has nothing written to it at
    /// all, which is reported as `None` rather than an empty string — "no mode saved here" is a
    /// distinct condition from "a mode saved as the empty string".
    pub fn read_str(&self) -> Option<String> {
        if self.bytes.first() == Some(&0xFF) {
            return None;
        }
        let end = self.bytes.iter().position(|&b| b == 0x00 || b == 0xFF).unwrap_or(self.bytes.len());
        String::from_utf8(self.bytes[..end].to_vec()).ok()
    }
}

impl Default for FlashPage {
    fn default() -> Self {
        Self::erased()
    }
}

/// The full set of persisted flash pages: one per mode slot, plus one for chip settings.
pub struct Storage {
    mode_pages: Vec<FlashPage>,
    settings_page: FlashPage,
}

impl Storage {
    pub fn new(mode_count: u8) -> Self {
        Storage {
            mode_pages: (0..mode_count).map(|_| FlashPage::erased()).collect(),
            settings_page: FlashPage::erased(),
        }
    }

    pub fn load_mode_json(&self, index: u8) -> Option<String> {
        self.mode_pages.get(index as usize).and_then(FlashPage::read_str)
    }

    pub fn save_mode_json(&mut self, index: u8, json: &str) -> Result<(), Error> {
        let page = self
            .mode_pages
            .get_mut(index as usize)
            .expect("mode index validated by caller before reaching storage");
        page.write(json.as_bytes())
    }

    pub fn load_settings_json(&self) -> Option<String> {
        self.settings_page.read_str()
    }

    pub fn save_settings_json(&mut self, json: &str) -> Result<(), Error> {
        self.settings_page.write(json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erased_page_reads_as_none() {
        let page = FlashPage::erased();
        assert_eq!(page.read_str(), None);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut page = FlashPage::erased();
        page.write(b"hello").unwrap();
        assert_eq!(page.read_str(), Some("hello".to_string()));
    }

    #[test]
    fn writes_are_padded_to_word_alignment() {
        let mut page = FlashPage::erased();
        page.write(b"abc").unwrap(); // 3 bytes -> padded to 8
        assert_eq!(&page.bytes[..8], b"abc\xFF\xFF\xFF\xFF\xFF");
    }

    #[test]
    fn rewrite_erases_previous_contents() {
        let mut page = FlashPage::erased();
        page.write(b"a longer first string").unwrap();
        page.write(b"short").unwrap();
        assert_eq!(page.read_str(), Some("short".to_string()));
    }

    #[test]
    fn oversized_write_is_rejected() {
        let mut page = FlashPage::erased();
        let data = vec![b'x'; FLASH_PAGE_SIZE + 1];
        assert!(page.write(&data).is_err());
    }

    #[test]
    fn storage_round_trips_mode_and_settings() {
        let mut storage = Storage::new(2);
        assert_eq!(storage.load_mode_json(0), None);
        storage.save_mode_json(0, r#"{"name":"x"}"#).unwrap();
        assert_eq!(storage.load_mode_json(0), Some(r#"{"name":"x"}"#.to_string()));
        assert_eq!(storage.load_mode_json(1), None);

        assert_eq!(storage.load_settings_json(), None);
        storage.save_settings_json(r#"{"modeCount":2}"#).unwrap();
        assert_eq!(storage.load_settings_json(), Some(r#"{"modeCount":2}"#.to_string()));
    }
}
