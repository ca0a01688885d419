// Licensed under the Apache-2.0 license

use pdc_boot_common::shared_state::RetainedMemory;
use pdc_image::SHARED_STATE_WORDS;
use std::cell::Cell;

/// Battery-backed SRAM emulation. Contents survive [`Self::warm_reset`] and
/// are scrambled by [`Self::power_loss`].
pub struct EmulatedRetainedMemory {
    words: Cell<[u32; SHARED_STATE_WORDS]>,
    enabled: Cell<bool>,
}

impl EmulatedRetainedMemory {
    /// Memory holding the pattern left by a cold power-up.
    pub fn new() -> Self {
        Self {
            words: Cell::new(Self::garbage()),
            enabled: Cell::new(false),
        }
    }

    fn garbage() -> [u32; SHARED_STATE_WORDS] {
        core::array::from_fn(|i| 0xdead_beef_u32.rotate_left(i as u32 * 5))
    }

    pub fn words(&self) -> [u32; SHARED_STATE_WORDS] {
        self.words.get()
    }

    pub fn set_words(&self, words: [u32; SHARED_STATE_WORDS]) {
        self.words.set(words);
    }

    /// Flips a bit of one word without fixing the checksum.
    pub fn corrupt_word(&self, index: usize) {
        let mut words = self.words.get();
        words[index] ^= 0x0000_0100;
        self.words.set(words);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Access has to be enabled again after a reset; contents persist.
    pub fn warm_reset(&self) {
        self.enabled.set(false);
    }

    pub fn power_loss(&self) {
        self.enabled.set(false);
        self.words.set(Self::garbage());
    }
}

impl Default for EmulatedRetainedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl RetainedMemory for EmulatedRetainedMemory {
    fn enable(&self) {
        self.enabled.set(true);
    }

    fn read_words(&self) -> [u32; SHARED_STATE_WORDS] {
        if !self.enabled.get() {
            log::warn!("retained memory read before enable");
        }
        self.words.get()
    }

    fn write_words(&self, words: &[u32; SHARED_STATE_WORDS]) {
        if !self.enabled.get() {
            log::warn!("retained memory written before enable");
        }
        self.words.set(*words);
    }
}
