// Licensed under the Apache-2.0 license

use pdc_boot_common::transfer::BootTransfer;
use std::cell::RefCell;

/// Records hand-off requests instead of jumping.
#[derive(Default)]
pub struct RecordingTransfer {
    transfers: RefCell<Vec<u32>>,
}

impl RecordingTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vector table addresses of every transfer, oldest first.
    pub fn transfers(&self) -> Vec<u32> {
        self.transfers.borrow().clone()
    }

    pub fn count(&self) -> usize {
        self.transfers.borrow().len()
    }

    pub fn clear(&self) {
        self.transfers.borrow_mut().clear();
    }
}

impl BootTransfer for RecordingTransfer {
    fn transfer(&self, vector_table_addr: u32) {
        log::info!("transfer to {:#010x}", vector_table_addr);
        self.transfers.borrow_mut().push(vector_table_addr);
    }
}
