// Licensed under the Apache-2.0 license

/// Hands the CPU over to an application.
///
/// On hardware `transfer` never returns. Implementations used in tests record
/// the request and return so the caller can observe it.
pub trait BootTransfer {
    fn transfer(&self, vector_table_addr: u32);
}
