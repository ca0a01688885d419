// Licensed under the Apache-2.0 license

use pdc_error::BootError;
use pdc_image::FirmwareHeader;

/// Verifies the authenticity of an image whose structure and integrity have
/// already been checked.
///
/// The signature field of the header is opaque to the boot code; it is up to
/// the implementer to interpret it and enforce any required policy.
pub trait SignatureVerifier {
    fn verify_signature(&self, header: &FirmwareHeader) -> Result<(), BootError>;
}

/// Accepts every image. Used until a signing scheme is provisioned.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnverifiedSignature;

impl SignatureVerifier for UnverifiedSignature {
    fn verify_signature(&self, header: &FirmwareHeader) -> Result<(), BootError> {
        log::warn!(
            "[pdc-boot] Signature check not implemented, image {} is unverified",
            header.version()
        );
        Ok(())
    }
}
