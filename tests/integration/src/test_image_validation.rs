// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test {
    use crate::test::{app_body, app_image, raw_image, Board, MAP};
    use pdc_boot_common::{FirmwareValidator, ImageSlot, SignatureVerifier};
    use pdc_error::{BootError, BootStatus};
    use pdc_image::{crc32, FirmwareHeader};
    use std::cell::Cell;

    struct CountingVerifier {
        calls: Cell<u32>,
        result: Result<(), BootError>,
    }

    impl SignatureVerifier for CountingVerifier {
        fn verify_signature(&self, _header: &FirmwareHeader) -> Result<(), BootError> {
            self.calls.set(self.calls.get() + 1);
            self.result
        }
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xcbf4_3926);
    }

    #[test]
    fn test_valid_image_returns_header() {
        let board = Board::new();
        let image = app_image(2, 3000);
        board.install_primary(&image.to_bytes());

        let header = board.validate_primary().expect("Primary should validate");
        assert_eq!(&header, image.header());
        assert_eq!(header.vector_table_addr, MAP.app_body.base);
    }

    #[test]
    fn test_erased_slot_has_no_app() {
        let board = Board::new();
        assert_eq!(board.validate_primary(), Err(BootError::NoApp));
        assert_eq!(board.validate_backup(), Err(BootError::NoApp));
    }

    #[test]
    fn test_header_crc_mismatch() {
        let image = app_image(2, 3000);
        // Every header byte after the magic and before the CRC is covered.
        for offset in [4, 20, 44, 231] {
            let board = Board::new();
            let mut bytes = image.to_bytes();
            bytes[offset] ^= 0x10;
            board.install_primary(&bytes);
            assert_eq!(
                board.validate_primary(),
                Err(BootError::Crc),
                "header byte {}",
                offset
            );
        }
    }

    #[test]
    fn test_body_flip_detected() {
        let image = app_image(2, 3000);
        let body_start = MAP.header_region_size() as usize;
        for offset in [8, 1500, 2999] {
            let board = Board::new();
            board.install_primary(&image.to_bytes());
            board
                .internal
                .corrupt(MAP.app_header.base as usize + body_start + offset);
            assert_eq!(
                board.validate_primary(),
                Err(BootError::Crc),
                "body byte {}",
                offset
            );
        }
    }

    #[test]
    fn test_app_size_out_of_range() {
        let body = app_body(64, 1);
        for size in [0, MAP.app_body.size + 1] {
            let board = Board::new();
            board.install_primary(&raw_image(&body, |h| h.app_size = size));
            assert_eq!(board.validate_primary(), Err(BootError::Error));
        }
    }

    #[test]
    fn test_vector_table_checks() {
        let mut body = app_body(64, 1);
        body[..4].copy_from_slice(&0x3000_0000u32.to_le_bytes());
        let board = Board::new();
        board.install_primary(&raw_image(&body, |_| {}));
        assert_eq!(board.validate_primary(), Err(BootError::Error));

        let mut body = app_body(64, 1);
        body[4..8].copy_from_slice(&0x0000_0101u32.to_le_bytes());
        let board = Board::new();
        board.install_primary(&raw_image(&body, |_| {}));
        assert_eq!(board.validate_primary(), Err(BootError::Error));

        // Too short to hold a vector table, but CRC-consistent.
        let board = Board::new();
        board.install_primary(&raw_image(&[0x00, 0x00, 0x02, 0x20], |_| {}));
        assert_eq!(board.validate_primary(), Err(BootError::Error));
    }

    #[test]
    fn test_vector_table_outside_body_start_rejected() {
        let body = app_body(3000, 1);
        for vector_table_addr in [
            MAP.app_body.base + 0x400,
            MAP.app_body.base - 0x200,
            MAP.backup.base + MAP.header_region_size(),
        ] {
            let image = raw_image(&body, |h| h.vector_table_addr = vector_table_addr);
            let board = Board::new();
            board.install_primary(&image);
            board.install_backup(&image);
            assert_eq!(board.validate_primary(), Err(BootError::Error));
            assert_eq!(board.validate_backup(), Err(BootError::Error));

            let (outcome, diag) = board.boot();
            assert_eq!(outcome, Err(BootError::NoApp));
            assert_eq!(diag.primary_status, BootStatus::Error);
            assert_eq!(board.transfer.count(), 0);
        }
    }

    #[test]
    fn test_backup_slot_validated_in_place() {
        let board = Board::new();
        let image = app_image(1, 5000);
        board.install_backup(&image.to_bytes());
        assert_eq!(board.validate_backup().as_ref(), Ok(image.header()));
        assert_eq!(board.validate_primary(), Err(BootError::NoApp));
    }

    #[test]
    fn test_read_fault_is_flash_error() {
        let board = Board::new();
        board.install_primary(&app_image(1, 100).to_bytes());
        board.internal.fail_reads(true);
        assert_eq!(board.validate_primary(), Err(BootError::Flash));
    }

    #[test]
    fn test_signature_hook_only_when_requested() {
        let board = Board::new();
        board.install_primary(&app_image(1, 100).to_bytes());
        let verifier = CountingVerifier {
            calls: Cell::new(0),
            result: Err(BootError::Signature),
        };
        let validator = FirmwareValidator::new(&board.internal, &MAP, &verifier);
        let slot = ImageSlot::primary(&MAP);

        assert!(validator.validate(&slot, false).is_ok());
        assert_eq!(verifier.calls.get(), 0);
        assert_eq!(validator.validate(&slot, true), Err(BootError::Signature));
        assert_eq!(verifier.calls.get(), 1);
    }

    #[test]
    fn test_default_signature_hook_accepts() {
        let board = Board::new();
        board.install_primary(&app_image(1, 100).to_bytes());
        assert!(board
            .validator()
            .validate(&ImageSlot::primary(&MAP), true)
            .is_ok());
    }

    #[test]
    fn test_validation_never_writes() {
        let board = Board::new();
        let mut bytes = app_image(1, 2000).to_bytes();
        bytes[300] ^= 0xff;
        board.install_primary(&bytes);
        board.internal.reset_stats();
        let _ = board.validate_primary();
        let stats = board.internal.stats();
        assert_eq!((stats.writes, stats.erases), (0, 0));
        assert!(stats.reads > 0);
    }
}
