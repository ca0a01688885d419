// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test {
    use crate::test::{app_body, app_image, raw_image, Board, MAP, TIMESTAMP};
    use pdc_boot_common::{BackupManager, BootState, RunOutcome, UpdateApplier};
    use pdc_error::{BootError, BootStatus};
    use pdc_image::{crc32, BootFlags, StagingStatus, ERASED_BYTE, STAGING_HEADER_SIZE};
    use zerocopy::IntoBytes;

    const BODY_LEN: usize = 3000;

    fn applier(board: &Board) -> UpdateApplier<'_> {
        let validator = board.validator();
        let backup = BackupManager::new(&board.internal, &MAP, validator, false);
        UpdateApplier::new(
            &board.internal,
            &board.external,
            &MAP,
            validator,
            backup,
            false,
        )
    }

    fn copy_blocks(image_len: usize) -> usize {
        image_len.div_ceil(256)
    }

    #[test]
    fn test_apply_installs_update_and_keeps_backup() {
        let board = Board::new();
        let v1 = app_image(1, BODY_LEN).to_bytes();
        let v2 = app_image(2, BODY_LEN + 800);
        board.install_primary(&v1);
        board.stage(&v2);

        let applier = applier(&board);
        assert!(applier.is_update_available());
        let installed = applier.apply_update().expect("Update should apply");
        assert_eq!(installed.version(), v2.header().version());
        assert_eq!(applier.progress(), 100);

        let v2_bytes = v2.to_bytes();
        assert_eq!(board.primary_bytes(v2_bytes.len()), v2_bytes);
        assert_eq!(board.backup_bytes(v1.len()), v1);
        assert_eq!(board.staging_header().status(), Some(StagingStatus::Applied));
        assert!(!applier.is_update_available());
    }

    #[test]
    fn test_apply_without_pending_update_touches_nothing() {
        let board = Board::new();
        let v1 = app_image(1, BODY_LEN).to_bytes();
        board.install_primary(&v1);

        // Erased staging header.
        board.internal.reset_stats();
        assert_eq!(applier(&board).apply_update(), Err(BootError::Error));

        // Already consumed.
        board.stage(&app_image(2, BODY_LEN));
        let mut header = board.staging_header();
        header.set_status(StagingStatus::Applied);
        board.external.load(MAP.staging.base as usize, header.as_bytes());
        assert_eq!(applier(&board).apply_update(), Err(BootError::Error));

        let stats = board.internal.stats();
        assert_eq!((stats.writes, stats.erases), (0, 0));
        assert_eq!(board.primary_bytes(v1.len()), v1);
    }

    #[test]
    fn test_blob_crc_mismatch_rejected_before_erase() {
        let board = Board::new();
        let v1 = app_image(1, BODY_LEN).to_bytes();
        board.install_primary(&v1);
        board.stage(&app_image(2, BODY_LEN));
        let data = (MAP.staging.base + MAP.staging_data_offset()) as usize;
        board.external.corrupt(data + 700);

        board.internal.reset_stats();
        assert_eq!(applier(&board).apply_update(), Err(BootError::Crc));
        assert_eq!(board.internal.stats().erases, 0);
        assert_eq!(board.primary_bytes(v1.len()), v1);
        assert_eq!(board.staging_header().status(), Some(StagingStatus::Pending));
    }

    #[test]
    fn test_staging_header_crc_mismatch() {
        let board = Board::new();
        board.install_primary(&app_image(1, BODY_LEN).to_bytes());
        board.stage(&app_image(2, BODY_LEN));
        // Timestamp field.
        board.external.corrupt(MAP.staging.base as usize + 20);

        let applier = applier(&board);
        assert!(!applier.is_update_available());
        assert_eq!(applier.apply_update(), Err(BootError::Crc));
    }

    #[test]
    fn test_staged_size_mismatch_rejected() {
        let board = Board::new();
        board.install_primary(&app_image(1, BODY_LEN).to_bytes());
        // Claims more data than the embedded header describes.
        let mut blob = app_image(2, BODY_LEN).to_bytes();
        blob.extend_from_slice(&[0u8; 16]);
        board.stage_raw(&blob);

        assert_eq!(applier(&board).apply_update(), Err(BootError::Error));
    }

    #[test]
    fn test_chunked_upload_then_apply() {
        let board = Board::new();
        board.install_primary(&app_image(1, BODY_LEN).to_bytes());
        // Dirty the staging area so every sector has to be erased.
        board.external.load(
            (MAP.staging.base + MAP.staging_data_offset()) as usize,
            &vec![0u8; 0x3000],
        );

        let image = app_image(3, 6000);
        let blob = image.to_bytes();
        let applier = applier(&board);
        for (i, chunk) in blob.chunks(1000).enumerate() {
            applier
                .write_update_chunk((i * 1000) as u32, chunk)
                .expect("Chunk write failed");
        }
        assert!(!applier.is_update_available());
        applier
            .finalize_update(blob.len() as u32, crc32(&blob), TIMESTAMP)
            .expect("Finalize failed");
        assert!(applier.is_update_available());

        let header = applier.staging_header().unwrap();
        assert_eq!(header.firmware_size as usize, blob.len());
        assert_eq!(header.timestamp, TIMESTAMP);

        let installed = applier.apply_update().expect("Update should apply");
        assert_eq!(installed.version().major, 3);
        assert_eq!(board.primary_bytes(blob.len()), blob);
    }

    #[test]
    fn test_chunk_and_finalize_bounds() {
        let board = Board::new();
        let applier = applier(&board);
        let capacity = MAP.staging_capacity();

        assert_eq!(
            applier.write_update_chunk(capacity - 10, &[0u8; 20]),
            Err(BootError::Error)
        );
        assert_eq!(
            applier.write_update_chunk(u32::MAX - 4, &[0u8; 20]),
            Err(BootError::Error)
        );
        assert!(applier.write_update_chunk(capacity - 20, &[0u8; 20]).is_ok());

        assert_eq!(applier.finalize_update(0, 0, TIMESTAMP), Err(BootError::Error));
        assert_eq!(
            applier.finalize_update(capacity + 1, 0, TIMESTAMP),
            Err(BootError::Error)
        );
        assert!(!applier.is_update_available());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let board = Board::new();
        board.stage(&app_image(2, BODY_LEN));
        let applier = applier(&board);
        assert!(applier.is_update_available());

        assert!(applier.cancel_update().is_ok());
        assert!(!applier.is_update_available());
        assert_eq!(
            board
                .external
                .contents(MAP.staging.base as usize, STAGING_HEADER_SIZE),
            vec![ERASED_BYTE; STAGING_HEADER_SIZE]
        );
        assert!(applier.cancel_update().is_ok());
    }

    #[test]
    fn test_mid_copy_fault_then_manual_rollback() {
        let board = Board::new();
        let v1 = app_image(1, BODY_LEN).to_bytes();
        let v2 = app_image(2, BODY_LEN);
        board.install_primary(&v1);
        board.stage(&v2);

        let blocks = copy_blocks(v1.len());
        board.internal.fail_writes_after(blocks + blocks / 2);
        let applier = applier(&board);
        assert_eq!(applier.apply_update(), Err(BootError::Flash));
        assert!(applier.progress() > 0 && applier.progress() < 100);
        assert!(board.validate_primary().is_err());
        assert_eq!(board.staging_header().status(), Some(StagingStatus::Pending));

        board.internal.clear_faults();
        let backup = BackupManager::new(&board.internal, &MAP, board.validator(), false);
        let restored = backup.rollback().expect("Rollback should succeed");
        assert_eq!(restored.version().major, 1);
        assert_eq!(board.primary_bytes(v1.len()), v1);
    }

    #[test]
    fn test_boot_applies_staged_update() {
        let board = Board::new();
        board.install_primary(&app_image(1, BODY_LEN).to_bytes());
        board.stage(&app_image(2, BODY_LEN));

        let (outcome, diag) = board.boot();
        assert_eq!(
            outcome,
            Ok(RunOutcome::Transferred {
                vector_table_addr: MAP.app_body.base
            })
        );
        assert!(diag.flags.contains(BootFlags::UPDATE_APPLIED));
        assert_eq!(diag.boot_attempts, 1);
        assert_eq!(diag.update_progress, 100);
        assert!(!diag.update_pending);
        assert!(diag.primary_valid());
        assert!(diag.backup_valid());
        assert_eq!(board.validate_primary().unwrap().version().major, 2);
        assert_eq!(board.validate_backup().unwrap().version().major, 1);

        // The consumed update is not applied again.
        board.internal.reset_stats();
        let (outcome, diag) = board.boot();
        assert!(outcome.is_ok());
        assert_eq!(board.internal.stats().writes, 0);
        assert_eq!(diag.boot_attempts, 2);
        assert_eq!(board.transfer.count(), 2);
    }

    #[test]
    fn test_update_request_without_staged_update() {
        let board = Board::new();
        board.install_primary(&app_image(1, BODY_LEN).to_bytes());
        board.store().request_update();

        let (outcome, diag) = board.boot();
        assert!(outcome.is_ok());
        assert_eq!(diag.state, BootState::Jumping);
        assert!(!board.shared_state().is_update_requested());
        assert!(!diag.flags.contains(BootFlags::UPDATE_APPLIED));
        assert_eq!(board.validate_primary().unwrap().version().major, 1);
        assert_eq!(board.transfer.transfers(), vec![MAP.app_body.base]);
    }

    #[test]
    fn test_update_failing_validation_rolls_back() {
        let board = Board::new();
        board.install_primary(&app_image(1, BODY_LEN).to_bytes());
        let mut body = app_body(BODY_LEN, 2);
        body[..4].copy_from_slice(&0x1000_0000u32.to_le_bytes());
        board.stage_raw(&raw_image(&body, |_| {}));

        let (outcome, diag) = board.boot();
        assert!(outcome.is_ok());
        assert_eq!(board.staging_header().status(), Some(StagingStatus::Failed));
        assert!(diag.flags.contains(BootFlags::ROLLED_BACK));
        assert!(!diag.flags.contains(BootFlags::UPDATE_APPLIED));
        assert_eq!(diag.boot_attempts, 1);
        assert!(!diag.update_pending);
        assert_eq!(board.validate_primary().unwrap().version().major, 1);
    }

    #[test]
    fn test_rejected_update_restores_backup() {
        let board = Board::new();
        board.install_primary(&app_image(2, BODY_LEN).to_bytes());
        board.install_backup(&app_image(1, BODY_LEN).to_bytes());
        board.stage(&app_image(3, BODY_LEN));
        let data = (MAP.staging.base + MAP.staging_data_offset()) as usize;
        board.external.corrupt(data + 700);

        let (outcome, diag) = board.boot();
        assert!(outcome.is_ok());
        assert_eq!(diag.last_status, BootStatus::Ok);
        assert!(diag.flags.contains(BootFlags::ROLLED_BACK));
        assert!(!diag.flags.contains(BootFlags::UPDATE_APPLIED));
        assert!(!board.shared_state().is_update_requested());
        assert_eq!(board.validate_primary().unwrap().version().major, 1);
        assert_eq!(board.transfer.count(), 1);
    }

    #[test]
    fn test_interrupted_apply_is_retried() {
        let board = Board::new();
        let v1 = app_image(1, BODY_LEN).to_bytes();
        board.install_primary(&v1);
        board.stage(&app_image(2, BODY_LEN));

        let blocks = copy_blocks(v1.len());
        board.internal.fail_writes_after(blocks + blocks / 2);
        let (outcome, diag) = board.boot();
        assert_eq!(outcome, Err(BootError::NoApp));
        assert_eq!(diag.state, BootState::StayResident);
        assert_eq!(diag.last_status, BootStatus::NoApp);
        assert!(diag.update_pending);
        assert_eq!(board.transfer.count(), 0);
        // The backup taken before the copy survives.
        assert_eq!(board.validate_backup().unwrap().version().major, 1);

        board.internal.clear_faults();
        let (outcome, diag) = board.boot();
        assert!(outcome.is_ok());
        assert!(diag.flags.contains(BootFlags::UPDATE_APPLIED));
        assert_eq!(board.validate_primary().unwrap().version().major, 2);
        assert_eq!(board.validate_backup().unwrap().version().major, 1);
        assert_eq!(board.staging_header().status(), Some(StagingStatus::Applied));
    }
}
