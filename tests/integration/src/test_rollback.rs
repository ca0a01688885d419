// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test {
    use crate::test::{app_image, Board, MAP};
    use pdc_boot_common::{BackupManager, BootCheckpoint, BootState, RunOutcome};
    use pdc_error::{BootError, BootStatus};
    use pdc_image::BootFlags;

    const BODY_LEN: usize = 2500;

    fn backup_manager(board: &Board) -> BackupManager<'_> {
        BackupManager::new(&board.internal, &MAP, board.validator(), false)
    }

    /// v2 in the primary slot, v1 in the backup slot.
    fn updated_board() -> Board {
        let board = Board::new();
        board.install_primary(&app_image(2, BODY_LEN).to_bytes());
        board.install_backup(&app_image(1, BODY_LEN).to_bytes());
        board
    }

    #[test]
    fn test_backup_requires_valid_primary() {
        let board = Board::new();
        let v1 = app_image(1, BODY_LEN).to_bytes();
        board.install_backup(&v1);
        let mut broken = app_image(2, BODY_LEN).to_bytes();
        broken[0x300] ^= 0x40;
        board.install_primary(&broken);

        board.internal.reset_stats();
        assert_eq!(backup_manager(&board).backup(), Err(BootError::Crc));
        assert_eq!(board.internal.stats().erases, 0);
        assert_eq!(board.backup_bytes(v1.len()), v1);
    }

    #[test]
    fn test_backup_then_rollback_restores_identical_bytes() {
        let board = Board::new();
        let v1 = app_image(1, BODY_LEN).to_bytes();
        board.install_primary(&v1);

        let manager = backup_manager(&board);
        let saved = manager.backup().expect("Backup failed");
        assert_eq!(saved.version().major, 1);
        assert_eq!(board.backup_bytes(v1.len()), v1);

        board.install_primary(&app_image(2, BODY_LEN + 500).to_bytes());
        let restored = manager.rollback().expect("Rollback failed");
        assert_eq!(restored, saved);
        assert_eq!(board.primary_bytes(v1.len()), v1);
        // The tail of the longer image is gone.
        assert!(board
            .primary_bytes(v1.len() + 500)
            .iter()
            .skip(v1.len())
            .all(|b| *b == 0xff));
    }

    #[test]
    fn test_rollback_without_backup() {
        let board = Board::new();
        let v1 = app_image(1, BODY_LEN).to_bytes();
        board.install_primary(&v1);

        assert_eq!(backup_manager(&board).rollback(), Err(BootError::NoApp));
        assert_eq!(board.primary_bytes(v1.len()), v1);
    }

    #[test]
    fn test_rollback_erase_failure() {
        let board = updated_board();
        board
            .internal
            .fail_erase_at(MAP.app_header.base as usize + 0x1000);
        assert_eq!(backup_manager(&board).rollback(), Err(BootError::Flash));
    }

    #[test]
    fn test_boot_loop_triggers_rollback() {
        let board = updated_board();

        for attempt in 1..=3 {
            let (outcome, diag) = board.boot();
            assert!(outcome.is_ok());
            assert_eq!(diag.boot_attempts, attempt);
            assert_eq!(board.validate_primary().unwrap().version().major, 2);
        }

        let (outcome, diag) = board.boot();
        assert_eq!(
            outcome,
            Ok(RunOutcome::Transferred {
                vector_table_addr: MAP.app_body.base
            })
        );
        assert_eq!(diag.boot_attempts, 1);
        assert!(diag.flags.contains(BootFlags::ROLLED_BACK));
        assert_eq!(board.validate_primary().unwrap().version().major, 1);
        assert_eq!(board.transfer.count(), 4);
    }

    #[test]
    fn test_exhausted_attempts_without_backup() {
        let board = Board::new();
        board.install_primary(&app_image(2, BODY_LEN).to_bytes());
        for _ in 0..3 {
            assert!(board.boot().0.is_ok());
        }

        let (outcome, diag) = board.boot();
        assert_eq!(outcome, Err(BootError::NoApp));
        assert_eq!(diag.state, BootState::StayResident);
        assert_eq!(diag.checkpoint, BootCheckpoint::NoBootableImage);
        assert_eq!(board.transfer.count(), 3);
        // The primary is left alone.
        assert_eq!(board.validate_primary().unwrap().version().major, 2);
    }

    #[test]
    fn test_unconfirmed_restored_image_rolls_back_again() {
        let board = updated_board();
        for _ in 0..4 {
            assert!(board.boot().0.is_ok());
        }
        for attempt in 2..=3 {
            let (outcome, diag) = board.boot();
            assert!(outcome.is_ok());
            assert_eq!(diag.boot_attempts, attempt);
        }

        // The backup is still usable, so the limit restores it again.
        let (outcome, diag) = board.boot();
        assert_eq!(
            outcome,
            Ok(RunOutcome::Transferred {
                vector_table_addr: MAP.app_body.base
            })
        );
        assert_eq!(diag.boot_attempts, 1);
        assert!(diag.flags.contains(BootFlags::ROLLED_BACK));
        assert_eq!(board.validate_primary().unwrap().version().major, 1);
        assert_eq!(board.transfer.count(), 7);
    }

    #[test]
    fn test_promoted_backup_rolls_back_after_attempt_limit() {
        let board = updated_board();
        board
            .internal
            .corrupt(MAP.app_body.base as usize + BODY_LEN / 2);

        for attempt in 1..=3 {
            let (outcome, diag) = board.boot();
            assert!(outcome.is_ok());
            assert_eq!(diag.boot_attempts, attempt);
        }

        let (outcome, diag) = board.boot();
        assert!(outcome.is_ok());
        assert!(diag.backup_valid());
        assert_eq!(diag.boot_attempts, 1);
        assert_eq!(diag.checkpoint, BootCheckpoint::TransferStarted);
        assert_eq!(board.validate_primary().unwrap().version().major, 1);
        assert_eq!(board.transfer.count(), 4);
    }

    #[test]
    fn test_confirmed_boots_never_roll_back() {
        let board = updated_board();
        for _ in 0..6 {
            let (outcome, diag) = board.boot();
            assert!(outcome.is_ok());
            assert_eq!(diag.boot_attempts, 1);
            board.store().confirm_boot();
        }
        assert_eq!(board.validate_primary().unwrap().version().major, 2);
        assert!(!board
            .shared_state()
            .boot_flags()
            .contains(BootFlags::ROLLED_BACK));
    }

    #[test]
    fn test_confirm_clears_rollback_marker() {
        let board = updated_board();
        for _ in 0..4 {
            assert!(board.boot().0.is_ok());
        }
        assert!(board
            .shared_state()
            .boot_flags()
            .contains(BootFlags::ROLLED_BACK));

        board.store().confirm_boot();
        let state = board.shared_state();
        assert_eq!(state.boot_attempt_count, 0);
        assert!(!state.boot_flags().contains(BootFlags::ROLLED_BACK));
    }

    #[test]
    fn test_corrupt_primary_promotes_backup() {
        let board = updated_board();
        board
            .internal
            .corrupt(MAP.app_body.base as usize + BODY_LEN / 2);

        let (outcome, diag) = board.boot();
        assert!(outcome.is_ok());
        assert!(diag.primary_valid());
        assert!(diag.flags.contains(BootFlags::ROLLED_BACK));
        assert_eq!(diag.boot_attempts, 1);
        assert_eq!(board.transfer.transfers(), vec![MAP.app_body.base]);
        assert_eq!(board.validate_primary().unwrap().version().major, 1);
    }

    #[test]
    fn test_no_valid_image_anywhere() {
        let board = Board::new();
        let mut broken = app_image(1, BODY_LEN).to_bytes();
        broken[10] ^= 0x01;
        board.install_primary(&broken);

        let (outcome, diag) = board.boot();
        assert_eq!(outcome, Err(BootError::NoApp));
        assert_eq!(diag.primary_status, BootStatus::Crc);
        assert_eq!(diag.backup_status, BootStatus::NoApp);
        assert_eq!(diag.state, BootState::StayResident);
        assert_eq!(board.transfer.count(), 0);
        assert_eq!(diag.boot_attempts, 0);
    }
}
