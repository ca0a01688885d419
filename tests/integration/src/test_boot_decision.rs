// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test {
    use crate::test::{app_image, Board, MAP};
    use pdc_boot_common::{
        BootCheckpoint, BootEngine, BootEnv, BootState, RunOutcome, SignatureVerifier,
    };
    use pdc_config::BootPolicy;
    use pdc_error::{BootError, BootStatus};
    use pdc_image::{BootReason, FirmwareHeader};

    const BODY_LEN: usize = 4000;

    struct RejectAll;

    impl SignatureVerifier for RejectAll {
        fn verify_signature(&self, _header: &FirmwareHeader) -> Result<(), BootError> {
            Err(BootError::Signature)
        }
    }

    #[test]
    fn test_normal_boot() {
        let board = Board::new();
        let image = app_image(1, BODY_LEN);
        board.install_primary(&image.to_bytes());

        let (outcome, diag) = board.boot();
        assert_eq!(
            outcome,
            Ok(RunOutcome::Transferred {
                vector_table_addr: MAP.app_body.base
            })
        );
        assert_eq!(diag.state, BootState::Jumping);
        assert_eq!(diag.checkpoint, BootCheckpoint::TransferStarted);
        assert_eq!(diag.boot_reason, BootReason::PowerOn);
        assert_eq!(diag.boot_attempts, 1);
        assert_eq!(diag.primary_status, BootStatus::Ok);
        assert_eq!(diag.backup_status, BootStatus::NoApp);
        assert_eq!(diag.last_status, BootStatus::Ok);
        assert!(!diag.update_pending);
        assert_eq!(board.transfer.transfers(), vec![MAP.app_body.base]);
    }

    #[test]
    fn test_init_reads_only() {
        let board = Board::new();
        board.install_primary(&app_image(1, BODY_LEN).to_bytes());
        board.install_backup(&app_image(1, BODY_LEN).to_bytes());
        board.stage(&app_image(2, BODY_LEN));
        board.internal.reset_stats();
        board.external.reset_stats();

        let mut engine = BootEngine::new(board.env());
        engine.init().expect("Boot init failed");
        let diag = engine.diagnostics();
        assert_eq!(diag.checkpoint, BootCheckpoint::InitComplete);
        assert_eq!(diag.state, BootState::Idle);
        assert!(diag.primary_valid());
        assert!(diag.backup_valid());
        assert!(diag.update_pending);

        for stats in [board.internal.stats(), board.external.stats()] {
            assert_eq!((stats.writes, stats.erases), (0, 0));
        }
        assert_eq!(board.transfer.count(), 0);
    }

    #[test]
    fn test_header_accessors() {
        let board = Board::new();
        let v2 = app_image(2, BODY_LEN);
        let v1 = app_image(1, BODY_LEN);
        board.install_primary(&v2.to_bytes());
        board.install_backup(&v1.to_bytes());
        board.stage(&app_image(3, BODY_LEN));

        let mut engine = BootEngine::new(board.env());
        assert_eq!(engine.active_header(), None);
        engine.init().expect("Boot init failed");
        assert_eq!(engine.active_header(), Some(v2.header()));
        assert_eq!(engine.backup_header(), Some(v1.header()));
        assert!(engine.is_update_available());
        assert!(engine.staging_header().unwrap().is_pending());
        assert_eq!(engine.update_progress(), 0);
    }

    #[test]
    fn test_update_requested_by_same_session() {
        let board = Board::new();
        board.install_primary(&app_image(1, BODY_LEN).to_bytes());

        let mut engine = BootEngine::new(board.env());
        engine.init().expect("Boot init failed");
        board.stage(&app_image(2, BODY_LEN));
        engine.request_update();

        assert!(engine.run().is_ok());
        assert_eq!(engine.active_header().unwrap().version().major, 2);
        assert_eq!(engine.update_progress(), 100);
        assert!(!engine.shared_data().is_update_requested());
        assert_eq!(engine.state(), BootState::Jumping);
    }

    #[test]
    fn test_signature_policy() {
        let board = Board::new();
        board.install_primary(&app_image(1, BODY_LEN).to_bytes());
        let env = BootEnv {
            signature: &RejectAll,
            policy: BootPolicy {
                verify_signature: true,
                ..BootPolicy::default()
            },
            ..board.env()
        };

        let mut engine = BootEngine::new(env);
        engine.init().expect("Boot init failed");
        assert_eq!(engine.diagnostics().primary_status, BootStatus::Signature);
        assert_eq!(engine.run(), Err(BootError::NoApp));
        assert_eq!(board.transfer.count(), 0);

        // Without the policy the hook is not consulted.
        let env = BootEnv {
            signature: &RejectAll,
            ..board.env()
        };
        board.retained.warm_reset();
        let mut engine = BootEngine::new(env);
        engine.init().expect("Boot init failed");
        assert!(engine.run().is_ok());
    }

    #[test]
    fn test_custom_attempt_limit() {
        let board = Board::new();
        board.install_primary(&app_image(2, BODY_LEN).to_bytes());
        board.install_backup(&app_image(1, BODY_LEN).to_bytes());
        let env = BootEnv {
            policy: BootPolicy {
                max_boot_attempts: 1,
                ..BootPolicy::default()
            },
            ..board.env()
        };

        for expected_major in [2, 1] {
            board.retained.warm_reset();
            let mut engine = BootEngine::new(env);
            engine.init().expect("Boot init failed");
            assert!(engine.run().is_ok());
            assert_eq!(
                engine.active_header().unwrap().version().major,
                expected_major
            );
        }
    }
}
