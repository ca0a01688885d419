// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test {
    use crate::test::{app_image, init_logger, Board, EXTERNAL_SIZE, MAP, TIMESTAMP};
    use pdc_boot_common::flash::spi_nor::{CMD_PAGE_PROGRAM, CMD_SECTOR_ERASE};
    use pdc_boot_common::{BootEngine, BootEnv, FlashDrvError, FlashStorage, SpiNorFlash};
    use pdc_emulator_periph::EmulatedSpiFlash;
    use pdc_error::BootStatus;
    use pdc_image::{crc32, BootFlags, StagingStatus, UpdateStagingHeader, STAGING_HEADER_SIZE};
    use zerocopy::FromBytes;

    fn spi_flash() -> (EmulatedSpiFlash, SpiNorFlash<EmulatedSpiFlash>) {
        init_logger();
        let device = EmulatedSpiFlash::new(EXTERNAL_SIZE);
        let nor = SpiNorFlash::new(device.clone(), EXTERNAL_SIZE);
        (device, nor)
    }

    fn count(opcodes: &[u8], opcode: u8) -> usize {
        opcodes.iter().filter(|op| **op == opcode).count()
    }

    #[test]
    fn test_write_split_on_page_boundary() {
        let (device, nor) = spi_flash();
        let data: Vec<u8> = (0..256u32).map(|i| i as u8).collect();
        nor.write(&data, 0x80).expect("Write failed");

        assert_eq!(count(&device.opcodes(), CMD_PAGE_PROGRAM), 2);
        let mut readback = vec![0u8; data.len()];
        nor.read(&mut readback, 0x80).expect("Read failed");
        assert_eq!(readback, data);
        assert_eq!(device.contents(0x7f, 1), vec![0xff]);
    }

    #[test]
    fn test_erase_sectors() {
        let (device, nor) = spi_flash();
        device.load(0x1000, &[0u8; 0x2000]);
        nor.erase(0x1000, 0x2000).expect("Erase failed");

        assert_eq!(count(&device.opcodes(), CMD_SECTOR_ERASE), 2);
        assert_eq!(device.erase_count(), 2);
        assert!(device.contents(0x1000, 0x2000).iter().all(|b| *b == 0xff));
    }

    #[test]
    fn test_argument_checks() {
        let (device, nor) = spi_flash();
        assert_eq!(nor.erase(0x800, 0x1000), Err(FlashDrvError::INVAL));
        assert_eq!(nor.erase(0x1000, 0x800), Err(FlashDrvError::INVAL));
        assert_eq!(
            nor.erase(EXTERNAL_SIZE, 0x1000),
            Err(FlashDrvError::SIZE)
        );
        let mut buf = [0u8; 8];
        assert_eq!(
            nor.read(&mut buf, EXTERNAL_SIZE - 4),
            Err(FlashDrvError::SIZE)
        );
        assert_eq!(nor.write(&buf, EXTERNAL_SIZE), Err(FlashDrvError::SIZE));
        assert!(device.opcodes().is_empty());
    }

    #[test]
    fn test_busy_device_times_out() {
        let (device, nor) = spi_flash();
        let nor = nor.with_max_polls(3);
        device.set_busy_polls(50, 50);
        assert_eq!(nor.write(&[0x12], 0), Err(FlashDrvError::BUSY));
    }

    #[test]
    fn test_bus_error_is_failure() {
        let (device, nor) = spi_flash();
        device.set_stuck_busy(true);
        let mut buf = [0u8; 4];
        assert_eq!(nor.read(&mut buf, 0), Err(FlashDrvError::FAIL));

        device.set_stuck_busy(false);
        assert!(nor.read(&mut buf, 0).is_ok());
    }

    #[test]
    fn test_update_staged_over_spi() {
        let board = Board::new();
        board.install_primary(&app_image(1, 2000).to_bytes());
        let (device, nor) = spi_flash();
        let env = BootEnv {
            external_flash: &nor,
            ..board.env()
        };

        let blob = app_image(2, 5000).to_bytes();
        {
            let mut engine = BootEngine::new(env);
            engine.init().expect("Boot init failed");
            assert!(!engine.is_update_available());
            for (i, chunk) in blob.chunks(700).enumerate() {
                engine
                    .write_update_chunk((i * 700) as u32, chunk)
                    .expect("Chunk write failed");
            }
            assert_eq!(engine.diagnostics().last_status, BootStatus::UpdateInProgress);
            engine
                .finalize_update(blob.len() as u32, crc32(&blob), TIMESTAMP)
                .expect("Finalize failed");
            assert!(engine.is_update_available());
            assert!(engine.diagnostics().update_pending);
            assert_eq!(engine.diagnostics().last_status, BootStatus::UpdateRequired);
        }

        let data = (MAP.staging.base + MAP.staging_data_offset()) as usize;
        assert_eq!(device.contents(data, blob.len()), blob);

        board.retained.warm_reset();
        let mut engine = BootEngine::new(env);
        engine.init().expect("Boot init failed");
        assert!(engine.run().is_ok());
        assert_eq!(engine.active_header().unwrap().version().major, 2);
        assert_eq!(engine.backup_header().unwrap().version().major, 1);
        assert!(engine
            .shared_data()
            .boot_flags()
            .contains(BootFlags::UPDATE_APPLIED));

        let header = UpdateStagingHeader::read_from_bytes(
            &device.contents(MAP.staging.base as usize, STAGING_HEADER_SIZE),
        )
        .unwrap();
        assert_eq!(header.status(), Some(StagingStatus::Applied));
        assert_eq!(board.primary_bytes(blob.len()), blob);
    }

    #[test]
    fn test_cancel_over_spi() {
        let board = Board::new();
        let (_device, nor) = spi_flash();
        let env = BootEnv {
            external_flash: &nor,
            ..board.env()
        };
        let mut engine = BootEngine::new(env);
        engine.init().expect("Boot init failed");

        let blob = app_image(2, 1000).to_bytes();
        engine.write_update_chunk(0, &blob).unwrap();
        engine
            .finalize_update(blob.len() as u32, crc32(&blob), TIMESTAMP)
            .unwrap();
        assert!(engine.staging_header().unwrap().is_pending());

        engine.cancel_update().unwrap();
        assert!(!engine.is_update_available());
        assert!(!engine.diagnostics().update_pending);
        engine.cancel_update().unwrap();
    }
}
