//! Chunking and ordering properties

use otaflash_test_helpers::prelude::*;
use otaflash_update::md5_hex;
use otaflash_update::prelude::*;
use proptest::prelude::*;

const IMAGE_LEN: usize = 9 * 1024 + 37;

fn write_in_chunks(image: &[u8], chunks: &[usize]) -> (UpdateSession<otaflash_update::sim::MemoryFlash>, usize) {
    let mut session = UpdateSession::with_config(small_device(), test_config());
    must(session.set_expected_checksum(&md5_hex(image)));
    must(session.begin(image.len() as u32, TargetKind::Firmware));

    let mut offset = 0;
    let mut sizes = chunks.iter().cycle();
    while offset < image.len() {
        let size = sizes.next().copied().unwrap_or(1).min(image.len() - offset);
        offset += session.write(&image[offset..offset + size]);
        if session.has_error() {
            break;
        }
    }
    (session, offset)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_chunking_does_not_change_result(chunks in prop::collection::vec(1usize..5000, 1..8)) {
        let image = firmware_image(IMAGE_LEN);
        let (mut session, consumed) = write_in_chunks(&image, &chunks);

        prop_assert_eq!(consumed, IMAGE_LEN);
        prop_assert_eq!(session.end(false), Ok(()));
        let stored = must_some(session.platform().partition_data("ota_1"), "ota_1");
        prop_assert_eq!(&stored[..IMAGE_LEN], &image[..]);
    }

    #[test]
    fn prop_progress_never_exceeds_size(chunks in prop::collection::vec(1usize..3000, 1..8)) {
        let image = firmware_image(IMAGE_LEN);
        let mut session = UpdateSession::with_config(small_device(), test_config());
        must(session.begin(IMAGE_LEN as u32, TargetKind::Firmware));

        let mut offset = 0;
        for size in chunks.iter().cycle().take(64) {
            if offset >= IMAGE_LEN {
                break;
            }
            let size = (*size).min(IMAGE_LEN - offset);
            let before = session.progress();
            offset += session.write(&image[offset..offset + size]);
            prop_assert!(session.progress() >= before);
            prop_assert!(session.progress() <= session.size());
            prop_assert_eq!(session.progress() + session.remaining(), session.size());
            prop_assert_ne!(
                must_some(session.platform().partition_data("ota_1"), "ota_1")[0],
                0xE9
            );
        }
    }

    #[test]
    fn prop_single_flipped_byte_is_caught(index in 1usize..IMAGE_LEN, flip in 1u8..=255) {
        let image = firmware_image(IMAGE_LEN);
        let mut corrupted = image.clone();
        corrupted[index] ^= flip;

        let mut session = UpdateSession::with_config(small_device(), test_config());
        must(session.set_expected_checksum(&md5_hex(&image)));
        must(session.begin(IMAGE_LEN as u32, TargetKind::Firmware));
        prop_assert_eq!(session.write(&corrupted), IMAGE_LEN);

        prop_assert_eq!(session.end(false), Err(UpdateError::ChecksumMismatch));
        prop_assert_eq!(session.platform().boot_label(), "ota_0");
    }
}
