// Licensed under the Apache-2.0 license

pub mod image;

pub use image::{
    build_timestamp, image_build, image_verify, load_file, parse_version, staging_build,
    staging_verify, FirmwareImage, StagingImage,
};

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

pub static PROJECT_ROOT: LazyLock<PathBuf> = LazyLock::new(|| {
    let current_dir = std::env::current_dir().unwrap_or_default();
    option_env!("CARGO_MANIFEST_DIR")
        .map(|s| {
            let p = Path::new(&s);
            if p.exists() {
                p.parent()
                    .unwrap_or(current_dir.clone().as_path())
                    .to_path_buf()
            } else {
                current_dir.clone()
            }
        })
        .unwrap_or(current_dir)
});

pub fn target_dir() -> PathBuf {
    std::env::var("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PROJECT_ROOT.join("target"))
}
