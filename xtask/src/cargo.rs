// Licensed under the Apache-2.0 license

use anyhow::{bail, Result};
use pdc_builder::PROJECT_ROOT;
use std::process::{Command, Stdio};

fn run(what: &str, args: &[&str], quiet: bool) -> Result<()> {
    println!("Running: cargo {}", args.join(" "));
    let mut command = Command::new("cargo");
    command.current_dir(&*PROJECT_ROOT).args(args);
    if quiet {
        command.stdout(Stdio::null());
    }
    if !command.status()?.success() {
        bail!("{} failed", what);
    }
    Ok(())
}

pub(crate) fn format() -> Result<()> {
    run("cargo fmt", &["fmt", "--check", "--all"], false)
}

pub(crate) fn clippy() -> Result<()> {
    run(
        "cargo clippy",
        &[
            "clippy",
            "--workspace",
            "--all-targets",
            "--",
            "-D",
            "warnings",
            "--no-deps",
        ],
        false,
    )
}

pub(crate) fn cargo_lock() -> Result<()> {
    run(
        "cargo tree --locked; please include required changes to Cargo.lock in your pull request",
        &["tree", "--locked"],
        true,
    )
}

pub(crate) fn test() -> Result<()> {
    run("cargo test", &["test", "--workspace"], false)
}

/// Cross-compiles the bootloader. The host build of the same package is a
/// stub, so the target is mandatory.
pub(crate) fn boot_build(package: &str, target: &str) -> Result<()> {
    run(
        "bootloader build",
        &["build", "--release", "-p", package, "--target", target],
        false,
    )?;
    println!(
        "Bootloader at {}",
        pdc_builder::target_dir()
            .join(target)
            .join("release")
            .join(package)
            .display()
    );
    Ok(())
}

pub(crate) fn precheckin() -> Result<()> {
    cargo_lock()?;
    format()?;
    clippy()?;
    crate::header::check()?;
    test()
}
