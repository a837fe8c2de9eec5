mod common;

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use std::io::{Cursor, Read};

fn cmd() -> Command {
    Command::cargo_bin("img-variants").unwrap()
}

#[test]
fn test_cli_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("transform"))
        .stdout(predicate::str::contains("profiles"));
}

#[test]
fn test_run_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--store-root"));
}

#[test]
fn test_transform_missing_args() {
    cmd().args(["transform"]).assert().failure();
}

#[test]
fn test_profiles_lists_defaults() {
    cmd()
        .arg("profiles")
        .assert()
        .success()
        .stdout(predicate::str::contains("web"))
        .stdout(predicate::str::contains("1920x1080"))
        .stdout(predicate::str::contains("print"))
        .stdout(predicate::str::contains("PNG"));
}

#[test]
fn test_profiles_from_config_file() {
    let temp = TempDir::new().unwrap();
    let config = temp.child("pipeline.toml");
    config
        .write_str(
            r#"
            [watermark]
            enabled = false

            [[profiles]]
            name = "thumb"
            width = 128
            height = 96
            "#,
        )
        .unwrap();

    cmd()
        .args(["profiles", "--config"])
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("thumb"))
        .stdout(predicate::str::contains("disabled"))
        .stdout(predicate::str::contains("web").not());
}

#[test]
fn test_invalid_config_file_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.child("broken.toml");
    config.write_str("jobs = \"many\"").unwrap();

    cmd()
        .args(["profiles", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn test_transform_writes_variants() {
    let temp = TempDir::new().unwrap();
    let input = common::create_jpeg(temp.path(), "photo1.jpg", 800, 600);
    let out = temp.child("variants");

    cmd()
        .args(["-q", "transform"])
        .arg(&input)
        .arg(out.path())
        .arg("--no-watermark")
        .assert()
        .success();

    out.child("web_photo1.jpg").assert(predicate::path::exists());
    out.child("mobile_photo1.jpg").assert(predicate::path::exists());
    out.child("print_photo1.png").assert(predicate::path::exists());

    let print = image::open(out.child("print_photo1.png").path()).unwrap();
    assert_eq!((print.width(), print.height()), (300, 225));
}

#[test]
fn test_transform_corrupt_input_fails() {
    let temp = TempDir::new().unwrap();
    let input = common::create_corrupt_image(temp.path(), "broken.jpg");

    cmd()
        .args(["transform"])
        .arg(&input)
        .arg(temp.path().join("out"))
        .assert()
        .failure();
}

#[test]
fn test_run_missing_source_is_fatal() {
    let temp = TempDir::new().unwrap();

    cmd()
        .args(["-q", "run", "--store", "memory", "--source"])
        .arg(temp.path().join("no-such-dir"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Source location unavailable"));
}

#[test]
fn test_run_local_store_end_to_end() {
    let temp = TempDir::new().unwrap();
    let photos = temp.child("photos");
    photos.create_dir_all().unwrap();
    common::create_mixed_batch(photos.path());
    let bucket = temp.child("bucket");

    cmd()
        .args(["-q", "run", "--no-watermark", "--store", "local", "--source"])
        .arg(photos.path())
        .arg("--store-root")
        .arg(bucket.path())
        .assert()
        .success();

    for key in [
        "processed-images/web_photo1.jpg",
        "processed-images/mobile_photo1.jpg",
        "processed-images/print_photo1.png",
        "processed-images/web_photo2.png",
        "processed-images/mobile_photo2.png",
        "processed-images/print_photo2.png",
    ] {
        bucket.child(key).assert(predicate::path::exists());
    }
    bucket
        .child("processed-images/web_photo3.jpg")
        .assert(predicate::path::missing());

    let zip_bytes = std::fs::read(bucket.child("zipped-files/processed_images.zip").path()).unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes)).unwrap();
    assert_eq!(archive.len(), 6);
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        assert!(!entry.name().contains('/'));
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        assert!(!data.is_empty());
    }
}

#[test]
fn test_run_empty_source_builds_no_archive() {
    let temp = TempDir::new().unwrap();
    let photos = temp.child("photos");
    photos.create_dir_all().unwrap();
    let bucket = temp.child("bucket");

    cmd()
        .args(["run", "--store", "local", "--source"])
        .arg(photos.path())
        .arg("--store-root")
        .arg(bucket.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Archive skipped"));

    bucket
        .child("zipped-files/processed_images.zip")
        .assert(predicate::path::missing());
}
