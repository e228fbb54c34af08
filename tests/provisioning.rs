mod common;

use common::tar_gz;
use dfcli_orchestrator::error::{Error, FormatError, ProvisionError};
use dfcli_orchestrator::libs::provisioner::{BinaryProvisioner, ProvisionOutcome};
use dfcli_orchestrator::libs::utilities::assets::HttpReleaseSource;
use dfcli_orchestrator::libs::utilities::binary;
use dfcli_orchestrator::libs::utilities::platform;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const ASSET: &str = "/download/v2.31.3/dfcli-linux-amd64.tar.gz";

fn provisioner(base: &str) -> BinaryProvisioner {
    let source = HttpReleaseSource::new("X-Checksum-Sha256", None).unwrap();
    BinaryProvisioner::new(Arc::new(source), base, platform::resolve("linux", "x86_64"))
}

#[test]
fn downloads_verifies_and_reuses_an_http_release() {
    let archive = tar_gz(&[
        ("dfcli-linux-amd64/README.md", b"docs"),
        ("dfcli-linux-amd64/dfcli", b"#!/bin/sh\necho dfcli\n"),
    ]);
    let digest = format!("{:x}", Sha256::digest(&archive));

    let mut server = mockito::Server::new();
    let head = server
        .mock("HEAD", ASSET)
        .with_status(200)
        .with_header("X-Checksum-Sha256", &digest)
        .expect(2)
        .create();
    let get = server
        .mock("GET", ASSET)
        .with_status(200)
        .with_body(&archive)
        .expect(1)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let installed = provisioner(&server.url())
        .provision("dfcli", Some("2.31.3"), dir.path())
        .unwrap();
    assert_eq!(installed.outcome, ProvisionOutcome::Downloaded);
    assert_eq!(installed.fingerprint.as_deref(), Some(digest.as_str()));
    assert_eq!(
        std::fs::read(dir.path().join("dfcli")).unwrap(),
        b"#!/bin/sh\necho dfcli\n"
    );
    assert!(!dir.path().join("README.md").exists());
    assert_eq!(binary::read_marker(dir.path()).unwrap(), Some(digest.clone()));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(dir.path().join("dfcli")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    // A new execution context re-checks the fingerprint but does not download again.
    let again = provisioner(&server.url())
        .provision("dfcli", Some("2.31.3"), dir.path())
        .unwrap();
    assert_eq!(again.outcome, ProvisionOutcome::UpToDate);

    head.assert();
    get.assert();
}

#[test]
fn tampered_archive_fails_without_a_marker() {
    let archive = tar_gz(&[("dfcli", b"bin")]);
    let mut server = mockito::Server::new();
    server
        .mock("HEAD", ASSET)
        .with_status(200)
        .with_header("X-Checksum-Sha256", &"f".repeat(64))
        .create();
    server.mock("GET", ASSET).with_status(200).with_body(&archive).create();

    let dir = tempfile::tempdir().unwrap();
    let err = provisioner(&server.url())
        .provision("dfcli", Some("2.31.3"), dir.path())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Provision(ProvisionError::ChecksumMismatch { .. })
    ));
    assert!(!binary::marker_path(dir.path()).exists());
}

#[test]
fn download_errors_are_fatal() {
    let mut server = mockito::Server::new();
    server.mock("HEAD", ASSET).with_status(200).create();
    server.mock("GET", ASSET).with_status(503).create();

    let dir = tempfile::tempdir().unwrap();
    let err = provisioner(&server.url())
        .provision("dfcli", Some("2.31.3"), dir.path())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Provision(ProvisionError::HttpStatus { status: 503, .. })
    ));
    assert!(!binary::is_installed(dir.path(), "dfcli"));
}

#[test]
fn versions_below_the_minimum_are_rejected_offline() {
    let dir = tempfile::tempdir().unwrap();
    let err = provisioner("http://127.0.0.1:9")
        .provision("dfcli", Some("2.5.0"), dir.path())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Format(FormatError::VersionTooLow { .. })
    ));
}

#[test]
fn concurrent_provisioning_downloads_once() {
    let archive = tar_gz(&[("dfcli", b"bin")]);
    let mut server = mockito::Server::new();
    server
        .mock("HEAD", ASSET)
        .with_status(200)
        .with_header("X-Checksum-Sha256", "fp-1")
        .create();
    let get = server
        .mock("GET", ASSET)
        .with_status(200)
        .with_body(&archive)
        .expect(1)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let url = server.url();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                provisioner(&url)
                    .provision("dfcli", Some("2.31.3"), dir.path())
                    .unwrap();
            });
        }
    });
    get.assert();
    assert_eq!(binary::read_marker(dir.path()).unwrap().as_deref(), Some("fp-1"));
}
