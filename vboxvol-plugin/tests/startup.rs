use predicates::prelude::*;

mod common;

#[test]
fn test_help_lists_flags() {
    let mut ctx = common::plugin();
    ctx.cmd.arg("--help");
    ctx.cmd.assert().success().stdout(
        predicate::str::contains("--storage-location-root")
            .and(predicate::str::contains("--vboxwebsrv-url"))
            .and(predicate::str::contains("--disk-format")),
    );
}

#[test]
fn test_missing_storage_root_is_fatal() {
    let mut ctx = common::plugin();
    ctx.cmd
        .assert()
        .failure()
        .stderr(predicate::str::contains("--storage-location-root"));
    assert!(!ctx.socket_path().exists());
}

#[test]
fn test_invalid_url_is_fatal() {
    let mut ctx = common::plugin();
    ctx.cmd.args([
        "--storage-location-root",
        "/data",
        "--vboxwebsrv-url",
        "ftp://192.168.99.1",
    ]);
    ctx.cmd
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be http"));
}

#[test]
fn test_unknown_disk_format_is_rejected() {
    let mut ctx = common::plugin();
    ctx.cmd
        .args(["--storage-location-root", "/data", "--disk-format", "qcow2"]);
    ctx.cmd
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown disk format"));
}

#[test]
fn test_unreachable_webservice_never_opens_socket() {
    let mut ctx = common::plugin();
    ctx.cmd.args([
        "--storage-location-root",
        "/data",
        "--vboxwebsrv-url",
        "http://127.0.0.1:1",
        "--vboxwebsrv-timeout",
        "5",
    ]);
    ctx.cmd
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to log on"));
    assert!(!ctx.socket_path().exists());

    // Environment configuration behaves the same way.
    let mut cmd = ctx.new_cmd();
    cmd.env("VBOXVOL_STORAGE_LOCATION_ROOT", "/data")
        .env("VBOXWEBSRV_URL", "http://127.0.0.1:1");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("http://127.0.0.1:1"));
    assert!(!ctx.socket_path().exists());
}

#[test]
fn test_https_url_is_rejected_before_logon() {
    let mut ctx = common::plugin();
    ctx.cmd.args([
        "--storage-location-root",
        "/data",
        "--vboxwebsrv-url",
        "https://192.168.99.1:18083",
    ]);
    ctx.cmd
        .assert()
        .failure()
        .stderr(predicate::str::contains("TLS is not supported"));
    assert!(!ctx.socket_path().exists());
}
