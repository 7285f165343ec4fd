//! Shared helpers for plugin binary tests.

use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

const PLUGIN_ENV: &[&str] = &[
    "VBOXVOL_STORAGE_LOCATION_ROOT",
    "VBOXVOL_MOUNT_ROOT",
    "VBOXVOL_SOCKET",
    "VBOXVOL_LOG_DIR",
    "VBOXWEBSRV_URL",
    "VBOXWEBSRV_USERNAME",
    "VBOXWEBSRV_PASSWORD",
];

pub struct TestContext {
    pub cmd: Command,
    pub home: TempDir,
}

impl TestContext {
    pub fn new_cmd(&self) -> Command {
        plugin_cmd(&self.home)
    }

    /// Socket path inside the scratch directory, passed via `--socket-path`.
    pub fn socket_path(&self) -> PathBuf {
        self.home.path().join("plugins").join("virtualbox.sock")
    }
}

fn plugin_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("vboxvol-plugin").expect("plugin binary");
    for var in PLUGIN_ENV {
        cmd.env_remove(var);
    }
    cmd.env("VBOXVOL_SOCKET", home.path().join("plugins").join("virtualbox.sock"));
    cmd.timeout(std::time::Duration::from_secs(30));
    cmd
}

/// Plugin command isolated from the caller's environment.
pub fn plugin() -> TestContext {
    let home = TempDir::new().expect("temp dir");
    let cmd = plugin_cmd(&home);
    TestContext { cmd, home }
}
