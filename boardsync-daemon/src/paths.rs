use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn boardsync_root(home: &Path) -> PathBuf {
    home.join(".boardsync")
}

pub fn run_dir(home: &Path) -> PathBuf {
    boardsync_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_SOCKET)
}
