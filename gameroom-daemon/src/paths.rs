use std::path::{Path, PathBuf};

pub use gameroom_core::config::{config_path_at, gameroom_root};

pub const DAEMON_LABEL: &str = "dev.gameroom.daemon";
pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    gameroom_root(home).join(DAEMON_SOCKET)
}
