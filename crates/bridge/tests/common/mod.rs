use anyhow::Context as _;
use std::process::{Child, Command, Stdio};

pub use apibridge_test_support::{KillOnDrop, MockApi, StdioSession};

pub fn spawn_bridge(args: &[&str]) -> anyhow::Result<Child> {
    let bin = env!("CARGO_BIN_EXE_apibridge-mcp");
    Command::new(bin)
        .args(args)
        .arg("--log-level")
        .arg("debug")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("spawn apibridge-mcp")
}
