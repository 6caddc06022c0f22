mod test_snap;

use std::process::Output;

use assert_cmd::Command;

/// A command running one of this crate's tool binaries, at maximum logging verbosity
pub fn tool(name: &str) -> Command {
    let mut cmd = Command::cargo_bin(name).expect("tool binary not built");
    cmd.arg("--log-level=TRACE");
    cmd
}

pub trait CommandExt {
    /// [Command::output], re-echoing stdout/stderr so they show up in failed tests
    fn captured_output(&mut self) -> Output;
}

impl CommandExt for Command {
    fn captured_output(&mut self) -> Output {
        let output = self.output().expect("Failed to run tool");
        // Echo through print!/eprint! rather than the raw fds, which is what libtest's output
        // capturing hooks into
        print!("{}", String::from_utf8_lossy(&output.stdout));
        eprint!("{}", String::from_utf8_lossy(&output.stderr));
        output
    }
}
