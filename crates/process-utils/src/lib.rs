//! Child-process construction helpers for the external media tools.
//!
//! Every tool invocation in the workspace goes through [`tool_command`] so the
//! process environment is uniform: no console window on Windows, no inherited
//! stdin, a fixed `C` locale (tool output is parsed as text), and the child is
//! killed if its handle is dropped before it exits.

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Create a `tokio::process::Command` for an external tool.
///
/// Standard output and error are left for the caller to configure.
#[cfg(feature = "tokio")]
pub fn tool_command<I, S>(program: impl AsRef<OsStr>, args: I) -> tokio::process::Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window()
        .args(args)
        .env("LC_ALL", "C")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);
    cmd
}
