//! Spawns child processes with their current directory set to a session's
//! workdir and stdin/stdout/stderr wired to pipes.
use crate::error::{Error, Result};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// A spawned child together with the parent-side pipe ends that were
/// requested. `stdin` is always closed immediately unless the caller asked
/// to keep it (see [`spawn_async`]'s `keep_stdin` parameter).
pub struct LaunchedChild {
    pub child: Child,
    pub stdin: Option<ChildStdin>,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Spawns `argv[0]` with `argv[1..]` as arguments, current directory `workdir`,
/// and fresh pipes for stdin/stdout/stderr. If `keep_stdin` is false the
/// stdin pipe is dropped immediately (closing it on the child's side), which
/// is the default session behavior; set it when stdin forwarding is enabled.
pub fn spawn_async(argv: &[String], workdir: &Path, keep_stdin: bool) -> Result<LaunchedChild> {
    let (program, args) = argv.split_first().ok_or_else(|| Error::Spawn {
        cause: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
    })?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(workdir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = cmd.spawn().map_err(|cause| Error::Spawn { cause })?;
    let stdin = child.stdin.take();
    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");
    Ok(LaunchedChild {
        child,
        stdin: if keep_stdin { stdin } else { None },
        stdout,
        stderr,
    })
}

/// Version-probe mode: spawn, close stdin/stderr, wait for exit, and return
/// the collected stdout bytes. Returns empty output on spawn failure or
/// non-zero exit, matching the original probe's "skip this entry" policy.
pub async fn spawn_collect(argv: &[String], workdir: &Path) -> (Vec<u8>, Option<ExitStatus>) {
    let launched = match spawn_async(argv, workdir, false) {
        Ok(l) => l,
        Err(_) => return (Vec::new(), None),
    };
    let LaunchedChild {
        mut child,
        stdin,
        mut stdout,
        stderr,
    } = launched;
    drop(stdin);
    drop(stderr);
    let mut out = Vec::new();
    let _ = stdout.read_to_end(&mut out).await;
    let status = child.wait().await.ok();
    match status {
        Some(s) if s.success() => (out, Some(s)),
        Some(s) => (Vec::new(), Some(s)),
        None => (Vec::new(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_collect_returns_stdout_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let (out, status) = spawn_collect(
            &["/bin/echo".to_string(), "v1.2.3".to_string()],
            dir.path(),
        )
        .await;
        assert!(status.unwrap().success());
        assert_eq!(String::from_utf8_lossy(&out).trim(), "v1.2.3");
    }

    #[tokio::test]
    async fn spawn_collect_empty_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (out, status) = spawn_collect(&["/bin/false".to_string()], dir.path()).await;
        assert!(!status.unwrap().success());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn spawn_collect_empty_on_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (out, status) =
            spawn_collect(&["/no/such/binary-xyz".to_string()], dir.path()).await;
        assert!(status.is_none());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn spawn_async_runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let launched = spawn_async(&["/bin/pwd".to_string()], dir.path(), false).unwrap();
        let LaunchedChild {
            mut child,
            mut stdout,
            ..
        } = launched;
        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await.unwrap();
        child.wait().await.unwrap();
        let canon_expected = dir.path().canonicalize().unwrap();
        let printed = String::from_utf8_lossy(&out);
        let canon_actual = Path::new(printed.trim()).canonicalize().unwrap();
        assert_eq!(canon_actual, canon_expected);
    }
}
