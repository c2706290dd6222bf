//! Drives a single accepted connection through *receive → compile → run → finish*.
use crate::codec::FrameReader;
use crate::error::{Error, Result};
use crate::launcher::{self, LaunchedChild};
use crate::multiplexer::{drain_pipes, Labeled, SerializedWriter};
use crate::registry::Registry;
use crate::workdir::WorkDir;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{info, instrument, warn};

/// Configuration the core engine needs injected — none of it is protocol
/// state, all of it is deployment-specific.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base directory under which each session creates its own workdir.
    pub workdir_base: PathBuf,
    /// Path to the sandbox launcher binary, prepended to the run argv.
    pub ptracer_path: String,
    /// Whether a buffered `Stdin` frame is forwarded to the program child.
    /// Default is off, matching the original behavior of closing stdin
    /// immediately after spawn (see design notes on the open question).
    pub forward_stdin: bool,
}

#[cfg(unix)]
fn signal_name(sig: i32) -> String {
    unsafe {
        let ptr = libc::strsignal(sig);
        if ptr.is_null() {
            String::new()
        } else {
            std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

#[cfg(not(unix))]
fn signal_name(_sig: i32) -> String {
    String::new()
}

/// A process never started has no real [`ExitStatus`] to report, but the
/// protocol always expects an `ExitCode` frame before `Control`/`Finish`.
/// Synthesizes one the way the original server's forked child did when
/// `execv` itself failed: `exit(-1)`, observed by the parent as a normal
/// (non-signaled) exit with code 255.
#[cfg(unix)]
fn synthetic_failure_status() -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(255 << 8)
}

#[cfg(windows)]
fn synthetic_failure_status() -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    ExitStatus::from_raw(255)
}

async fn emit_termination_frames<W: AsyncWrite + Unpin>(
    writer: &SerializedWriter<W>,
    status: ExitStatus,
) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            let name = signal_name(sig);
            let _ = writer.write_frame("Signal", name.as_bytes()).await;
        }
    }
    if let Some(code) = status.code() {
        let _ = writer
            .write_frame("ExitCode", code.to_string().as_bytes())
            .await;
    }
}

/// Pulls the compiler name out of the accumulated `Control` payload: the
/// first occurrence of `compiler=<name>` up to the next whitespace.
fn parse_selected_compiler(control: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(control);
    let idx = text.find("compiler=")?;
    let rest = &text[idx + "compiler=".len()..];
    let name: String = rest.chars().take_while(|c| !c.is_whitespace()).collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Runs one session end to end: reads frames until `Control run` or
/// `Version`, then drives compile/run/finish (or the version listing) and
/// closes the socket. All errors are session-scoped: a failure here never
/// affects any other session.
#[instrument(skip(socket, registry, config), fields(peer = %peer_label))]
pub async fn serve<S>(
    socket: S,
    registry: Arc<Registry>,
    config: Arc<SessionConfig>,
    peer_label: String,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let workdir = WorkDir::create(&config.workdir_base).await?;
    let (read_half, write_half) = tokio::io::split(socket);
    let mut reader = FrameReader::new(read_half);
    let writer = SerializedWriter::new(write_half);

    let mut received: HashMap<String, Vec<u8>> = HashMap::new();
    loop {
        let frame = match reader.next_frame().await? {
            Some(f) => f,
            None => return Ok(()), // client disconnected before `Control run`
        };
        if frame.name == "Control" && frame.payload == b"run" {
            break;
        }
        if frame.name == "Version" {
            return version_branch(&registry, &writer).await;
        }
        received
            .entry(frame.name)
            .or_default()
            .extend_from_slice(&frame.payload);
    }

    let selected = parse_selected_compiler(received.get("Control").map(Vec::as_slice).unwrap_or(&[]))
        .ok_or(Error::NoCompilerSelected)?;
    let compiler = registry
        .get(&selected)
        .ok_or_else(|| Error::UnknownCompiler(selected.clone()))?
        .clone();

    let source = received.get("Source").cloned().unwrap_or_default();
    workdir.write_source(&compiler.source_suffix, &source).await?;

    let activated: Vec<String> = received
        .get("CompilerOption")
        .map(|v| String::from_utf8_lossy(v).into_owned())
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let activated_refs: Vec<&str> = activated.iter().map(String::as_str).collect();
    let compile_args = compiler.assemble_compile_args(&activated_refs);

    let compile_launch = launcher::spawn_async(&compile_args, workdir.path(), false);
    let compile_status = match compile_launch {
        Ok(LaunchedChild {
            mut child,
            stdout,
            stderr,
            ..
        }) => {
            writer.write_frame("Control", b"Start").await.ok();
            info!(compiler = %compiler.name, "compile started");
            drain_pipes(
                &writer,
                vec![
                    Labeled {
                        reader: Box::new(stdout),
                        label: "CompilerMessageS",
                    },
                    Labeled {
                        reader: Box::new(stderr),
                        label: "CompilerMessageE",
                    },
                ],
            )
            .await;
            child.wait().await.ok()
        }
        Err(e) => {
            warn!(error = %e, "compile spawn failed");
            Some(synthetic_failure_status())
        }
    };

    let compile_ok = compile_status.as_ref().map(ExitStatus::success).unwrap_or(false);

    let final_status = if compile_ok {
        let run_args = compiler.assemble_run_args(&config.ptracer_path);
        match launcher::spawn_async(&run_args, workdir.path(), config.forward_stdin) {
            Ok(LaunchedChild {
                mut child,
                mut stdin,
                stdout,
                stderr,
            }) => {
                if config.forward_stdin {
                    if let (Some(stdin), Some(bytes)) = (stdin.as_mut(), received.get("Stdin")) {
                        let _ = stdin.write_all(bytes).await;
                    }
                }
                drop(stdin);
                drain_pipes(
                    &writer,
                    vec![
                        Labeled {
                            reader: Box::new(stdout),
                            label: "StdOut",
                        },
                        Labeled {
                            reader: Box::new(stderr),
                            label: "StdErr",
                        },
                    ],
                )
                .await;
                child.wait().await.ok()
            }
            Err(e) => {
                warn!(error = %e, "program spawn failed");
                None
            }
        }
    } else {
        compile_status
    };

    if let Some(status) = final_status {
        emit_termination_frames(&writer, status).await;
    }
    writer.write_frame("Control", b"Finish").await.ok();
    Ok(())
}

async fn version_branch<W: AsyncWrite + Unpin>(
    registry: &Registry,
    writer: &SerializedWriter<W>,
) -> Result<()> {
    let probe_dir = PathBuf::from("/");
    let mut listing = String::new();
    for c in registry.iter() {
        if !c.is_version_probeable() {
            continue;
        }
        let (out, status) = launcher::spawn_collect(&c.version_command, &probe_dir).await;
        if !status.map(|s| s.success()).unwrap_or(false) {
            continue;
        }
        let first_line = String::from_utf8_lossy(&out);
        let version = first_line.lines().next().unwrap_or("").trim();
        if version.is_empty() {
            continue;
        }
        listing.push_str(&format!(
            "{},{},{},{}\n",
            c.name, c.language, c.display_name, version
        ));
    }
    writer.write_frame("VersionResult", listing.as_bytes()).await.ok();
    Ok(())
}
