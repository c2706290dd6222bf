mod catalog;

use anyhow::Context;
use clap::Parser;
use dispatchd::{Acceptor, SessionConfig};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Accepts compile-and-run requests over a framed TCP protocol")]
struct Opt {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:3500")]
    listen: SocketAddr,

    /// Base directory under which each session's workdir is created.
    #[arg(long, default_value = "/tmp/wandbox")]
    workdir_base: PathBuf,

    /// Path to the sandbox launcher binary, prepended to every run argv.
    /// Defaults to `ptracer.exe` next to the server's current directory.
    #[arg(long)]
    ptracer: Option<String>,

    /// Path to the JSON compiler catalog.
    #[arg(long, default_value = "compilers.json")]
    catalog: PathBuf,

    /// Forward buffered `Stdin` frames to the program child instead of
    /// closing its stdin immediately after spawn.
    #[arg(long)]
    forward_stdin: bool,
}

fn default_ptracer_path() -> anyhow::Result<String> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    Ok(cwd.join("ptracer.exe").to_string_lossy().into_owned())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = Opt::parse();
    let registry = catalog::load(&opt.catalog)
        .with_context(|| format!("loading compiler catalog from {}", opt.catalog.display()))?;
    let ptracer_path = match opt.ptracer {
        Some(p) => p,
        None => default_ptracer_path()?,
    };

    let config = SessionConfig {
        workdir_base: opt.workdir_base,
        ptracer_path,
        forward_stdin: opt.forward_stdin,
    };

    let acceptor = Acceptor::bind(opt.listen, registry, config)
        .await
        .context("binding listener")?;
    tracing::info!(addr = %acceptor.local_addr()?, "listening");
    acceptor.serve().await?;
    Ok(())
}
