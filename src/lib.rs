/*!
 * A network-accessible compile-and-run dispatcher.
 *
 * Accepts TCP connections, reads a framed request describing a program
 * (source, compiler selection, option flags), compiles it in an isolated
 * per-connection working directory, and — on successful compile — runs the
 * produced program under a sandbox launcher, streaming both children's
 * stdout/stderr back to the client interleaved with protocol control
 * records.
 *
 * Loading the compiler catalog from its on-disk form, and the sandbox
 * launcher binary itself, are both out of scope for this crate: callers
 * inject a [`registry::Registry`] and a launcher path via
 * [`session::SessionConfig`].
 */
pub mod acceptor;
pub mod codec;
pub mod error;
pub mod launcher;
pub mod multiplexer;
pub mod registry;
pub mod session;
pub mod workdir;

pub use acceptor::Acceptor;
pub use error::{Error, ErrorKind, Result};
pub use registry::{CompilerTrait, Registry, Switch};
pub use session::SessionConfig;
