//! Parses the on-disk compiler catalog into the in-memory [`dispatchd::Registry`].
//!
//! This is explicitly outside the core engine's responsibility (see the
//! crate docs on `dispatchd`), but a runnable binary needs one, so it lives
//! here at the boundary next to the other deployment-specific wiring.
use anyhow::{Context, Result};
use dispatchd::{CompilerTrait, Registry};
use std::path::Path;

/// Loads a JSON array of [`CompilerTrait`] records from `path`.
pub fn load(path: &Path) -> Result<Registry> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading compiler catalog at {}", path.display()))?;
    let traits: Vec<CompilerTrait> = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing compiler catalog at {}", path.display()))?;
    Ok(Registry::new(traits))
}
