//! adhoc-tools — shared plumbing for the Adhoc container CLIs.
//!
//! Pools what the binaries need and the codec should not carry: file and
//! stdin I/O, UTF-8 path handling, wall-clock formatting and color-mode
//! setup. Everything returns `anyhow::Result` so the binaries can stack
//! context on failures.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

/// Version of the tool suite.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Small version banner for logs and `--version`-adjacent output.
pub fn version_banner(tool: &str) -> String {
    format!("{tool} — adhoc-tools {VERSION}")
}

/* ------------------------------------------------------------------------- */
/* Prelude                                                                   */
/* ------------------------------------------------------------------------- */

/// Compact re-exports for the binaries.
pub mod prelude {
    pub use anyhow::{anyhow, Context, Result};
    pub use camino::{Utf8Path, Utf8PathBuf};

    pub use crate::{
        human_millis, read_bytes, read_stdin_to_bytes, setup_colors, to_utf8, version_banner,
        write_text, ColorMode, Timer,
    };
}

/* ------------------------------------------------------------------------- */
/* I/O utils                                                                 */
/* ------------------------------------------------------------------------- */

/// Reads a binary file.
pub fn read_bytes(path: &Utf8Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {path}"))
}

/// Reads all of stdin as bytes.
pub fn read_stdin_to_bytes() -> Result<Vec<u8>> {
    let mut v = Vec::new();
    io::stdin().read_to_end(&mut v)?;
    Ok(v)
}

/// Writes text (UTF-8), creating parent directories as needed.
pub fn write_text(path: &Utf8Path, s: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = fs::File::create(path)?;
    f.write_all(s.as_bytes())?;
    Ok(())
}

/// Converts a `PathBuf` into a `Utf8PathBuf` (errors on non-UTF-8 paths).
pub fn to_utf8(p: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(p).map_err(|_| anyhow!("path is not UTF-8"))
}

/* ------------------------------------------------------------------------- */
/* Time                                                                      */
/* ------------------------------------------------------------------------- */

/// Simple scope stopwatch.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Starts the stopwatch.
    pub fn start() -> Self { Self { start: Instant::now() } }
    /// Elapsed time so far.
    pub fn elapsed(&self) -> Duration { self.start.elapsed() }
    /// Short human form of the elapsed time.
    pub fn pretty(&self) -> String { human_millis(self.elapsed()) }
}

/// Human-readable duration.
pub fn human_millis(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 {
        return format!("{ms} ms");
    }
    let s = ms as f64 / 1000.0;
    if s < 60.0 {
        return format!("{s:.3} s");
    }
    let m = (s / 60.0).floor();
    let rest = s - m * 60.0;
    format!("{m:.0} min {rest:.1} s")
}

/* ------------------------------------------------------------------------- */
/* Colors                                                                    */
/* ------------------------------------------------------------------------- */

/// Controls ANSI colors in CLI output.
#[derive(Clone, Copy, Debug)]
pub enum ColorMode {
    /// Colors only when the output supports ANSI (auto-detected).
    Auto,
    /// Colors forced on.
    Always,
    /// Colors off.
    Never,
}

/// Applies the global yansi color mode.
pub fn setup_colors(mode: ColorMode) {
    match mode {
        ColorMode::Auto => yansi::whenever(yansi::Condition::DEFAULT),
        ColorMode::Always => yansi::enable(),
        ColorMode::Never => yansi::disable(),
    }
}

/* ------------------------------------------------------------------------- */
/* Tests                                                                     */
/* ------------------------------------------------------------------------- */
