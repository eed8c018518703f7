//! Compute module seam: a synchronous jsonnet compiler.
//!
//! The playground core treats the compiler as a black box that either
//! returns the compiled output or fails with a structured error. The
//! shipped engine shells out to a `jsonnet` executable; tests plug in
//! closures via [`FnEngine`].

use std::path::PathBuf;
use std::sync::LazyLock;

use parking_lot::Mutex;
use regex::Regex;

use crate::error::{CompileError, Location};

/// A synchronous compiler behind the local backend.
///
/// `initialize` is the one-time startup cost (binary lookup, prelude
/// loading, ...). It may be called again after a failure - the local
/// backend memoizes success, not failure.
pub trait CompileEngine: Send + Sync {
    fn initialize(&self) -> Result<(), CompileError>;
    fn compile(&self, source: &str) -> Result<String, CompileError>;
}

// =============================================================================
// FnEngine
// =============================================================================

/// Closure-backed engine for tests and embedding.
pub struct FnEngine<F> {
    compile: F,
}

impl<F> FnEngine<F>
where
    F: Fn(&str) -> Result<String, CompileError> + Send + Sync,
{
    pub fn new(compile: F) -> Self {
        Self { compile }
    }
}

impl<F> CompileEngine for FnEngine<F>
where
    F: Fn(&str) -> Result<String, CompileError> + Send + Sync,
{
    fn initialize(&self) -> Result<(), CompileError> {
        Ok(())
    }

    fn compile(&self, source: &str) -> Result<String, CompileError> {
        (self.compile)(source)
    }
}

// =============================================================================
// JsonnetCli
// =============================================================================

/// Matches `<cmdline>:line:column` spans in jsonnet diagnostics (1-based)
static SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<cmdline>:(\d+):(\d+)").unwrap());

#[derive(Clone)]
struct Resolved {
    binary: PathBuf,
    /// Snippet prepended to every source, already trimmed
    prelude: String,
    /// Lines the prelude adds before the user's source
    prelude_lines: u32,
}

/// Engine that evaluates sources with a `jsonnet` executable.
///
/// Resolution of the binary and the optional prelude happens in
/// `initialize`, so a missing compiler is reported as a compile error on
/// first use and looked up again on the next attempt.
pub struct JsonnetCli {
    command: PathBuf,
    prelude_path: Option<PathBuf>,
    resolved: Mutex<Option<Resolved>>,
}

impl JsonnetCli {
    pub fn new(command: impl Into<PathBuf>, prelude_path: Option<PathBuf>) -> Self {
        Self {
            command: command.into(),
            prelude_path,
            resolved: Mutex::new(None),
        }
    }
}

impl CompileEngine for JsonnetCli {
    fn initialize(&self) -> Result<(), CompileError> {
        if self.resolved.lock().is_some() {
            return Ok(());
        }
        let binary = which::which(&self.command).map_err(|e| {
            CompileError::message(format!(
                "jsonnet compiler `{}` not found: {}",
                self.command.display(),
                e
            ))
        })?;
        let prelude = match &self.prelude_path {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| {
                    CompileError::message(format!(
                        "failed to read prelude `{}`: {}",
                        path.display(),
                        e
                    ))
                })?
                .trim_end()
                .to_string(),
            None => String::new(),
        };
        #[allow(clippy::cast_possible_truncation)]
        let prelude_lines = prelude.lines().count() as u32;
        *self.resolved.lock() = Some(Resolved {
            binary,
            prelude,
            prelude_lines,
        });
        Ok(())
    }

    fn compile(&self, source: &str) -> Result<String, CompileError> {
        let Some(resolved) = self.resolved.lock().clone() else {
            return Err(CompileError::message("compiler engine is not initialized"));
        };
        let full = if resolved.prelude.is_empty() {
            source.to_string()
        } else {
            format!("{}\n{}", resolved.prelude, source)
        };
        let output = std::process::Command::new(&resolved.binary)
            .arg("-e")
            .arg(&full)
            .output()
            .map_err(|e| {
                CompileError::message(format!(
                    "failed to run `{}`: {}",
                    resolved.binary.display(),
                    e
                ))
            })?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
        } else {
            Err(parse_diagnostics(
                &String::from_utf8_lossy(&output.stderr),
                resolved.prelude_lines,
            ))
        }
    }
}

/// Turn a jsonnet stderr dump into a structured error.
///
/// The first non-empty line becomes the message, the full dump becomes the
/// excerpt, and the first `<cmdline>:l:c` span (1-based) becomes a zero-based
/// location. Spans that point inside the prelude don't refer to the user's
/// source, so they are dropped; spans after it are shifted back.
fn parse_diagnostics(stderr: &str, prelude_lines: u32) -> CompileError {
    let message = stderr
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("compilation failed")
        .trim()
        .to_string();

    let mut error = CompileError::message(message);

    let excerpt = stderr.trim_end();
    if excerpt.lines().count() > 1 {
        error = error.with_code(excerpt);
    }

    let location = SPAN_RE.captures(stderr).and_then(|caps| {
        let line: u32 = caps[1].parse().ok()?;
        let column: u32 = caps[2].parse().ok()?;
        let line = line.checked_sub(1)?;
        let column = column.checked_sub(1)?;
        let line = line.checked_sub(prelude_lines)?;
        Some(Location::new(line, column))
    });
    if let Some(location) = location {
        error = error.with_location(location);
    }
    error
}
