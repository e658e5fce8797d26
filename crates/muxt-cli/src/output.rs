//! Terminal output for the muxt commands.
//!
//! Two kinds of text leave muxt. *Reports* — route tables, cross-reference
//! listings, template source — are the command's product: they go to stdout
//! verbatim, uncolored and never muted, so `muxt routes | grep POST` works.
//! *Status lines* — progress, success, failure summaries — are for humans:
//! they carry a rustc-style prefix (`ok:`, `error:`, `warning:`), take
//! color when stdout is a terminal, and `--quiet` mutes all but failures.

use std::io::{self, IsTerminal};

use console::Term;
use owo_colors::OwoColorize;

use crate::cli::GlobalArgs;

/// The prefix a status line carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Success,
    Warning,
    Failure,
}

impl Tone {
    fn prefix(self) -> &'static str {
        match self {
            Tone::Success => "ok:",
            Tone::Warning => "warning:",
            Tone::Failure => "error:",
        }
    }
}

/// Routes every command's text to the terminal, honoring `--quiet` and
/// `--no-color`.
pub struct OutputManager {
    quiet: bool,
    color: bool,
    term: Term,
}

impl OutputManager {
    pub fn new(args: &GlobalArgs) -> Self {
        Self {
            quiet: args.quiet,
            // NO_COLOR, the flag, or a pipe each turn color off.
            color: !args.no_color && io::stdout().is_terminal(),
            term: Term::stdout(),
        }
    }

    /// Command output proper. Never muted, never decorated.
    pub fn report(&self, line: &str) -> io::Result<()> {
        self.term.write_line(line)
    }

    /// An undecorated progress line, muted by `--quiet`.
    pub fn print(&self, line: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.term.write_line(line)
    }

    /// A section header, for runs spanning several templates variables.
    pub fn header(&self, text: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let line = if self.color {
            text.bold().to_string()
        } else {
            text.to_string()
        };
        self.term.write_line(&line)
    }

    pub fn success(&self, msg: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.status(Tone::Success, msg)
    }

    pub fn warning(&self, msg: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.status(Tone::Warning, msg)
    }

    /// Failure summary. Deliberately immune to `--quiet`: a muted run must
    /// still say why it exited 1.
    pub fn error(&self, msg: &str) -> io::Result<()> {
        self.status(Tone::Failure, msg)
    }

    fn status(&self, tone: Tone, msg: &str) -> io::Result<()> {
        self.term.write_line(&status_line(self.color, tone, msg))
    }
}

fn status_line(color: bool, tone: Tone, msg: &str) -> String {
    if !color {
        return format!("{} {msg}", tone.prefix());
    }
    let prefix = match tone {
        Tone::Success => tone.prefix().green().bold().to_string(),
        Tone::Warning => tone.prefix().yellow().bold().to_string(),
        Tone::Failure => tone.prefix().red().bold().to_string(),
    };
    format!("{prefix} {msg}")
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(quiet: bool) -> OutputManager {
        OutputManager::new(&GlobalArgs {
            chdir: None,
            verbose: 0,
            quiet,
            no_color: true,
        })
    }

    #[test]
    fn plain_status_lines_use_rustc_style_prefixes() {
        assert_eq!(status_line(false, Tone::Success, "wrote 2 files"), "ok: wrote 2 files");
        assert_eq!(status_line(false, Tone::Warning, "1 unused"), "warning: 1 unused");
        assert_eq!(status_line(false, Tone::Failure, "3 problems"), "error: 3 problems");
    }

    #[test]
    fn colored_status_keeps_the_message_bare() {
        // Only the prefix is styled; the message must survive a dumb grep.
        let line = status_line(true, Tone::Failure, "3 problems");
        assert!(line.ends_with(" 3 problems"));
        assert!(line.contains("error:"));
    }

    #[test]
    fn quiet_mutes_progress_but_not_failures() {
        let out = manager(true);
        // These short-circuit before touching the terminal.
        assert!(out.print("working…").is_ok());
        assert!(out.success("done").is_ok());
        assert!(out.warning("meh").is_ok());
        // error() always attempts the write.
        assert!(out.error("broken").is_ok());
    }

    #[test]
    fn reports_ignore_quiet_entirely() {
        let out = manager(true);
        assert!(out.report("GET /user/{id}").is_ok());
    }
}
