use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Local};
use owo_colors::{OwoColorize, Stream, Style};

pub const PREFIX: &str = "[smv-eval]";

const RULE: &str = "-----------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Info,
    Command,
    Success,
    Failure,
}

fn style_prefix() -> Style {
    Style::new().cyan().bold()
}

/// One `[smv-eval] ...` status line, without the trailing newline.
pub fn format_line(kind: LineKind, message: &str) -> String {
    let prefix = PREFIX
        .if_supports_color(Stream::Stdout, |s| s.style(style_prefix()))
        .to_string();
    let body = match kind {
        LineKind::Info => message.to_string(),
        LineKind::Command => format!(
            "Executing: {}",
            message.if_supports_color(Stream::Stdout, |s| s.dimmed())
        ),
        LineKind::Success => message
            .if_supports_color(Stream::Stdout, |s| s.green())
            .to_string(),
        LineKind::Failure => message
            .if_supports_color(Stream::Stdout, |s| s.red())
            .to_string(),
    };
    format!("{} {}", prefix, body)
}

pub fn format_welcome() -> String {
    let banner = format!(
        "{}Welcome{}",
        "-".repeat(44),
        "-".repeat(38)
    );
    format_line(LineKind::Info, &banner)
}

pub fn format_started(at: DateTime<Local>) -> String {
    format_line(
        LineKind::Info,
        &format!("Started at {}", at.format("%Y-%m-%d %H:%M:%S")),
    )
}

/// Final report. Seconds with millisecond precision.
pub fn format_elapsed(elapsed: Duration) -> String {
    format_line(
        LineKind::Info,
        &format!("Finished, time: {:.3} seconds.", elapsed.as_secs_f64()),
    )
}

/// Writes status lines for one invocation. Write errors (a closed stdout)
/// are ignored so they never abort a run.
pub struct Console<'a> {
    out: &'a mut dyn Write,
}

impl<'a> Console<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self { out }
    }

    pub fn raw(&mut self, line: &str) {
        let _ = writeln!(self.out, "{}", line);
        let _ = self.out.flush();
    }

    pub fn info(&mut self, message: &str) {
        self.raw(&format_line(LineKind::Info, message));
    }

    pub fn command(&mut self, command: &str) {
        self.raw(&format_line(LineKind::Command, command));
    }

    pub fn success(&mut self, message: &str) {
        self.raw(&format_line(LineKind::Success, message));
    }

    pub fn failure(&mut self, message: &str) {
        self.raw(&format_line(LineKind::Failure, message));
    }

    pub fn rule(&mut self) {
        self.raw(&format_line(LineKind::Info, RULE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn lines_carry_prefix() {
        let line = format_line(LineKind::Info, "Runs 10");
        assert!(line.contains("[smv-eval]"));
        assert!(line.ends_with("Runs 10"));
    }

    #[test]
    fn command_lines_say_executing() {
        let line = format_line(LineKind::Command, "ab -k -n 10");
        assert!(line.contains("Executing: "));
        assert!(line.contains("ab -k -n 10"));
    }

    #[test]
    fn welcome_banner() {
        assert!(format_welcome().contains("Welcome"));
    }

    #[test]
    fn elapsed_in_seconds() {
        let line = format_elapsed(Duration::from_millis(12_345));
        assert!(line.contains("Finished, time: 12.345 seconds."), "{line}");
        let line = format_elapsed(Duration::ZERO);
        assert!(line.contains("0.000 seconds."), "{line}");
    }

    #[test]
    fn started_timestamp() {
        let at = Local.with_ymd_and_hms(2026, 2, 18, 9, 5, 0).unwrap();
        assert!(format_started(at).contains("Started at 2026-02-18 09:05:00"));
    }

    #[test]
    fn console_writes_one_line_per_call() {
        let mut buf = Vec::new();
        {
            let mut console = Console::new(&mut buf);
            console.info("one");
            console.failure("two");
            console.rule();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("two"));
        assert!(lines[2].contains("-----"));
    }
}
