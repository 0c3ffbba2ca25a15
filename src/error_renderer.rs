//! Renders a [`Diagnostic`] as a pretty, source-annotated report using
//! `ariadne`, the way a human reads a compiler error: the offending span
//! underlined in context, not just a bare message.

use std::io;

use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};

use stackvm_core::{Diagnostic, Severity};

fn byte_offset(source: &str, line: u32, col: u32) -> usize {
    let mut offset = 0;
    for (idx, text_line) in source.split('\n').enumerate() {
        if idx as u32 + 1 == line {
            return offset + (col.saturating_sub(1) as usize).min(text_line.len());
        }
        offset += text_line.len() + 1;
    }
    source.len()
}

fn span_range(source: &str, span: &stackvm_core::lexer::Span) -> std::ops::Range<usize> {
    let start = byte_offset(source, span.start_line, span.start_col);
    let end = byte_offset(source, span.end_line, span.end_col).max(start) + 1;
    start..end.min(source.len()).max(start)
}

/// Prints `diagnostic` to stderr with `source` as the surrounding context.
pub fn render_error(diagnostic: &Diagnostic, source_name: &str, source: &str) {
    render_error_to(diagnostic, source_name, source, &mut io::stderr());
}

pub fn render_error_to(
    diagnostic: &Diagnostic,
    source_name: &str,
    source: &str,
    writer: &mut impl io::Write,
) {
    let kind = match diagnostic.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
    };
    let mut colors = ColorGenerator::new();
    let mut builder = Report::build(kind, source_name, 0).with_message(&diagnostic.message);

    if let Some(span) = &diagnostic.span {
        let range = span_range(source, span);
        builder = builder.with_label(
            Label::new((source_name, range))
                .with_message(&diagnostic.message)
                .with_color(colors.next()),
        );
    }

    let report = builder.finish();
    let _ = report.write((source_name, Source::from(source)), writer);
}

/// Renders to a `String`, for tests and any host that doesn't want to write
/// straight to a stream (the debugger REPL's `print` command, for instance).
pub fn render_error_to_string(diagnostic: &Diagnostic, source_name: &str, source: &str) -> String {
    let mut buf = Vec::new();
    render_error_to(diagnostic, source_name, source, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackvm_core::lexer::Span;

    #[test]
    fn renders_message_into_output() {
        let diagnostic = Diagnostic::error(
            "undefined variable 'x'",
            Some(Span {
                start_line: 1,
                start_col: 5,
                end_line: 1,
                end_col: 5,
            }),
        );
        let text = render_error_to_string(&diagnostic, "test.sv", "print x;");
        assert!(text.contains("undefined variable"));
    }

    #[test]
    fn renders_without_span() {
        let diagnostic = Diagnostic::error("something went wrong", None);
        let text = render_error_to_string(&diagnostic, "test.sv", "print x;");
        assert!(text.contains("something went wrong"));
    }
}
