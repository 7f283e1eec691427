//! Rendering of log records into self-delimiting wire lines.

use crate::severity::Severity;

/// Maximum length in bytes of a rendered line, terminator included.
pub const MAX_LINE_LEN: usize = 2048;

/// Domain substituted when the caller passes an empty domain string.
pub const DEFAULT_DOMAIN: &str = "DEFAULT";

/// Render one record as `SEVERITY:DOMAIN: message\n`.
///
/// Pure function, no I/O. The result always ends in exactly one newline so
/// lines can be concatenated into a continuous stream, and never exceeds
/// [`MAX_LINE_LEN`] bytes; an oversized message is truncated at a UTF-8
/// boundary rather than rejected.
pub fn render(severity: Severity, domain: &str, message: &str) -> String {
    let domain = if domain.is_empty() {
        DEFAULT_DOMAIN
    } else {
        domain
    };
    let message = message.trim_end_matches('\n');

    let mut line = format!("{}:{}: {}", severity.name(), domain, message);
    if line.len() > MAX_LINE_LEN - 1 {
        let mut cut = MAX_LINE_LEN - 1;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
    }
    line.push('\n');
    line
}
