//! Script-facing log surface, rendered through `tracing`.

use scriptbind_value::{ScriptValue, node_from_script};

/// Rendered messages are capped at this many bytes.
const MAX_MESSAGE: usize = 2048;

/// Severities the script layer can log at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    /// Parses the level names scripts use.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "error" => Some(LogLevel::Error),
            "warning" => Some(LogLevel::Warning),
            "notice" => Some(LogLevel::Notice),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

pub(crate) fn emit(level: LogLevel, scope: &str, message: &str) {
    match level {
        LogLevel::Error => tracing::error!(scope, "{message}"),
        LogLevel::Warning => tracing::warn!(scope, "{message}"),
        LogLevel::Notice => tracing::info!(scope, "{message}"),
        LogLevel::Info => tracing::debug!(scope, "{message}"),
        LogLevel::Debug => tracing::trace!(scope, "{message}"),
    }
}

/// Renders a printf-style format string against script values.
///
/// `%s`, `%d`, `%f` and `%%` are honored; a missing or mistyped argument
/// renders as `nil` rather than failing, and any other specifier is kept
/// verbatim. The result is truncated to 2048 bytes.
pub(crate) fn render_format(format: &str, args: &[ScriptValue]) -> String {
    let mut out = String::new();
    let mut next = 0usize;
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if out.len() >= MAX_MESSAGE {
            break;
        }
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                out.push_str(&display_value(args.get(next)));
                next += 1;
            }
            Some('d') => {
                let rendered = match args.get(next) {
                    Some(ScriptValue::Int(i)) => i.to_string(),
                    Some(ScriptValue::Float(f)) => (*f as i64).to_string(),
                    Some(ScriptValue::Bool(b)) => i64::from(*b).to_string(),
                    _ => "nil".to_owned(),
                };
                out.push_str(&rendered);
                next += 1;
            }
            Some('f') => {
                let rendered = match args.get(next) {
                    Some(ScriptValue::Float(f)) => f.to_string(),
                    Some(ScriptValue::Int(i)) => format!("{:.1}", *i as f64),
                    _ => "nil".to_owned(),
                };
                out.push_str(&rendered);
                next += 1;
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    truncate_bytes(out)
}

fn truncate_bytes(mut out: String) -> String {
    if out.len() > MAX_MESSAGE {
        let mut cut = MAX_MESSAGE;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

/// `%s` rendering for any script value.
pub(crate) fn display_value(value: Option<&ScriptValue>) -> String {
    match value {
        None | Some(ScriptValue::Nil) => "nil".to_owned(),
        Some(ScriptValue::Bool(b)) => b.to_string(),
        Some(ScriptValue::Int(i)) => i.to_string(),
        Some(ScriptValue::Float(f)) => f.to_string(),
        Some(ScriptValue::Str(s)) => s.clone(),
        Some(table @ ScriptValue::Table(_)) => node_from_script(table)
            .ok()
            .and_then(|node| node.to_json().ok())
            .map_or_else(|| "<table>".to_owned(), |json| json.to_string()),
        Some(ScriptValue::Opaque(_)) => "<opaque>".to_owned(),
    }
}
