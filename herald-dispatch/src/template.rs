//! Subject and body template rendering
//!
//! Templates substitute `{name}` and `{real_name}` per recipient; `{{` and
//! `}}` escape to literal braces. An unknown placeholder is an error rather
//! than a silent no-op, the job author must find out their template is
//! wrong, but the error is per-recipient and never fatal to a run.

use herald_common::Recipient;
use thiserror::Error;

/// Template rendering errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The template references a placeholder the engine does not provide.
    #[error("Unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    /// A `{` was opened but never closed.
    #[error("Unclosed placeholder")]
    UnclosedPlaceholder,

    /// A `}` appeared outside any placeholder (use `}}` for a literal).
    #[error("Stray '}}' outside a placeholder")]
    StrayBrace,
}

/// Render a template against one recipient.
///
/// `{real_name}` falls back to the display name when the recipient has no
/// formal name on record.
///
/// # Errors
/// Returns a [`RenderError`] for unknown placeholders, an unclosed `{`, or
/// a stray `}`.
pub fn render(template: &str, recipient: &Recipient) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }

                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(k) => key.push(k),
                        None => return Err(RenderError::UnclosedPlaceholder),
                    }
                }

                match key.as_str() {
                    "name" => out.push_str(&recipient.name),
                    "real_name" => out.push_str(recipient.real_name_or_name()),
                    _ => return Err(RenderError::UnknownPlaceholder(key)),
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(RenderError::StrayBrace);
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}
