//! Object-name pattern expansion.
//!
//! Object names addressing counter groups in the remote store are produced
//! from a small template grammar persisted in configuration, so expansion has
//! to stay byte-identical across versions:
//!
//! - literal bytes pass through unchanged
//! - `%%` emits a literal `%`
//! - `%u` emits the authenticated user, or nothing
//! - `%r` emits the per-request user override when one was resolved, else the
//!   principal recipient, or nothing
//! - `%l` emits the statfile label, or nothing
//! - `%s` emits the fixed service marker
//! - any other character after `%` is emitted literally (the `%` is dropped)
//!
//! A recognized escape may be followed by a modifier character (`d`, reserved)
//! which is consumed without effect. Expansion runs in two passes sharing one
//! set of lookups: the first measures, the second writes into an exactly-sized
//! buffer.

/// Fixed 2-character service marker emitted by `%s`.
pub const SERVICE_MARKER: &str = "RS";

/// Data sources referenced by the pattern escapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpandSources<'a> {
    pub auth_user: Option<&'a str>,
    /// Per-request user override or principal recipient, already resolved by
    /// the caller so both passes see the same value.
    pub recipient: Option<&'a str>,
    pub label: Option<&'a str>,
}

/// Walk `pattern` once, feeding every produced fragment to `sink`.
///
/// Both expansion passes run through here so measuring and writing cannot
/// diverge.
fn scan<F: FnMut(&str)>(pattern: &str, src: &ExpandSources<'_>, mut sink: F) {
    let mut chars = pattern.chars().peekable();
    let mut scratch = [0u8; 4];

    while let Some(ch) = chars.next() {
        if ch != '%' {
            sink(ch.encode_utf8(&mut scratch));
            continue;
        }

        let escaped = match chars.next() {
            // Trailing '%' contributes nothing.
            None => break,
            Some(esc) => esc,
        };

        match escaped {
            '%' => sink("%"),
            'u' => {
                if let Some(user) = src.auth_user {
                    sink(user);
                }
                consume_modifier(&mut chars);
            }
            'r' => {
                if let Some(rcpt) = src.recipient {
                    sink(rcpt);
                }
                consume_modifier(&mut chars);
            }
            'l' => {
                // Label miss is OK.
                if let Some(label) = src.label {
                    sink(label);
                }
                consume_modifier(&mut chars);
            }
            's' => {
                sink(SERVICE_MARKER);
                consume_modifier(&mut chars);
            }
            other => sink(other.encode_utf8(&mut scratch)),
        }
    }
}

fn consume_modifier(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    // 'd' is reserved for a future digest modifier; consumed, no effect.
    if chars.peek() == Some(&'d') {
        chars.next();
    }
}

/// Expand `pattern` against `src`.
///
/// Returns `None` when the expansion is empty, which callers must treat as
/// failure: an empty object name would address a shared catch-all counter
/// group in the store.
pub fn expand_object(pattern: &str, src: &ExpandSources<'_>) -> Option<String> {
    let mut len = 0usize;
    scan(pattern, src, |fragment| len += fragment.len());

    if len == 0 {
        return None;
    }

    let mut out = String::with_capacity(len);
    scan(pattern, src, |fragment| out.push_str(fragment));
    debug_assert_eq!(out.len(), len);

    Some(out)
}
