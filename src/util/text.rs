use std::borrow::Cow;

/// Average adult silent reading speed used for read-time estimates.
pub const WORDS_PER_MINUTE: usize = 230;

/// Removes C0 control characters and DEL from feed-supplied text.
///
/// Tab, newline and carriage return are kept. Returns `Cow::Borrowed` when
/// nothing needs stripping, which is the overwhelmingly common case.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let needs_strip = s.chars().any(is_stripped_control);
    if !needs_strip {
        return Cow::Borrowed(s);
    }

    Cow::Owned(s.chars().filter(|c| !is_stripped_control(*c)).collect())
}

fn is_stripped_control(c: char) -> bool {
    (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r')) || c == '\u{7f}'
}

/// Line width handed to the renderer; wide enough that it never wraps
/// inside a word, since the output is re-flowed to single spaces anyway.
const RENDER_WIDTH: usize = 10_000;

/// Converts an HTML fragment into whitespace-normalized plain text.
///
/// Rendering goes through `html2text` without decoration, so entities are
/// decoded and markup adds no `*`/`[]` noise to word counts.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let rendered = html2text::config::plain_no_decorate()
        .string_from_read(html.as_bytes(), RENDER_WIDTH)
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "HTML rendering failed; dropping body text");
            String::new()
        });

    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Counts whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated reading time in whole minutes, rounded up, never below 1.
pub fn estimate_read_time(words: usize) -> u32 {
    let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
    u32::try_from(minutes).unwrap_or(u32::MAX)
}
