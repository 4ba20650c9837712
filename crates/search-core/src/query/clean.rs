//! Pre-tokenization scrub for free-form user input.
//!
//! Repairs the constructs the grammar cannot recover from on its own:
//! unterminated phrases, unbalanced parentheses, unclosed or stray range
//! brackets, dangling escapes, and control characters.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenRange {
    /// `[` or `{`, closed by `]`, `}` or `>`.
    Bracket(char),
    /// A leading `<` that may be closed by `]` or `}` (`<b]`).
    Upper { seen_bound: bool },
}

pub(crate) fn clean_query_string(input: &str) -> String {
    let mut cleaned = String::with_capacity(input.len() + 4);
    let mut chars = input.chars();
    let mut in_phrase = false;
    let mut paren_depth = 0usize;
    let mut open_range: Option<OpenRange> = None;

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) if !next.is_control() => {
                    cleaned.push('\\');
                    cleaned.push(next);
                }
                Some(next) if next.is_whitespace() => cleaned.push(' '),
                _ => {}
            }
            continue;
        }
        if ch.is_control() {
            if ch.is_whitespace() {
                cleaned.push(' ');
                if let Some(OpenRange::Upper { seen_bound: true }) = open_range {
                    open_range = None;
                }
            }
            continue;
        }

        if in_phrase {
            if ch == '"' {
                in_phrase = false;
            }
            cleaned.push(ch);
            continue;
        }

        match ch {
            '"' => {
                in_phrase = true;
                cleaned.push(ch);
            }
            '(' => {
                paren_depth += 1;
                cleaned.push(ch);
            }
            ')' => {
                if paren_depth > 0 {
                    paren_depth -= 1;
                    cleaned.push(ch);
                }
            }
            '[' | '{' => {
                if open_range.is_none() {
                    open_range = Some(OpenRange::Bracket(ch));
                    cleaned.push(ch);
                }
            }
            ']' | '}' => {
                if open_range.is_some() {
                    open_range = None;
                    cleaned.push(ch);
                }
            }
            '>' if matches!(open_range, Some(OpenRange::Bracket(_))) => {
                open_range = None;
                cleaned.push(ch);
            }
            '<' if open_range.is_none() => {
                open_range = Some(OpenRange::Upper { seen_bound: false });
                cleaned.push(ch);
            }
            _ => {
                match open_range {
                    Some(OpenRange::Upper { seen_bound: true }) if ch.is_whitespace() => {
                        open_range = None;
                    }
                    Some(OpenRange::Upper { .. }) if !ch.is_whitespace() && ch != '=' => {
                        open_range = Some(OpenRange::Upper { seen_bound: true });
                    }
                    _ => {}
                }
                cleaned.push(ch);
            }
        }
    }

    if in_phrase {
        cleaned.push('"');
    }
    match open_range {
        Some(OpenRange::Bracket('{')) => cleaned.push('}'),
        Some(OpenRange::Bracket(_)) => cleaned.push(']'),
        _ => {}
    }
    for _ in 0..paren_depth {
        cleaned.push(')');
    }

    cleaned
}
