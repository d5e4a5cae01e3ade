//! Command Preprocessor: rewrites `typeset`/`declare -f|-F|-p` at command
//! positions to the builtin `gsh_typeset`, byte-for-byte preserving
//! everything else (SPEC_FULL §4.2).
//!
//! Single-pass, O(n), deterministic state machine over
//! `{Normal, SingleQuote, DoubleQuote, Comment, Heredoc, CmdSubstitution, ArrayLiteral}`.

/// Hard cap on preprocessor input; longer input is truncated before
/// processing (SPEC_FULL §4.2, §9 — ambiguous-but-preserved behaviour).
pub const MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuote,
    DoubleQuote,
    Comment,
    Heredoc { terminator: String, strip_tabs: bool },
    CmdSubstitution { depth: u32 },
    ArrayLiteral { depth: u32 },
}

/// Rewrite `typeset`/`declare -f|-F|-p` at command positions in `input`.
///
/// Returns the rewritten string. Input longer than [`MAX_INPUT_BYTES`] is
/// silently truncated first (see SPEC_FULL §9 design notes); callers that
/// care about truncation should check `input.len()` themselves and log.
pub fn preprocess(input: &str) -> String {
    let input = if input.len() > MAX_INPUT_BYTES {
        tracing::warn!(
            original_len = input.len(),
            cap = MAX_INPUT_BYTES,
            "preprocessor input truncated"
        );
        truncate_at_char_boundary(input, MAX_INPUT_BYTES)
    } else {
        input
    };

    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut state = State::Normal;
    let mut i = 0usize;
    // True when the previous byte emitted puts us at a "command position":
    // start of input, or right after \n ; | & ( { or whitespace.
    let mut at_command_position = true;

    while i < bytes.len() {
        match &mut state {
            State::Normal => {
                if at_command_position {
                    if let Some((replacement, consumed)) = try_match_rewrite(&input[i..]) {
                        out.push_str(&replacement);
                        i += consumed;
                        at_command_position = false;
                        continue;
                    }
                }

                let b = bytes[i];
                match b {
                    b'\'' => {
                        state = State::SingleQuote;
                        at_command_position = false;
                    }
                    b'"' => {
                        state = State::DoubleQuote;
                        at_command_position = false;
                    }
                    b'#' if at_command_position => {
                        state = State::Comment;
                    }
                    b'<' if bytes.get(i + 1) == Some(&b'<') => {
                        let (heredoc_state, consumed) = parse_heredoc_opener(&input[i..]);
                        out.push_str(&input[i..i + consumed]);
                        i += consumed;
                        state = heredoc_state;
                        at_command_position = false;
                        continue;
                    }
                    b'$' if bytes.get(i + 1) == Some(&b'(') => {
                        out.push_str("$(");
                        i += 2;
                        state = State::CmdSubstitution { depth: 1 };
                        at_command_position = false;
                        continue;
                    }
                    b'=' if bytes.get(i + 1) == Some(&b'(') && preceded_by_identifier(&out) => {
                        out.push_str("=(");
                        i += 2;
                        state = State::ArrayLiteral { depth: 1 };
                        at_command_position = false;
                        continue;
                    }
                    b'\n' | b';' | b'|' | b'&' | b'(' | b'{' => {
                        at_command_position = true;
                    }
                    _ if b.is_ascii_whitespace() => {
                        // whitespace preserves command-position status
                    }
                    _ => {
                        at_command_position = false;
                    }
                }
                let len = char_len_at(bytes, i);
                out.push_str(&input[i..i + len]);
                i += len;
            }
            State::SingleQuote => {
                let b = bytes[i];
                let len = char_len_at(bytes, i);
                out.push_str(&input[i..i + len]);
                i += len;
                if b == b'\'' {
                    state = State::Normal;
                }
            }
            State::DoubleQuote => {
                let b = bytes[i];
                let len = char_len_at(bytes, i);
                out.push_str(&input[i..i + len]);
                i += len;
                if b == b'\\' && i < bytes.len() {
                    let elen = char_len_at(bytes, i);
                    out.push_str(&input[i..i + elen]);
                    i += elen;
                } else if b == b'"' {
                    state = State::Normal;
                }
            }
            State::Comment => {
                let b = bytes[i];
                let len = char_len_at(bytes, i);
                out.push_str(&input[i..i + len]);
                i += len;
                if b == b'\n' {
                    state = State::Normal;
                    at_command_position = true;
                }
            }
            State::Heredoc {
                terminator,
                strip_tabs,
            } => {
                let rest = &input[i..];
                let line_end = rest.find('\n').map(|p| p + 1).unwrap_or(rest.len());
                let line = &rest[..line_end];
                let line_body = line.trim_end_matches('\n');
                let trimmed = if *strip_tabs {
                    line_body.trim_start_matches('\t')
                } else {
                    line_body
                };
                out.push_str(line);
                i += line_end;
                if trimmed == terminator.as_str() || rest.is_empty() {
                    state = State::Normal;
                    at_command_position = true;
                }
            }
            State::CmdSubstitution { depth } => {
                let b = bytes[i];
                let len = char_len_at(bytes, i);
                out.push_str(&input[i..i + len]);
                i += len;
                match b {
                    b'(' => *depth += 1,
                    b')' => {
                        *depth -= 1;
                        if *depth == 0 {
                            state = State::Normal;
                        }
                    }
                    _ => {}
                }
            }
            State::ArrayLiteral { depth } => {
                let b = bytes[i];
                let len = char_len_at(bytes, i);
                out.push_str(&input[i..i + len]);
                i += len;
                match b {
                    b'(' => *depth += 1,
                    b')' => {
                        *depth -= 1;
                        if *depth == 0 {
                            state = State::Normal;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    out
}

/// Parse the `<<` / `<<-` opener starting at `s`, returning the Heredoc state
/// to transition to and the number of bytes consumed (through the newline
/// that starts the heredoc body, inclusive, if present).
fn parse_heredoc_opener(s: &str) -> (State, usize) {
    let bytes = s.as_bytes();
    let mut i = 2usize; // skip "<<"
    let strip_tabs = bytes.get(i) == Some(&b'-');
    if strip_tabs {
        i += 1;
    }
    while bytes.get(i).is_some_and(|b| b.is_ascii_whitespace() && *b != b'\n') {
        i += 1;
    }
    let term_start = i;
    let quoted = matches!(bytes.get(i), Some(b'\'') | Some(b'"'));
    if quoted {
        i += 1;
        let quote = bytes[term_start];
        while bytes.get(i).is_some_and(|b| *b != quote) {
            i += 1;
        }
        let terminator = s[term_start + 1..i].to_string();
        if bytes.get(i).is_some() {
            i += 1; // closing quote
        }
        // consume to end of line
        while bytes.get(i).is_some_and(|b| *b != b'\n') {
            i += 1;
        }
        if bytes.get(i) == Some(&b'\n') {
            i += 1;
        }
        return (
            State::Heredoc {
                terminator,
                strip_tabs,
            },
            i,
        );
    }
    while bytes
        .get(i)
        .is_some_and(|b| !b.is_ascii_whitespace())
    {
        i += 1;
    }
    let terminator = s[term_start..i].to_string();
    while bytes.get(i).is_some_and(|b| *b != b'\n') {
        i += 1;
    }
    if bytes.get(i) == Some(&b'\n') {
        i += 1;
    }
    (
        State::Heredoc {
            terminator,
            strip_tabs,
        },
        i,
    )
}

/// Does `out` end with an identifier (variable name), making a following
/// `=(` an array-literal assignment rather than something else?
fn preceded_by_identifier(out: &str) -> bool {
    let ident_end = out.len();
    let mut start = ident_end;
    for (idx, c) in out.char_indices().rev() {
        if c.is_ascii_alphanumeric() || c == '_' {
            start = idx;
        } else {
            break;
        }
    }
    start < ident_end
        && out[start..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
}

/// At `s` (known to be at a command position), try to match
/// `typeset`/`declare` followed by whitespace and a `-f`/`-F`/`-p` flag
/// prefix. Returns the replacement text and bytes consumed if matched.
fn try_match_rewrite(s: &str) -> Option<(String, usize)> {
    const KEYWORDS: [&str; 2] = ["typeset", "declare"];
    for kw in KEYWORDS {
        if let Some(rest) = s.strip_prefix(kw) {
            let mut ws_len = 0usize;
            let rest_bytes = rest.as_bytes();
            while rest_bytes.get(ws_len).is_some_and(|b| b.is_ascii_whitespace() && *b != b'\n') {
                ws_len += 1;
            }
            if ws_len == 0 {
                continue;
            }
            let after_ws = &rest[ws_len..];
            let flag = &after_ws.as_bytes();
            if flag.first() == Some(&b'-')
                && matches!(flag.get(1), Some(b'f') | Some(b'F') | Some(b'p'))
            {
                let prefix_len = 2; // "-f" / "-F" / "-p"
                let consumed = kw.len() + ws_len + prefix_len;
                let whitespace = &rest[..ws_len];
                let replacement = format!("gsh_typeset{}{}", whitespace, &after_ws[..prefix_len]);
                return Some((replacement, consumed));
            }
        }
    }
    None
}

/// Length in bytes of the UTF-8 character starting at `bytes[i]`, so
/// multi-byte sequences can be copied into `out` whole instead of
/// byte-by-byte (which would split a lead byte from its continuation
/// bytes and reinterpret each as its own, wrong, Latin-1 code point).
fn char_len_at(bytes: &[u8], i: usize) -> usize {
    match bytes[i] {
        b if b < 0x80 => 1,
        b if b >> 5 == 0b110 => 2,
        b if b >> 4 == 0b1110 => 3,
        b if b >> 3 == 0b11110 => 4,
        _ => 1,
    }
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
