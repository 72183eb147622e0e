//! Statement splitting for scripts and the interactive buffer.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

/// Result of scanning SQL text.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Split {
    /// Statements terminated by `;`, without the terminator.
    pub statements: Vec<String>,
    /// Text after the last terminator, trimmed. Empty when nothing is left.
    pub remainder: String,
    /// Whether the scan ended inside a literal, identifier or block comment.
    pub open: bool,
}

/// Scan `input`, splitting on `;` outside string literals, quoted
/// identifiers and comments. Comment-only pieces are dropped.
pub fn scan(input: &str) -> Split {
    let mut split = Split::default();
    let mut current = String::new();
    let mut has_code = false;
    let mut state = Lex::Code;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            Lex::Code => match ch {
                ';' => {
                    if has_code {
                        split.statements.push(current.trim().to_string());
                    }
                    current.clear();
                    has_code = false;
                    continue;
                }
                '-' if chars.peek() == Some(&'-') => state = Lex::LineComment,
                '/' if chars.peek() == Some(&'*') => {
                    current.push(ch);
                    if let Some(star) = chars.next() {
                        current.push(star);
                    }
                    state = Lex::BlockComment;
                    continue;
                }
                '\'' => {
                    state = Lex::SingleQuoted;
                    has_code = true;
                }
                '"' => {
                    state = Lex::DoubleQuoted;
                    has_code = true;
                }
                c if !c.is_whitespace() => has_code = true,
                _ => {}
            },
            // a doubled quote re-enters the literal on the next character
            Lex::SingleQuoted if ch == '\'' => state = Lex::Code,
            Lex::DoubleQuoted if ch == '"' => state = Lex::Code,
            Lex::LineComment if ch == '\n' => state = Lex::Code,
            Lex::BlockComment if ch == '*' && chars.peek() == Some(&'/') => {
                current.push(ch);
                if let Some(slash) = chars.next() {
                    current.push(slash);
                }
                state = Lex::Code;
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }

    split.open = matches!(
        state,
        Lex::SingleQuoted | Lex::DoubleQuoted | Lex::BlockComment
    );
    if has_code {
        split.remainder = current.trim().to_string();
    }
    split
}

/// All statements in a script; a trailing statement needs no terminator.
pub fn split_statements(input: &str) -> Vec<String> {
    let mut split = scan(input);
    if !split.remainder.is_empty() {
        split.statements.push(split.remainder);
    }
    split.statements
}

/// Whether an interactive buffer holds only terminated statements.
pub fn is_complete(buffer: &str) -> bool {
    let split = scan(buffer);
    !split.open && split.remainder.is_empty() && !split.statements.is_empty()
}
