// File: src/lexer.rs
//
// Tokenizer for the Probotics scripting language. Turns source text into a
// flat token stream for the parser: identifiers, numbers, strings, operators,
// punctuation, and keywords. Line comments (`#`, `//`) and block comments
// (`/* ... */`) are discarded here rather than reaching the parser.

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    /// Numeric literal; `bool` is whether the lexeme contained a `.`, which
    /// distinguishes an `Int` immediate from a `Float` one in the parser.
    Number(f64, bool),
    String(String),
    Keyword(Keyword),
    Operator(String),
    Punctuation(char),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    True,
    False,
    Null,
    If,
    Else,
    While,
    Break,
    Next,
    Return,
}

impl Keyword {
    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "true" => Keyword::True,
            "false" => Keyword::False,
            "null" | "none" => Keyword::Null,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "break" => Keyword::Break,
            "next" => Keyword::Next,
            "return" => Keyword::Return,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, crate::errors::ProboticsError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1usize;
    let mut col = 1usize;

    macro_rules! bump {
        () => {{
            let c = chars.next();
            if c == Some('\n') {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
            c
        }};
    }

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                bump!();
            }
            '#' => {
                while let Some(&ch) = chars.peek() {
                    if ch == '\n' {
                        break;
                    }
                    bump!();
                }
            }
            '/' if matches!(peek_second(&chars), Some('/')) => {
                while let Some(&ch) = chars.peek() {
                    if ch == '\n' {
                        break;
                    }
                    bump!();
                }
            }
            '/' if matches!(peek_second(&chars), Some('*')) => {
                bump!();
                bump!();
                loop {
                    match chars.peek() {
                        None => {
                            return Err(crate::errors::ProboticsError::compile(
                                "unterminated block comment",
                                crate::errors::SourceLocation::new(line, col),
                            ))
                        }
                        Some('*') => {
                            bump!();
                            if chars.peek() == Some(&'/') {
                                bump!();
                                break;
                            }
                        }
                        Some(_) => {
                            bump!();
                        }
                    }
                }
            }
            '"' | '\'' => {
                let quote = c;
                let (start_line, start_col) = (line, col);
                bump!();
                let mut s = String::new();
                loop {
                    match chars.peek().copied() {
                        None => {
                            return Err(crate::errors::ProboticsError::compile(
                                "unterminated string literal",
                                crate::errors::SourceLocation::new(start_line, start_col),
                            ))
                        }
                        Some(ch) if ch == quote => {
                            bump!();
                            break;
                        }
                        Some('\\') => {
                            bump!();
                            if let Some(esc) = chars.peek().copied() {
                                bump!();
                                s.push(match esc {
                                    'n' => '\n',
                                    't' => '\t',
                                    'r' => '\r',
                                    '\\' => '\\',
                                    other => other,
                                });
                            }
                        }
                        Some(ch) => {
                            s.push(ch);
                            bump!();
                        }
                    }
                }
                tokens.push(Token { kind: TokenKind::String(s), line: start_line, column: start_col });
            }
            '0'..='9' => {
                let (start_line, start_col) = (line, col);
                let mut num = String::new();
                let mut is_float = false;
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        num.push(ch);
                        bump!();
                    } else if ch == '.' && !is_float && matches!(peek_second(&chars), Some(d) if d.is_ascii_digit())
                    {
                        is_float = true;
                        num.push(ch);
                        bump!();
                    } else {
                        break;
                    }
                }
                let value: f64 = num.parse().map_err(|_| {
                    crate::errors::ProboticsError::compile(
                        format!("invalid numeric literal '{num}'"),
                        crate::errors::SourceLocation::new(start_line, start_col),
                    )
                })?;
                tokens.push(Token { kind: TokenKind::Number(value, is_float), line: start_line, column: start_col });
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let (start_line, start_col) = (line, col);
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        bump!();
                    } else {
                        break;
                    }
                }
                let kind = match Keyword::from_str(&ident) {
                    Some(kw) => TokenKind::Keyword(kw),
                    None => TokenKind::Identifier(ident),
                };
                tokens.push(Token { kind, line: start_line, column: start_col });
            }
            ':' => {
                let (start_line, start_col) = (line, col);
                bump!();
                if chars.peek() == Some(&'=') {
                    bump!();
                    tokens.push(Token {
                        kind: TokenKind::Operator(":=".to_string()),
                        line: start_line,
                        column: start_col,
                    });
                } else {
                    return Err(crate::errors::ProboticsError::compile(
                        "unexpected ':'",
                        crate::errors::SourceLocation::new(start_line, start_col),
                    ));
                }
            }
            '=' | '!' | '<' | '>' if matches!(peek_second(&chars), Some('=')) => {
                let (start_line, start_col) = (line, col);
                let first = bump!().unwrap();
                bump!();
                tokens.push(Token {
                    kind: TokenKind::Operator(format!("{first}=")),
                    line: start_line,
                    column: start_col,
                });
            }
            '&' if matches!(peek_second(&chars), Some('&')) => {
                let (start_line, start_col) = (line, col);
                bump!();
                bump!();
                tokens.push(Token { kind: TokenKind::Operator("&&".to_string()), line: start_line, column: start_col });
            }
            '|' if matches!(peek_second(&chars), Some('|')) => {
                let (start_line, start_col) = (line, col);
                bump!();
                bump!();
                tokens.push(Token { kind: TokenKind::Operator("||".to_string()), line: start_line, column: start_col });
            }
            '+' | '-' | '*' | '/' | '<' | '>' | '!' => {
                let (start_line, start_col) = (line, col);
                bump!();
                tokens.push(Token {
                    kind: TokenKind::Operator(c.to_string()),
                    line: start_line,
                    column: start_col,
                });
            }
            '(' | ')' | '{' | '}' | '[' | ']' | ',' | '.' => {
                let (start_line, start_col) = (line, col);
                bump!();
                tokens.push(Token { kind: TokenKind::Punctuation(c), line: start_line, column: start_col });
            }
            other => {
                return Err(crate::errors::ProboticsError::compile(
                    format!("unexpected character '{other}'"),
                    crate::errors::SourceLocation::new(line, col),
                ));
            }
        }
    }

    tokens.push(Token { kind: TokenKind::Eof, line, column: col });
    Ok(tokens)
}

fn peek_second(chars: &std::iter::Peekable<std::str::Chars>) -> Option<char> {
    chars.clone().nth(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_assignment_and_number() {
        let tokens = tokenize("a := 1 + 2.5").unwrap();
        let kinds: Vec<&TokenKind> = tokens.iter().map(|t| &t.kind).collect();
        assert!(matches!(&kinds[0], TokenKind::Identifier(n) if n == "a"));
        assert!(matches!(&kinds[1], TokenKind::Operator(op) if op == ":="));
        assert!(matches!(&kinds[2], TokenKind::Number(n, false) if *n == 1.0));
        assert!(matches!(&kinds[4], TokenKind::Number(n, true) if *n == 2.5));
    }

    #[test]
    fn skips_both_comment_styles() {
        let tokens = tokenize("1 # line\n/* block */\n+ 2").unwrap();
        let nums: Vec<f64> = tokens
            .iter()
            .filter_map(|t| if let TokenKind::Number(n, _) = t.kind { Some(n) } else { None })
            .collect();
        assert_eq!(nums, vec![1.0, 2.0]);
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(tokenize("\"unterminated").is_err());
    }
}
