//! Tokenizer for generated game scripts
//!
//! Produces a flat token stream with line numbers and a newline-before flag,
//! which is all the statement splitter needs to apply ASI. Comments and
//! whitespace are dropped. Template literals are split into text chunks with
//! their `${...}` expressions lexed as ordinary tokens.

use tracing::debug;

use super::SourceError;

/// Token classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    /// A template literal chunk: `` `text${ ``, `` }text${ `` or `` }text` ``
    Template,
    Regex,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// 1-based line of the first character
    pub line: usize,
    /// A line terminator appeared between this token and the previous one
    pub newline_before: bool,
}

impl Token {
    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }

    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }
}

const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==", "!=", "<=", ">=", "&&",
    "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "**", "<<", ">>",
];

/// Keywords after which a `/` starts a regex literal rather than a division
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    newline_pending: bool,
    /// Open `${` expressions, each holding its current brace depth
    template_stack: Vec<u32>,
    tokens: Vec<Token>,
}

/// Tokenize a script
pub fn tokenize(src: &str) -> Result<Vec<Token>, SourceError> {
    debug!(len = src.len(), "tokenize: called");
    let mut lexer = Lexer {
        src,
        bytes: src.as_bytes(),
        pos: 0,
        line: 1,
        newline_pending: false,
        template_stack: Vec::new(),
        tokens: Vec::new(),
    };
    lexer.run()?;
    if !lexer.template_stack.is_empty() {
        return Err(SourceError::new("unterminated template literal expression", lexer.line));
    }
    debug!(count = lexer.tokens.len(), "tokenize: done");
    Ok(lexer.tokens)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

impl<'a> Lexer<'a> {
    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize) {
        let newline_before = std::mem::take(&mut self.newline_pending);
        self.tokens.push(Token {
            kind,
            text: self.src[start..self.pos].to_string(),
            start,
            end: self.pos,
            line,
            newline_before,
        });
    }

    fn run(&mut self) -> Result<(), SourceError> {
        while let Some(b) = self.peek(0) {
            match b {
                b'\n' => {
                    self.line += 1;
                    self.newline_pending = true;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment()?,
                b'"' | b'\'' => self.string(b)?,
                b'`' => {
                    let start = self.pos;
                    let line = self.line;
                    self.pos += 1;
                    self.template_chunk(start, line)?;
                }
                b'0'..=b'9' => self.number(),
                b'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
                b if is_ident_start(b) => self.ident(),
                b'/' if self.regex_allowed() => self.regex()?,
                b'{' => {
                    if let Some(depth) = self.template_stack.last_mut() {
                        *depth += 1;
                    }
                    self.single_punct();
                }
                b'}' => match self.template_stack.last_mut() {
                    Some(0) => {
                        self.template_stack.pop();
                        let start = self.pos;
                        let line = self.line;
                        self.pos += 1;
                        self.template_chunk(start, line)?;
                    }
                    Some(depth) => {
                        *depth -= 1;
                        self.single_punct();
                    }
                    None => self.single_punct(),
                },
                _ => self.punct(),
            }
        }
        Ok(())
    }

    fn skip_line_comment(&mut self) {
        while let Some(b) = self.peek(0) {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), SourceError> {
        let line = self.line;
        self.pos += 2;
        loop {
            match self.peek(0) {
                None => return Err(SourceError::new("unterminated block comment", line)),
                Some(b'*') if self.peek(1) == Some(b'/') => {
                    self.pos += 2;
                    return Ok(());
                }
                Some(b'\n') => {
                    self.line += 1;
                    self.newline_pending = true;
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn string(&mut self, quote: u8) -> Result<(), SourceError> {
        let start = self.pos;
        let line = self.line;
        self.pos += 1;
        loop {
            match self.peek(0) {
                None | Some(b'\n') => return Err(SourceError::new("unterminated string literal", line)),
                Some(b'\\') => {
                    if self.peek(1) == Some(b'\n') {
                        self.line += 1;
                    }
                    self.pos += 2;
                }
                Some(b) if b == quote => {
                    self.pos += 1;
                    self.push(TokenKind::Str, start, line);
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Scan template text up to the closing backtick or the next `${`
    fn template_chunk(&mut self, start: usize, line: usize) -> Result<(), SourceError> {
        loop {
            match self.peek(0) {
                None => return Err(SourceError::new("unterminated template literal", line)),
                Some(b'\\') => self.pos += 2,
                Some(b'`') => {
                    self.pos += 1;
                    self.push(TokenKind::Template, start, line);
                    return Ok(());
                }
                Some(b'$') if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    self.push(TokenKind::Template, start, line);
                    self.template_stack.push(0);
                    return Ok(());
                }
                Some(b'\n') => {
                    self.line += 1;
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn number(&mut self) {
        let start = self.pos;
        let line = self.line;
        while let Some(b) = self.peek(0) {
            let exponent_sign = (b == b'+' || b == b'-')
                && matches!(self.bytes.get(self.pos.wrapping_sub(1)), Some(b'e') | Some(b'E'))
                && !self.src[start..self.pos].starts_with("0x");
            if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Number, start, line);
    }

    fn ident(&mut self) {
        let start = self.pos;
        let line = self.line;
        while self.peek(0).is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        self.push(TokenKind::Ident, start, line);
    }

    fn regex_allowed(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(prev) => match prev.kind {
                TokenKind::Punct => !matches!(prev.text.as_str(), ")" | "]" | "}"),
                TokenKind::Ident => REGEX_PREFIX_KEYWORDS.contains(&prev.text.as_str()),
                _ => false,
            },
        }
    }

    fn regex(&mut self) -> Result<(), SourceError> {
        let start = self.pos;
        let line = self.line;
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.peek(0) {
                None | Some(b'\n') => return Err(SourceError::new("unterminated regular expression", line)),
                Some(b'\\') => self.pos += 2,
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    while self.peek(0).is_some_and(|b| b.is_ascii_alphabetic()) {
                        self.pos += 1;
                    }
                    self.push(TokenKind::Regex, start, line);
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn single_punct(&mut self) {
        let start = self.pos;
        let line = self.line;
        self.pos += 1;
        self.push(TokenKind::Punct, start, line);
    }

    fn punct(&mut self) {
        let rest = &self.src[self.pos..];
        let start = self.pos;
        let line = self.line;
        // `?.5` is a conditional followed by a number, not optional chaining
        let optional_chain_digit = rest.starts_with("?.") && rest.as_bytes().get(2).is_some_and(|b| b.is_ascii_digit());
        match PUNCTUATORS
            .iter()
            .find(|p| rest.starts_with(**p) && !(optional_chain_digit && **p == "?."))
        {
            Some(p) => self.pos += p.len(),
            None => {
                let width = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                self.pos += width;
            }
        }
        self.push(TokenKind::Punct, start, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<String> {
        tokenize(src).unwrap().into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            texts("let x = a.b >= 10;"),
            vec!["let", "x", "=", "a", ".", "b", ">=", "10", ";"]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = tokenize("a // one\n/* two\nthree */ b").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].text, "b");
        assert_eq!(tokens[1].line, 3);
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn test_strings_keep_quotes() {
        let tokens = tokenize(r#"f('it\'s', "x")"#).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Str);
        assert_eq!(tokens[2].text, r#"'it\'s'"#);
    }

    #[test]
    fn test_template_expressions_are_lexed() {
        let tokens = tokenize("`Score: ${score + {a: 1}.a} pts`").unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds[0], TokenKind::Template);
        assert_eq!(tokens[1].text, "score");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Template);
        assert_eq!(tokens.last().unwrap().text, "} pts`");
    }

    #[test]
    fn test_regex_vs_division() {
        let tokens = tokenize("const r = /a[/]b/g; const d = x / 2;").unwrap();
        assert_eq!(tokens[3].kind, TokenKind::Regex);
        assert_eq!(tokens[3].text, "/a[/]b/g");
        assert!(tokens.iter().any(|t| t.is_punct("/")));
    }

    #[test]
    fn test_numbers_with_exponent() {
        assert_eq!(texts("1e-5 + 0x1F"), vec!["1e-5", "+", "0x1F"]);
    }

    #[test]
    fn test_unicode_in_strings_and_idents() {
        let tokens = tokenize("const étoile = '★';").unwrap();
        assert_eq!(tokens[1].text, "étoile");
        assert_eq!(tokens[3].text, "'★'");
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let err = tokenize("let a = 'oops;\nlet b = 1;").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_unterminated_comment_is_error() {
        assert!(tokenize("a /* never closed").is_err());
    }
}
