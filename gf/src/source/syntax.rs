//! Top-level structure of a script
//!
//! Splits a token stream into statements (applying a practical subset of
//! automatic semicolon insertion) and classifies each top-level statement as a
//! function, variable, class or plain statement. Function bodies are split the
//! same way so the merger can work statement by statement.

use std::ops::Range;

use tracing::debug;

use super::lexer::{Token, TokenKind, tokenize};
use super::{SourceError, is_reserved};

/// A parsed script
#[derive(Debug, Clone)]
pub struct Program {
    pub tokens: Vec<Token>,
    /// For every bracket token, the index of its partner
    pub partners: Vec<Option<usize>>,
    pub items: Vec<Item>,
}

/// One top-level statement
#[derive(Debug, Clone)]
pub struct Item {
    pub kind: ItemKind,
    pub stmt: Stmt,
}

#[derive(Debug, Clone)]
pub enum ItemKind {
    Function(FunctionDecl),
    Variable(VarDecl),
    Class { name: String },
    Statement,
}

impl Item {
    /// Names this item binds at top level
    pub fn declared_names(&self) -> Vec<String> {
        match &self.kind {
            ItemKind::Function(f) => vec![f.name.clone()],
            ItemKind::Variable(v) => v.declarators.iter().flat_map(|d| d.names.clone()).collect(),
            ItemKind::Class { name } => vec![name.clone()],
            ItemKind::Statement => Vec::new(),
        }
    }
}

/// A statement with its source text
#[derive(Debug, Clone)]
pub struct Stmt {
    /// Token index range within the program
    pub range: Range<usize>,
    /// Original source text
    pub text: String,
    /// Token texts joined by single spaces, trailing `;` dropped
    pub normalized: String,
    /// Column (in bytes) of the first token on its line
    pub column: usize,
    pub line: usize,
}

impl Stmt {
    /// An unconditional `return` at this statement's own level
    pub fn is_return(&self) -> bool {
        self.normalized == "return" || self.normalized.starts_with("return ")
    }

    /// Re-indent the statement text so its first line sits at `indent`
    pub fn reindented(&self, indent: &str) -> String {
        reindent(&self.text, self.column, indent)
    }
}

/// Shift `text` whose first line started at `column` so that it starts at `indent`
///
/// Continuation lines lose up to `column` leading whitespace; relative
/// indentation inside the text is preserved.
pub fn reindent(text: &str, column: usize, indent: &str) -> String {
    let mut out = String::new();
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let stripped = if i == 0 {
            line
        } else {
            let ws = line.len() - line.trim_start().len();
            &line[ws.min(column)..]
        };
        if !stripped.is_empty() {
            out.push_str(indent);
        }
        out.push_str(stripped);
    }
    out
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    /// Source from the start of the statement up to (not including) the body brace
    pub header: String,
    pub param_count: usize,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    /// `var`, `let` or `const`
    pub keyword: String,
    pub declarators: Vec<Declarator>,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    /// Bound names; more than one for destructuring patterns
    pub names: Vec<String>,
    /// Declarator source, e.g. `score = 0`
    pub text: String,
}

/// Parse a script into top-level items
pub fn parse_program(src: &str) -> Result<Program, SourceError> {
    debug!(len = src.len(), "parse_program: called");
    let tokens = tokenize(src)?;
    let partners = match_brackets(&tokens)?;
    check_expressions(&tokens, &partners)?;
    let ranges = split_statements(&tokens, &partners, 0, tokens.len());

    let items = ranges
        .into_iter()
        .map(|range| parse_item(src, &tokens, &partners, range))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(items = items.len(), "parse_program: done");
    Ok(Program {
        tokens,
        partners,
        items,
    })
}

/// Pair every opening bracket with its closer
pub fn match_brackets(tokens: &[Token]) -> Result<Vec<Option<usize>>, SourceError> {
    let mut partners = vec![None; tokens.len()];
    let mut stack: Vec<usize> = Vec::new();

    for (i, tok) in tokens.iter().enumerate() {
        if tok.kind != TokenKind::Punct {
            continue;
        }
        match tok.text.as_str() {
            "(" | "[" | "{" => stack.push(i),
            ")" | "]" | "}" => {
                let expected = match tok.text.as_str() {
                    ")" => "(",
                    "]" => "[",
                    _ => "{",
                };
                match stack.pop() {
                    Some(open) if tokens[open].text == expected => {
                        partners[open] = Some(i);
                        partners[i] = Some(open);
                    }
                    Some(open) => {
                        return Err(SourceError::new(
                            format!(
                                "unexpected `{}`; `{}` opened on line {} is still open",
                                tok.text, tokens[open].text, tokens[open].line
                            ),
                            tok.line,
                        ));
                    }
                    None => {
                        return Err(SourceError::new(format!("unexpected `{}`", tok.text), tok.line));
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(SourceError::new(
            format!("`{}` is never closed", tokens[open].text),
            tokens[open].line,
        ));
    }
    Ok(partners)
}

/// Binary and assignment operators; each needs an operand on its right
const BINARY_OPERATORS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "**=", "<<=", ">>=", ">>>=", "&=", "|=", "^=", "&&=", "||=", "??=", "==", "===",
    "!=", "!==", "<", ">", "<=", ">=", "+", "-", "*", "/", "%", "**", "<<", ">>", ">>>", "&", "|", "^", "&&", "||",
    "??",
];

fn is_binary_operator(tok: &Token) -> bool {
    tok.kind == TokenKind::Punct && BINARY_OPERATORS.contains(&tok.text.as_str())
}

/// Reject expression shapes that balance but cannot parse: an operator with
/// nothing on its right, an empty `if`/`while`/`switch` condition, and a
/// leading or doubled comma outside an array literal
fn check_expressions(tokens: &[Token], partners: &[Option<usize>]) -> Result<(), SourceError> {
    let mut open: Vec<&str> = Vec::new();

    for (i, tok) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1);

        if tok.kind == TokenKind::Ident
            && matches!(tok.text.as_str(), "if" | "while" | "switch")
            && next.is_some_and(|n| n.is_punct("("))
            && partners[i + 1] == Some(i + 2)
        {
            return Err(SourceError::new(format!("empty condition after `{}`", tok.text), tok.line));
        }
        if tok.kind != TokenKind::Punct {
            continue;
        }

        match tok.text.as_str() {
            "(" | "[" | "{" => open.push(tok.text.as_str()),
            ")" | "]" | "}" => {
                open.pop();
            }
            "," => {
                // `[a, , b]` holes are legal
                let in_array = open.last() == Some(&"[");
                let after_separator = i
                    .checked_sub(1)
                    .map(|p| &tokens[p])
                    .is_some_and(|p| p.is_punct(",") || p.is_punct("(") || p.is_punct("{"));
                if (after_separator && !in_array) || next.is_some_and(|n| n.is_punct(";")) {
                    return Err(SourceError::new("unexpected `,`", tok.line));
                }
            }
            _ if is_binary_operator(tok) => {
                // Unary `+`/`-` may follow another operator
                let missing_operand = match next {
                    None => true,
                    Some(n) if n.kind == TokenKind::Punct => {
                        matches!(n.text.as_str(), ";" | "," | ")" | "]" | "}")
                            || (is_binary_operator(n) && !matches!(n.text.as_str(), "+" | "-"))
                    }
                    Some(_) => false,
                };
                if missing_operand {
                    return Err(SourceError::new(
                        format!("expected an expression after `{}`", tok.text),
                        tok.line,
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Keywords whose statement ends with a closing brace
const BLOCK_HEADS: &[&str] = &["function", "async", "class", "if", "for", "while", "switch", "try", "do"];

/// Keywords that cannot end a statement at a line break
const CONTINUING_KEYWORDS: &[&str] = &[
    "if",
    "else",
    "for",
    "while",
    "do",
    "function",
    "class",
    "const",
    "let",
    "var",
    "new",
    "typeof",
    "instanceof",
    "in",
    "of",
    "case",
    "switch",
    "try",
    "catch",
    "finally",
    "throw",
    "delete",
    "void",
    "await",
    "async",
    "extends",
    "import",
    "export",
    "with",
];

/// Tokens that, at the start of a line, continue the previous expression
const CONTINUING_PUNCT: &[&str] = &[
    ".", "?.", ",", "=", "==", "===", "!=", "!==", "+", "-", "*", "/", "%", "**", "&", "|", "^", "&&", "||", "??",
    "<", ">", "<=", ">=", "<<", ">>", ">>>", "?", ":", "=>", "(", "[", "+=", "-=", "*=", "/=", "%=", "&&=", "||=",
    "??=",
];

fn can_end_statement(tok: &Token) -> bool {
    match tok.kind {
        TokenKind::Ident => !CONTINUING_KEYWORDS.contains(&tok.text.as_str()),
        TokenKind::Number | TokenKind::Str | TokenKind::Regex => true,
        TokenKind::Template => tok.text.ends_with('`'),
        TokenKind::Punct => matches!(tok.text.as_str(), ")" | "]" | "}" | "++" | "--"),
    }
}

fn continues_expression(tok: &Token) -> bool {
    match tok.kind {
        TokenKind::Punct => CONTINUING_PUNCT.contains(&tok.text.as_str()),
        TokenKind::Ident => matches!(tok.text.as_str(), "instanceof" | "in"),
        TokenKind::Template => true,
        _ => false,
    }
}

/// Whether the statement starting at `head` may continue with `next`
/// even though it looks finished (`if ... else`, `try ... catch`, `do ... while`)
fn clause_continues(tokens: &[Token], head: usize, next: &Token) -> bool {
    match tokens[head].text.as_str() {
        "if" => next.is("else"),
        "try" => next.is("catch") || next.is("finally"),
        "do" => next.is("while"),
        _ => false,
    }
}

/// Split `tokens[lo..hi]` into statement ranges at the current nesting level
pub fn split_statements(tokens: &[Token], partners: &[Option<usize>], lo: usize, hi: usize) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = lo;
    let mut i = lo;

    while i < hi {
        let tok = &tokens[i];

        if tok.is_punct(";") {
            if i > start {
                // `if (x) return;` followed by `else`
                let next_continues = tokens
                    .get(i + 1)
                    .filter(|_| i + 1 < hi)
                    .is_some_and(|next| clause_continues(tokens, start, next));
                if next_continues {
                    i += 1;
                    continue;
                }
                ranges.push(start..i + 1);
            }
            i += 1;
            start = i;
            continue;
        }

        // Jump over bracketed groups; the closer is handled below
        if matches!(tok.text.as_str(), "(" | "[" | "{")
            && tok.kind == TokenKind::Punct
            && let Some(close) = partners[i]
        {
            i = close;
        }

        let current = &tokens[i];
        let next = if i + 1 < hi { tokens.get(i + 1) } else { None };
        let Some(next) = next else {
            i += 1;
            continue;
        };

        let head_is_block = (BLOCK_HEADS.contains(&tokens[start].text.as_str()) && tokens[start].is_ident())
            || tokens[start].is_punct("{");
        let block_closed = current.is_punct("}") && head_is_block && partners[i].is_some_and(|open| open > start);

        let ends = if closes_condition(tokens, partners, i) {
            false
        } else if block_closed {
            !clause_continues(tokens, start, next) && !is_function_expression_tail(tokens, start, next)
        } else {
            next.newline_before
                && can_end_statement(current)
                && !continues_expression(next)
                && !clause_continues(tokens, start, next)
        };

        if ends {
            ranges.push(start..i + 1);
            start = i + 1;
        }
        i += 1;
    }

    if start < hi {
        ranges.push(start..hi);
    }
    ranges
}

/// The `)` of `if (...)`, `for (...)` or `while (...)`; a body always follows
fn closes_condition(tokens: &[Token], partners: &[Option<usize>], i: usize) -> bool {
    if !tokens[i].is_punct(")") {
        return false;
    }
    partners[i]
        .and_then(|open| open.checked_sub(1))
        .map(|kw| &tokens[kw])
        .is_some_and(|kw| kw.is_ident() && matches!(kw.text.as_str(), "if" | "for" | "while"))
}

/// `async () => {...}` and `function () {...}()` are expressions, not blocks
fn is_function_expression_tail(tokens: &[Token], start: usize, next: &Token) -> bool {
    let head = tokens[start].text.as_str();
    (head == "function" || head == "async") && !next.newline_before && (next.is_punct("(") || next.is_punct("."))
}

fn stmt_for(src: &str, tokens: &[Token], range: Range<usize>) -> Stmt {
    let first = &tokens[range.start];
    let last = &tokens[range.end - 1];
    let line_start = src[..first.start].rfind('\n').map(|p| p + 1).unwrap_or(0);

    let mut parts: Vec<&str> = tokens[range.clone()].iter().map(|t| t.text.as_str()).collect();
    if parts.last() == Some(&";") {
        parts.pop();
    }

    Stmt {
        text: src[first.start..last.end].to_string(),
        normalized: parts.join(" "),
        column: first.start - line_start,
        line: first.line,
        range,
    }
}

fn parse_item(
    src: &str,
    tokens: &[Token],
    partners: &[Option<usize>],
    range: Range<usize>,
) -> Result<Item, SourceError> {
    let stmt = stmt_for(src, tokens, range.clone());
    let kind = if let Some(function) = parse_function(src, tokens, partners, range.clone())? {
        ItemKind::Function(function)
    } else if let Some(var) = parse_variable(src, tokens, partners, range.clone())? {
        ItemKind::Variable(var)
    } else if let Some(name) = parse_class(tokens, partners, range.clone()) {
        ItemKind::Class { name }
    } else {
        ItemKind::Statement
    };
    Ok(Item { kind, stmt })
}

fn parse_function(
    src: &str,
    tokens: &[Token],
    partners: &[Option<usize>],
    range: Range<usize>,
) -> Result<Option<FunctionDecl>, SourceError> {
    let mut i = range.start;
    if tokens[i].is("async") && tokens.get(i + 1).is_some_and(|t| t.is("function")) {
        i += 1;
    }
    if !tokens[i].is("function") || tokens[i].kind != TokenKind::Ident {
        return Ok(None);
    }
    i += 1;
    if tokens.get(i).is_some_and(|t| t.is_punct("*")) {
        i += 1;
    }

    let name_tok = match tokens.get(i) {
        Some(t) if t.is_ident() && i < range.end => t,
        Some(t) if t.is_punct("(") => return Ok(None),
        Some(t) => {
            return Err(SourceError::new(
                format!("expected function name, found `{}`", t.text),
                t.line,
            ));
        }
        None => return Err(SourceError::new("unexpected end of input after `function`", tokens[i - 1].line)),
    };
    if is_reserved(&name_tok.text) {
        return Err(SourceError::new(
            format!("`{}` is a reserved word and cannot name a function", name_tok.text),
            name_tok.line,
        ));
    }

    let open_paren = i + 1;
    if !tokens.get(open_paren).is_some_and(|t| t.is_punct("(")) {
        return Err(SourceError::new(
            format!("expected `(` after function name `{}`", name_tok.text),
            name_tok.line,
        ));
    }
    let close_paren = partners[open_paren].unwrap_or(open_paren);
    let open_brace = close_paren + 1;
    if !tokens.get(open_brace).is_some_and(|t| t.is_punct("{")) {
        return Err(SourceError::new(
            format!("expected `{{` to open the body of `{}`", name_tok.text),
            tokens[close_paren].line,
        ));
    }
    let close_brace = partners[open_brace].unwrap_or(open_brace);

    // `function f() {}()` and friends are not declarations
    if close_brace + 1 != range.end {
        return Ok(None);
    }

    let param_count = count_top_level(tokens, partners, open_paren + 1, close_paren, ",")
        .map(|commas| commas + 1)
        .unwrap_or(0);

    let body = split_statements(tokens, partners, open_brace + 1, close_brace)
        .into_iter()
        .map(|r| stmt_for(src, tokens, r))
        .collect();

    Ok(Some(FunctionDecl {
        name: name_tok.text.clone(),
        header: src[tokens[range.start].start..tokens[close_paren].end].to_string(),
        param_count,
        body,
    }))
}

/// Count separator tokens at depth zero in `lo..hi`; None when the range is empty
fn count_top_level(tokens: &[Token], partners: &[Option<usize>], lo: usize, hi: usize, sep: &str) -> Option<usize> {
    if lo >= hi {
        return None;
    }
    let mut count = 0;
    let mut i = lo;
    while i < hi {
        if tokens[i].is_punct(sep) {
            count += 1;
        } else if let Some(close) = partners[i].filter(|&c| c > i) {
            i = close;
        }
        i += 1;
    }
    Some(count)
}

fn parse_variable(
    src: &str,
    tokens: &[Token],
    partners: &[Option<usize>],
    range: Range<usize>,
) -> Result<Option<VarDecl>, SourceError> {
    let keyword = &tokens[range.start];
    if keyword.kind != TokenKind::Ident || !matches!(keyword.text.as_str(), "var" | "let" | "const") {
        return Ok(None);
    }

    let mut end = range.end;
    if tokens[end - 1].is_punct(";") {
        end -= 1;
    }
    if range.start + 1 >= end {
        return Err(SourceError::new(
            format!("`{}` without a binding", keyword.text),
            keyword.line,
        ));
    }

    let mut declarators = Vec::new();
    let mut decl_start = range.start + 1;
    let mut i = decl_start;
    while i <= end {
        if i == end || tokens[i].is_punct(",") {
            if decl_start >= i {
                return Err(SourceError::new("empty declarator", tokens[i.min(end - 1)].line));
            }
            declarators.push(parse_declarator(src, tokens, partners, decl_start..i)?);
            decl_start = i + 1;
        } else if let Some(close) = partners[i].filter(|&c| c > i) {
            i = close;
        }
        i += 1;
    }

    Ok(Some(VarDecl {
        keyword: keyword.text.clone(),
        declarators,
    }))
}

fn parse_declarator(
    src: &str,
    tokens: &[Token],
    partners: &[Option<usize>],
    range: Range<usize>,
) -> Result<Declarator, SourceError> {
    let first = &tokens[range.start];
    let names = if first.is_ident() {
        if is_reserved(&first.text) {
            return Err(SourceError::new(
                format!("`{}` is a reserved word and cannot be a variable name", first.text),
                first.line,
            ));
        }
        vec![first.text.clone()]
    } else if first.is_punct("{") || first.is_punct("[") {
        let close = partners[range.start].unwrap_or(range.start);
        pattern_names(tokens, partners, range.start + 1, close)
    } else {
        return Err(SourceError::new(
            format!("unexpected `{}` in declaration", first.text),
            first.line,
        ));
    };

    Ok(Declarator {
        names,
        text: src[first.start..tokens[range.end - 1].end].to_string(),
    })
}

/// Names bound by a destructuring pattern body `lo..hi`
///
/// Keys followed by `:` are skipped (the name after the colon is bound) and
/// default-value expressions after `=` are ignored.
pub fn pattern_names(tokens: &[Token], partners: &[Option<usize>], lo: usize, hi: usize) -> Vec<String> {
    let mut names = Vec::new();
    let mut i = lo;
    let mut in_default = false;
    while i < hi {
        let tok = &tokens[i];
        if tok.is_punct(",") {
            in_default = false;
        } else if tok.is_punct("=") {
            in_default = true;
        } else if let Some(close) = partners[i].filter(|&c| c > i) {
            if !in_default {
                names.extend(pattern_names(tokens, partners, i + 1, close));
            }
            i = close;
        } else if tok.is_ident()
            && !in_default
            && !is_reserved(&tok.text)
            && !tokens.get(i + 1).is_some_and(|n| n.is_punct(":"))
        {
            names.push(tok.text.clone());
        }
        i += 1;
    }
    names
}

fn parse_class(tokens: &[Token], partners: &[Option<usize>], range: Range<usize>) -> Option<String> {
    let head = &tokens[range.start];
    if !head.is("class") || head.kind != TokenKind::Ident {
        return None;
    }
    let name = tokens.get(range.start + 1).filter(|t| t.is_ident() && !t.is("extends"))?;
    let last = range.end - 1;
    let open = partners[last]?;
    (tokens[last].is_punct("}") && open > range.start).then(|| name.text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<String> {
        parse_program(src)
            .unwrap()
            .items
            .iter()
            .map(|item| match &item.kind {
                ItemKind::Function(f) => format!("fn {}", f.name),
                ItemKind::Variable(v) => format!("{} {}", v.keyword, item.declared_names().join(",")),
                ItemKind::Class { name } => format!("class {}", name),
                ItemKind::Statement => format!("stmt {}", item.stmt.normalized),
            })
            .collect()
    }

    #[test]
    fn test_top_level_items() {
        let src = r#"
const canvas = document.getElementById('gameCanvas');
let score = 0, lives = 3;
function update(dt) {
    player.x += dt;
}
class Enemy extends Base {
    tick() {}
}
requestAnimationFrame(loop);
"#;
        assert_eq!(
            kinds(src),
            vec![
                "const canvas",
                "let score,lives",
                "fn update",
                "class Enemy",
                "stmt requestAnimationFrame ( loop )",
            ]
        );
    }

    #[test]
    fn test_asi_splits_lines_without_semicolons() {
        let src = "let a = 1\nlet b = a\n  + 2\nfoo()\n";
        assert_eq!(kinds(src), vec!["let a", "let b", "stmt foo ( )"]);
    }

    #[test]
    fn test_function_on_one_line_followed_by_another() {
        assert_eq!(kinds("function a(){} function b(){}"), vec!["fn a", "fn b"]);
    }

    #[test]
    fn test_if_else_stays_one_statement() {
        let src = "if (a) { x() }\nelse { y() }\nif (b) return;\nelse z();\n";
        let program = parse_program(src).unwrap();
        assert_eq!(program.items.len(), 2);
    }

    #[test]
    fn test_arrow_function_variable_spans_lines() {
        let src = "const step = (dt) => {\n  a += dt;\n}\nstep(1);\n";
        assert_eq!(kinds(src), vec!["const step", "stmt step ( 1 )"]);
    }

    #[test]
    fn test_function_body_statements() {
        let src = "function draw() {\n  ctx.clearRect(0, 0, w, h);\n  if (over) {\n    return;\n  }\n  return true;\n}";
        let program = parse_program(src).unwrap();
        let ItemKind::Function(f) = &program.items[0].kind else {
            panic!("expected function");
        };
        assert_eq!(f.body.len(), 3);
        assert_eq!(f.header, "function draw()");
        assert_eq!(f.param_count, 0);
        assert!(f.body[2].is_return());
        assert!(!f.body[1].is_return());
    }

    #[test]
    fn test_destructuring_names() {
        let program = parse_program("const { x, y: top, size = other } = player;").unwrap();
        assert_eq!(program.items[0].declared_names(), vec!["x", "top", "size"]);
    }

    #[test]
    fn test_iife_is_a_statement() {
        assert_eq!(kinds("(function () { start(); })();").len(), 1);
        assert!(kinds("(function () { start(); })();")[0].starts_with("stmt"));
    }

    #[test]
    fn test_unbalanced_braces_error() {
        let err = parse_program("function a() {\n  if (x) {\n}\n").unwrap_err();
        assert!(err.message.contains("never closed"));
    }

    #[test]
    fn test_mismatched_closer_error() {
        let err = parse_program("foo(1, 2];").unwrap_err();
        assert!(err.message.contains("unexpected `]`"));
    }

    #[test]
    fn test_missing_binding_is_error() {
        assert!(parse_program("const = 5;").is_err());
        assert!(parse_program("let;").is_err());
    }

    #[test]
    fn test_missing_right_operand_is_error() {
        let err = parse_program("let x = ;").unwrap_err();
        assert_eq!(err.message, "expected an expression after `=`");
        assert!(parse_program("let a = 1 +;").is_err());
        assert!(parse_program("score = = 3;").is_err());
        assert!(parse_program("fire(speed *)").is_err());
        assert!(parse_program("player.x +=").is_err());
    }

    #[test]
    fn test_unary_operands_are_allowed() {
        assert!(parse_program("let a = -1;\nlet b = a - -2;\nlet c = a + +b;\na++;\nb--;").is_ok());
        assert!(parse_program("const re = /ab+/;\nlet t = `x${a + 1}y`;").is_ok());
    }

    #[test]
    fn test_empty_condition_is_error() {
        let err = parse_program("if () {}").unwrap_err();
        assert!(err.message.contains("empty condition after `if`"));
        assert!(parse_program("while () {\n  step();\n}").is_err());
        assert!(parse_program("for (;;) {\n  break;\n}").is_ok());
    }

    #[test]
    fn test_stray_commas_are_errors() {
        assert_eq!(parse_program("foo(,);").unwrap_err().message, "unexpected `,`");
        assert!(parse_program("foo(a,, b);").is_err());
        assert!(parse_program("let p = { x: 1,, y: 2 };").is_err());
        assert!(parse_program("foo(a, b,);").is_ok());
        assert!(parse_program("const [, second] = pair;\nlet holes = [1, , 3];").is_ok());
    }

    #[test]
    fn test_reindent() {
        let src = "function f() {\n        if (a) {\n            b();\n        }\n}";
        let program = parse_program(src).unwrap();
        let ItemKind::Function(f) = &program.items[0].kind else {
            panic!("expected function");
        };
        assert_eq!(f.body[0].reindented("    "), "    if (a) {\n        b();\n    }");
    }
}
