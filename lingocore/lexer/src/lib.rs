//! Lexer for the Lingo dialect: context-sensitive words, symbols, symbol
//! literals, line-end tokens, comment folding and line continuation.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use lingo_common::{LingoError, Pos, Result};

/// Operator-like reserved words. Everything else identifier-shaped is a
/// `Word`, even `if`, `repeat` or `put` -- the parser drives syntax off
/// the recognised-word id instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    On,
    Else,
    Then,
    And,
    Or,
    Not,
    Mod,
}

/// Recognised spellings of `Word` tokens. A miss keeps the text and gets
/// `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordId {
    Return,
    End,
    Exit,
    Next,
    If,
    Repeat,
    With,
    To,
    Down,
    While,
    Case,
    Otherwise,
    The,
    Of,
    In,
    Put,
    After,
    Before,
    Type,
    Number,
    Integer,
    String,
    Point,
    Rect,
    Image,
    Global,
    Property,
    Unknown,
}

/// Punctuation tokens. `#` and `--` are consumed by the lexer itself and
/// never appear in the output stream; a trailing `\` is retracted when
/// the following newline folds the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sym {
    Comma,
    Period,
    Minus,
    Plus,
    Slash,
    Star,
    Ampersand,
    Range,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Equal,
    NotEqual,
    Lt,
    Gt,
    Le,
    Ge,
    ConcatSp,
    LineCont,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Word(WordId, String),
    Symbol(Sym),
    Integer(i32),
    Float(f64),
    Str(String),
    SymbolLit(String),
    LineEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

impl Token {
    pub fn is_word(&self, id: WordId) -> bool {
        matches!(&self.kind, TokenKind::Word(w, _) if *w == id)
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(&self.kind, TokenKind::Keyword(k) if *k == kw)
    }

    pub fn is_symbol(&self, s: Sym) -> bool {
        matches!(&self.kind, TokenKind::Symbol(sy) if *sy == s)
    }

    pub fn is_line_end(&self) -> bool {
        matches!(self.kind, TokenKind::LineEnd)
    }
}

/// Human-readable token class name, used in parser diagnostics.
pub fn token_desc(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Keyword(k) => format!("keyword '{}'", keyword_str(*k)),
        TokenKind::Word(_, text) => format!("word '{}'", text),
        TokenKind::Symbol(s) => format!("symbol '{}'", symbol_str(*s)),
        TokenKind::Integer(v) => format!("integer {}", v),
        TokenKind::Float(v) => format!("float {}", v),
        TokenKind::Str(_) => "string".to_string(),
        TokenKind::SymbolLit(s) => format!("symbol-literal #{}", s),
        TokenKind::LineEnd => "newline".to_string(),
    }
}

pub fn keyword_str(kw: Keyword) -> &'static str {
    match kw {
        Keyword::On => "on",
        Keyword::Else => "else",
        Keyword::Then => "then",
        Keyword::And => "and",
        Keyword::Or => "or",
        Keyword::Not => "not",
        Keyword::Mod => "mod",
    }
}

pub fn symbol_str(s: Sym) -> &'static str {
    match s {
        Sym::Comma => ",",
        Sym::Period => ".",
        Sym::Minus => "-",
        Sym::Plus => "+",
        Sym::Slash => "/",
        Sym::Star => "*",
        Sym::Ampersand => "&",
        Sym::Range => "..",
        Sym::LParen => "(",
        Sym::RParen => ")",
        Sym::LBracket => "[",
        Sym::RBracket => "]",
        Sym::LBrace => "{",
        Sym::RBrace => "}",
        Sym::Colon => ":",
        Sym::Equal => "=",
        Sym::NotEqual => "<>",
        Sym::Lt => "<",
        Sym::Gt => ">",
        Sym::Le => "<=",
        Sym::Ge => ">=",
        Sym::ConcatSp => "&&",
        Sym::LineCont => "\\",
    }
}

#[derive(Clone, Copy)]
enum RawSym {
    Plain(Sym),
    Pound,
    Comment,
}

static SYMBOLS: Lazy<HashMap<&'static str, RawSym>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("<=", RawSym::Plain(Sym::Le));
    m.insert(">=", RawSym::Plain(Sym::Ge));
    m.insert("<>", RawSym::Plain(Sym::NotEqual));
    m.insert("--", RawSym::Comment);
    m.insert("&&", RawSym::Plain(Sym::ConcatSp));
    m.insert("..", RawSym::Plain(Sym::Range));
    m.insert(",", RawSym::Plain(Sym::Comma));
    m.insert(".", RawSym::Plain(Sym::Period));
    m.insert("-", RawSym::Plain(Sym::Minus));
    m.insert("+", RawSym::Plain(Sym::Plus));
    m.insert("/", RawSym::Plain(Sym::Slash));
    m.insert("*", RawSym::Plain(Sym::Star));
    m.insert("&", RawSym::Plain(Sym::Ampersand));
    m.insert("#", RawSym::Pound);
    m.insert("(", RawSym::Plain(Sym::LParen));
    m.insert(")", RawSym::Plain(Sym::RParen));
    m.insert("[", RawSym::Plain(Sym::LBracket));
    m.insert("]", RawSym::Plain(Sym::RBracket));
    m.insert("{", RawSym::Plain(Sym::LBrace));
    m.insert("}", RawSym::Plain(Sym::RBrace));
    m.insert(":", RawSym::Plain(Sym::Colon));
    m.insert("=", RawSym::Plain(Sym::Equal));
    m.insert("<", RawSym::Plain(Sym::Lt));
    m.insert(">", RawSym::Plain(Sym::Gt));
    m.insert("\\", RawSym::Plain(Sym::LineCont));
    m
});

static KEYWORDS: Lazy<HashMap<&'static str, Keyword>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("on", Keyword::On);
    m.insert("else", Keyword::Else);
    m.insert("then", Keyword::Then);
    m.insert("and", Keyword::And);
    m.insert("or", Keyword::Or);
    m.insert("not", Keyword::Not);
    m.insert("mod", Keyword::Mod);
    m
});

static WORDS: Lazy<HashMap<&'static str, WordId>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("return", WordId::Return);
    m.insert("end", WordId::End);
    m.insert("exit", WordId::Exit);
    m.insert("next", WordId::Next);
    m.insert("if", WordId::If);
    m.insert("repeat", WordId::Repeat);
    m.insert("with", WordId::With);
    m.insert("to", WordId::To);
    m.insert("down", WordId::Down);
    m.insert("while", WordId::While);
    m.insert("case", WordId::Case);
    m.insert("otherwise", WordId::Otherwise);
    m.insert("the", WordId::The);
    m.insert("of", WordId::Of);
    m.insert("in", WordId::In);
    m.insert("put", WordId::Put);
    m.insert("after", WordId::After);
    m.insert("before", WordId::Before);
    m.insert("type", WordId::Type);
    m.insert("number", WordId::Number);
    m.insert("integer", WordId::Integer);
    m.insert("string", WordId::String);
    m.insert("point", WordId::Point);
    m.insert("rect", WordId::Rect);
    m.insert("image", WordId::Image);
    m.insert("global", WordId::Global);
    m.insert("property", WordId::Property);
    m
});

struct Lexer<'a> {
    bytes: &'a [u8],
    i: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { bytes: src.as_bytes(), i: 0, line: 1, col: 1 }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.i).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.bytes.get(self.i).copied()?;
        self.i += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_word_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn push_line_end(tokens: &mut Vec<Token>, pos: Pos) {
    match tokens.last() {
        // a trailing `\` folds the continued line
        Some(t) if t.is_symbol(Sym::LineCont) => {
            tokens.pop();
        }
        // never first, never doubled
        Some(t) if t.is_line_end() => {}
        None => {}
        _ => tokens.push(Token { kind: TokenKind::LineEnd, pos }),
    }
}

/// Tokenise a whole source text. Aborts on the first error.
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut lx = Lexer::new(src);
    let mut tokens: Vec<Token> = Vec::new();
    let mut symlit = false;

    while let Some(b) = lx.peek() {
        if b == b'\n' {
            let pos = lx.pos();
            lx.bump();
            push_line_end(&mut tokens, pos);
            continue;
        }
        if b.is_ascii_whitespace() {
            lx.bump();
            continue;
        }

        let start = lx.pos();

        if b == b'"' {
            symlit = false;
            lx.bump();
            let mut s = String::new();
            loop {
                match lx.bump() {
                    Some(b'"') => break,
                    Some(c) => s.push(c as char),
                    None => {
                        return Err(LingoError::lex(start, "unterminated string literal"));
                    }
                }
            }
            tokens.push(Token { kind: TokenKind::Str(s), pos: start });
            continue;
        }

        if b.is_ascii_digit() {
            symlit = false;
            let mut text = String::new();
            while let Some(c) = lx.peek() {
                if c.is_ascii_alphanumeric() || c == b'.' {
                    text.push(c as char);
                    lx.bump();
                } else {
                    break;
                }
            }
            let kind = if text.contains('.') {
                match text.parse::<f64>() {
                    Ok(v) => TokenKind::Float(v),
                    Err(_) => {
                        return Err(LingoError::lex(
                            start,
                            format!("could not parse number literal {}", text),
                        ));
                    }
                }
            } else {
                match text.parse::<i32>() {
                    Ok(v) => TokenKind::Integer(v),
                    Err(_) => {
                        return Err(LingoError::lex(
                            start,
                            format!("could not parse number literal {}", text),
                        ));
                    }
                }
            };
            tokens.push(Token { kind, pos: start });
            continue;
        }

        if is_word_start(b) {
            let mut text = String::new();
            while let Some(c) = lx.peek() {
                if is_word_continue(c) {
                    text.push(c.to_ascii_lowercase() as char);
                    lx.bump();
                } else {
                    break;
                }
            }
            let kind = if symlit {
                TokenKind::SymbolLit(text)
            } else if let Some(kw) = KEYWORDS.get(text.as_str()) {
                TokenKind::Keyword(*kw)
            } else {
                let id = WORDS.get(text.as_str()).copied().unwrap_or(WordId::Unknown);
                TokenKind::Word(id, text)
            };
            symlit = false;
            tokens.push(Token { kind, pos: start });
            continue;
        }

        // greedy longest-match over the symbol table
        symlit = false;
        let mut buf = String::new();
        let mut matched: Option<RawSym> = None;
        while let Some(c) = lx.peek() {
            let mut cand = buf.clone();
            cand.push(c as char);
            match SYMBOLS.get(cand.as_str()) {
                Some(raw) => {
                    matched = Some(*raw);
                    buf = cand;
                    lx.bump();
                }
                None => break,
            }
        }
        match matched {
            None => {
                let mut what = buf;
                if let Some(c) = lx.peek() {
                    what.push(c as char);
                }
                return Err(LingoError::lex(start, format!("invalid symbol {}", what)));
            }
            Some(RawSym::Comment) => {
                // discard the rest of the line; the newline itself still
                // produces a LineEnd
                while let Some(c) = lx.peek() {
                    if c == b'\n' {
                        break;
                    }
                    lx.bump();
                }
            }
            Some(RawSym::Pound) => {
                symlit = true;
            }
            Some(RawSym::Plain(s)) => {
                tokens.push(Token { kind: TokenKind::Symbol(s), pos: start });
            }
        }
    }

    let end = lx.pos();
    if !tokens.is_empty() && !tokens.last().map(Token::is_line_end).unwrap_or(false) {
        push_line_end(&mut tokens, end);
    }
    Ok(tokens)
}
