use lingo_lexer::{tokenize, Keyword, Sym, Token, TokenKind, WordId};

fn kinds(src: &str) -> Vec<TokenKind> {
    tokenize(src).expect("tokenize").into_iter().map(|t| t.kind).collect()
}

#[test]
fn words_are_lowercased_and_recognised() {
    let toks = kinds("PUT Hello\n");
    assert_eq!(
        toks,
        vec![
            TokenKind::Word(WordId::Put, "put".to_string()),
            TokenKind::Word(WordId::Unknown, "hello".to_string()),
            TokenKind::LineEnd,
        ]
    );
}

#[test]
fn operator_words_are_keywords() {
    let toks = kinds("on else then and or not mod\n");
    assert_eq!(
        toks,
        vec![
            TokenKind::Keyword(Keyword::On),
            TokenKind::Keyword(Keyword::Else),
            TokenKind::Keyword(Keyword::Then),
            TokenKind::Keyword(Keyword::And),
            TokenKind::Keyword(Keyword::Or),
            TokenKind::Keyword(Keyword::Not),
            TokenKind::Keyword(Keyword::Mod),
            TokenKind::LineEnd,
        ]
    );
}

#[test]
fn multi_char_symbols_match_greedily() {
    let toks = kinds("a <= b >= c <> d && e\n");
    let syms: Vec<TokenKind> =
        toks.into_iter().filter(|k| matches!(k, TokenKind::Symbol(_))).collect();
    assert_eq!(
        syms,
        vec![
            TokenKind::Symbol(Sym::Le),
            TokenKind::Symbol(Sym::Ge),
            TokenKind::Symbol(Sym::NotEqual),
            TokenKind::Symbol(Sym::ConcatSp),
        ]
    );
}

#[test]
fn range_symbol_between_words() {
    let toks = kinds("s[a..b]\n");
    assert!(toks.contains(&TokenKind::Symbol(Sym::Range)));
}

#[test]
fn comment_discards_rest_of_line_but_keeps_line_end() {
    let toks = kinds("put 1 -- a comment, with = stuff\nput 2\n");
    assert_eq!(
        toks,
        vec![
            TokenKind::Word(WordId::Put, "put".to_string()),
            TokenKind::Integer(1),
            TokenKind::LineEnd,
            TokenKind::Word(WordId::Put, "put".to_string()),
            TokenKind::Integer(2),
            TokenKind::LineEnd,
        ]
    );
}

#[test]
fn line_continuation_folds_lines() {
    let toks = kinds("x = 1 + \\\n  2\n");
    assert_eq!(
        toks,
        vec![
            TokenKind::Word(WordId::Unknown, "x".to_string()),
            TokenKind::Symbol(Sym::Equal),
            TokenKind::Integer(1),
            TokenKind::Symbol(Sym::Plus),
            TokenKind::Integer(2),
            TokenKind::LineEnd,
        ]
    );
}

#[test]
fn no_leading_and_no_doubled_line_ends() {
    let toks = tokenize("\n\nput 1\n\n\nput 2\n").expect("tokenize");
    assert!(!toks[0].is_line_end());
    for pair in toks.windows(2) {
        assert!(!(pair[0].is_line_end() && pair[1].is_line_end()));
    }
    assert!(toks.last().map(Token::is_line_end).unwrap_or(false));
}

#[test]
fn pound_arms_a_symbol_literal() {
    let toks = kinds("x = #Bar\n");
    assert_eq!(toks[2], TokenKind::SymbolLit("bar".to_string()));
}

#[test]
fn string_literals_have_no_escapes() {
    let toks = kinds("put \"a\\nb\"\n");
    assert_eq!(toks[1], TokenKind::Str("a\\nb".to_string()));
}

#[test]
fn numbers_parse_as_int_or_float() {
    let toks = kinds("put 42 3.5\n");
    assert_eq!(toks[1], TokenKind::Integer(42));
    assert_eq!(toks[2], TokenKind::Float(3.5));
}

#[test]
fn bad_number_is_a_lex_error_with_position() {
    let err = tokenize("put 12ab\n").unwrap_err();
    assert_eq!(format!("{}", err), "error 1:5: could not parse number literal 12ab");
    assert!(tokenize("put 1.2.3\n").is_err());
}

#[test]
fn invalid_symbol_is_a_lex_error() {
    let err = tokenize("put ?\n").unwrap_err();
    assert!(format!("{}", err).starts_with("error 1:5: invalid symbol"));
}

#[test]
fn unterminated_string_is_a_lex_error() {
    assert!(tokenize("put \"oops\n").is_err());
}

#[test]
fn positions_are_one_indexed() {
    let toks = tokenize("put 1\nput 2\n").expect("tokenize");
    assert_eq!((toks[0].pos.line, toks[0].pos.column), (1, 1));
    assert_eq!((toks[1].pos.line, toks[1].pos.column), (1, 5));
    assert_eq!((toks[3].pos.line, toks[3].pos.column), (2, 1));
}
