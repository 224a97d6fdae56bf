use tarn::lexer::token::TokenKind;

fn kinds(source: &str) -> Vec<TokenKind> {
    tarn::lexer::lex(source)
        .expect("lex should succeed")
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

#[test]
fn lexes_definition_head() {
    let kinds = kinds("add a b = a + b\n");
    assert_eq!(
        kinds,
        vec![
            TokenKind::Ident("add".to_string()),
            TokenKind::Ident("a".to_string()),
            TokenKind::Ident("b".to_string()),
            TokenKind::Symbol('='),
            TokenKind::Ident("a".to_string()),
            TokenKind::Symbol('+'),
            TokenKind::Ident("b".to_string()),
            TokenKind::Symbol('\n'),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn lexes_number_forms() {
    let kinds = kinds("42 0x1F 1.5 2. .5 1e3 2.5e-1");
    assert_eq!(kinds[0], TokenKind::Int(42));
    assert_eq!(kinds[1], TokenKind::Int(31));
    assert_eq!(kinds[2], TokenKind::Float(1.5));
    assert_eq!(kinds[3], TokenKind::Float(2.0));
    assert_eq!(kinds[4], TokenKind::Float(0.5));
    assert_eq!(kinds[5], TokenKind::Float(1000.0));
    assert_eq!(kinds[6], TokenKind::Float(0.25));
}

#[test]
fn decodes_char_and_string_escapes() {
    let kinds = kinds(r#"'a' '\n' "tab\there" `raw\n`"#);
    assert_eq!(kinds[0], TokenKind::Char('a'));
    assert_eq!(kinds[1], TokenKind::Char('\n'));
    assert_eq!(kinds[2], TokenKind::String("tab\there".to_string()));
    assert_eq!(kinds[3], TokenKind::RawString("raw\\n".to_string()));
}

#[test]
fn skips_comments_but_keeps_newlines() {
    let kinds = kinds("x // trailing\n/* block\ncomment */ y");
    assert_eq!(
        kinds,
        vec![
            TokenKind::Ident("x".to_string()),
            TokenKind::Symbol('\n'),
            TokenKind::Ident("y".to_string()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn tracks_token_positions() {
    let tokens = tarn::lexer::lex("one\n  two").expect("lex should succeed");
    assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
    assert_eq!((tokens[2].line, tokens[2].column), (2, 3));
}

#[test]
fn reports_bad_literals() {
    assert!(tarn::lexer::lex("'ab'").is_err());
    assert!(tarn::lexer::lex("\"open").is_err());
    assert!(tarn::lexer::lex("0x").is_err());
    assert!(tarn::lexer::lex("/* never closed").is_err());
}
