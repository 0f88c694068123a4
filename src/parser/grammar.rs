use crate::error::ParseError;
use crate::types::{is_name, is_package_name, is_type_ref, FieldRule, ID_MAX, ID_MIN};
use super::ast::*;
use super::lexer::{Lexer, Located, Token};

/// Parse `.proto` schema text into a definition tree.
pub fn parse_schema(input: &str) -> Result<ProtoDef, ParseError> {
    let mut lexer = Lexer::new(input);
    let mut proto = ProtoDef::default();
    let mut header = true;

    loop {
        let tok = lexer.next_token()?;
        let word = match tok.token {
            Token::Eof => break,
            Token::Semicolon => continue,
            Token::Word(w) => w,
            other => return Err(syntax(tok.line, format!("illegal top level token {:?}", other))),
        };
        match word {
            "package" | "import" | "option" | "syntax" if !header => {
                return Err(syntax(
                    tok.line,
                    format!("illegal {}: must be declared before the first message or enum", word),
                ));
            }
            "package" => {
                if proto.package.is_some() {
                    return Err(syntax(tok.line, "duplicate package declaration"));
                }
                let name = expect_word(&mut lexer)?;
                if !is_package_name(name) {
                    return Err(syntax(tok.line, format!("illegal package name '{}'", name)));
                }
                expect_token(&mut lexer, Token::Semicolon)?;
                proto.package = Some(name.to_string());
            }
            "import" => {
                let next = lexer.peek_token()?;
                if let Token::Word("public") | Token::Word("weak") = next.token {
                    lexer.next_token()?;
                }
                let path = expect_string(&mut lexer)?;
                expect_token(&mut lexer, Token::Semicolon)?;
                proto.imports.push(ImportDef::Path(path));
            }
            "option" => {
                let (name, value) = parse_option(&mut lexer)?;
                proto.options.insert(name, value);
            }
            "syntax" => {
                expect_token(&mut lexer, Token::Equals)?;
                let value = expect_string(&mut lexer)?;
                expect_token(&mut lexer, Token::Semicolon)?;
                proto.syntax = Some(value);
            }
            "message" => {
                header = false;
                proto.messages.push(parse_message(&mut lexer)?);
            }
            "enum" => {
                header = false;
                proto.enums.push(parse_enum(&mut lexer)?);
            }
            "service" => proto.services.push(parse_service(&mut lexer)?),
            "extend" => proto.extends.push(parse_extend(&mut lexer)?),
            _ => {
                return Err(syntax(
                    tok.line,
                    format!("illegal top level declaration '{}'", word),
                ));
            }
        }
    }

    Ok(proto)
}

/// Parse `option NAME = VALUE ;` after the `option` keyword.
fn parse_option(lexer: &mut Lexer) -> Result<(String, OptionValue), ParseError> {
    let name = parse_option_name(lexer)?;
    expect_token(lexer, Token::Equals)?;
    let value = parse_option_value(lexer)?;
    expect_token(lexer, Token::Semicolon)?;
    Ok((name, value))
}

/// An option name: `name`, `(custom.name)` or `(custom.name).sub.path`.
fn parse_option_name(lexer: &mut Lexer) -> Result<String, ParseError> {
    let tok = lexer.next_token()?;
    match tok.token {
        Token::Word(w) if is_type_ref(w) => Ok(w.to_string()),
        Token::LParen => {
            let inner = expect_word(lexer)?;
            if !is_type_ref(inner) {
                return Err(syntax(tok.line, format!("illegal custom option name '{}'", inner)));
            }
            expect_token(lexer, Token::RParen)?;
            let mut name = format!("({})", inner);
            if let Token::Word(rest) = lexer.peek_token()?.token {
                if rest.starts_with('.') && is_type_ref(rest) {
                    lexer.next_token()?;
                    name.push_str(rest);
                }
            }
            Ok(name)
        }
        other => Err(syntax(tok.line, format!("illegal option name {:?}", other))),
    }
}

fn parse_option_value(lexer: &mut Lexer) -> Result<OptionValue, ParseError> {
    let tok = lexer.peek_token()?;
    match tok.token {
        Token::Quote => Ok(OptionValue::Str(expect_string(lexer)?)),
        Token::Word(w) => {
            lexer.next_token()?;
            Ok(match w {
                "true" => OptionValue::Bool(true),
                "false" => OptionValue::Bool(false),
                _ => {
                    if let Ok(n) = parse_int(w) {
                        OptionValue::Int(n)
                    } else if let Ok(f) = w.parse::<f64>() {
                        OptionValue::Float(f)
                    } else if is_type_ref(w) {
                        OptionValue::Str(w.to_string())
                    } else {
                        return Err(syntax(tok.line, format!("illegal option value '{}'", w)));
                    }
                }
            })
        }
        other => Err(syntax(tok.line, format!("illegal option value {:?}", other))),
    }
}

/// Parse `[name = value, ...]`, the opening bracket already peeked.
fn parse_inline_options(lexer: &mut Lexer, options: &mut Options) -> Result<(), ParseError> {
    expect_token(lexer, Token::LBracket)?;
    loop {
        let name = parse_option_name(lexer)?;
        expect_token(lexer, Token::Equals)?;
        let value = parse_option_value(lexer)?;
        options.insert(name, value);
        let tok = lexer.next_token()?;
        match tok.token {
            Token::Comma => continue,
            Token::RBracket => return Ok(()),
            other => {
                return Err(syntax(
                    tok.line,
                    format!("expected ',' or ']' in options, found {:?}", other),
                ));
            }
        }
    }
}

fn parse_message(lexer: &mut Lexer) -> Result<MessageDef, ParseError> {
    let name = expect_name(lexer)?;
    expect_token(lexer, Token::LBrace)?;

    let mut msg = MessageDef {
        name,
        ..MessageDef::default()
    };

    loop {
        let tok = lexer.next_token()?;
        let word = match tok.token {
            Token::RBrace => break,
            Token::Semicolon => continue,
            Token::Eof => {
                return Err(syntax(
                    tok.line,
                    format!("unexpected end of input in message '{}'", msg.name),
                ));
            }
            Token::Word(w) => w,
            other => {
                return Err(syntax(
                    tok.line,
                    format!("illegal token {:?} in message '{}'", other, msg.name),
                ));
            }
        };
        if let Some(rule) = FieldRule::from_keyword(word) {
            msg.fields.push(parse_field(lexer, rule)?);
            continue;
        }
        match word {
            "message" => msg.messages.push(parse_message(lexer)?),
            "enum" => msg.enums.push(parse_enum(lexer)?),
            "extend" => msg.extends.push(parse_extend(lexer)?),
            "option" => {
                let (name, value) = parse_option(lexer)?;
                msg.options.insert(name, value);
            }
            "extensions" => {
                if msg.extensions.is_some() {
                    return Err(syntax(
                        tok.line,
                        format!("duplicate extensions range in '{}'", msg.name),
                    ));
                }
                msg.extensions = Some(parse_extensions(lexer)?);
            }
            _ => skip_statement(lexer)?,
        }
    }

    Ok(msg)
}

/// Parse `RULE TYPE NAME = ID [opts] ;` after the rule keyword.
fn parse_field(lexer: &mut Lexer, rule: FieldRule) -> Result<FieldDef, ParseError> {
    let type_name = expect_type_ref(lexer)?;
    let name = expect_name(lexer)?;
    expect_token(lexer, Token::Equals)?;
    let id = expect_id(lexer, false)?;

    let mut options = Options::new();
    if lexer.peek_token()?.token == Token::LBracket {
        parse_inline_options(lexer, &mut options)?;
    }
    expect_token(lexer, Token::Semicolon)?;

    Ok(FieldDef {
        rule,
        type_name,
        name,
        id,
        options,
    })
}

/// Parse `N|min to N|max ;` after the `extensions` keyword.
fn parse_extensions(lexer: &mut Lexer) -> Result<[i32; 2], ParseError> {
    let tok = lexer.next_token()?;
    let lo = match tok.token {
        Token::Word("min") => ID_MIN,
        Token::Word(w) => parse_id(w, false).map_err(|m| syntax(tok.line, m))?,
        other => {
            return Err(syntax(
                tok.line,
                format!("expected extension range start, found {:?}", other),
            ))
        }
    };
    let to = lexer.next_token()?;
    if to.token != Token::Word("to") {
        return Err(syntax(to.line, format!("expected 'to', found {:?}", to.token)));
    }
    let tok = lexer.next_token()?;
    let hi = match tok.token {
        Token::Word("max") => ID_MAX,
        Token::Word(w) => parse_id(w, false).map_err(|m| syntax(tok.line, m))?,
        other => {
            return Err(syntax(
                tok.line,
                format!("expected extension range end, found {:?}", other),
            ))
        }
    };
    expect_token(lexer, Token::Semicolon)?;
    Ok([lo.max(ID_MIN), hi.min(ID_MAX)])
}

fn parse_enum(lexer: &mut Lexer) -> Result<EnumDef, ParseError> {
    let name = expect_name(lexer)?;
    expect_token(lexer, Token::LBrace)?;

    let mut def = EnumDef {
        name,
        ..EnumDef::default()
    };

    loop {
        let tok = lexer.next_token()?;
        match tok.token {
            Token::RBrace => break,
            Token::Semicolon => continue,
            Token::Word("option") => {
                let (name, value) = parse_option(lexer)?;
                def.options.insert(name, value);
            }
            Token::Word(w) if is_name(w) => {
                expect_token(lexer, Token::Equals)?;
                let id = expect_id(lexer, true)?;
                if lexer.peek_token()?.token == Token::LBracket {
                    // Value options carry nothing the runtime uses.
                    let mut ignored = Options::new();
                    parse_inline_options(lexer, &mut ignored)?;
                }
                expect_token(lexer, Token::Semicolon)?;
                def.values.push(EnumValueDef {
                    name: w.to_string(),
                    id,
                });
            }
            other => {
                return Err(syntax(
                    tok.line,
                    format!("illegal token {:?} in enum '{}'", other, def.name),
                ));
            }
        }
    }

    Ok(def)
}

fn parse_service(lexer: &mut Lexer) -> Result<ServiceDef, ParseError> {
    let name = expect_name(lexer)?;
    expect_token(lexer, Token::LBrace)?;

    let mut svc = ServiceDef {
        name,
        ..ServiceDef::default()
    };

    loop {
        let tok = lexer.next_token()?;
        match tok.token {
            Token::RBrace => break,
            Token::Semicolon => continue,
            Token::Word("option") => {
                let (name, value) = parse_option(lexer)?;
                svc.options.insert(name, value);
            }
            Token::Word("rpc") => svc.methods.push(parse_rpc(lexer)?),
            other => {
                return Err(syntax(
                    tok.line,
                    format!("illegal token {:?} in service '{}'", other, svc.name),
                ));
            }
        }
    }

    Ok(svc)
}

/// Parse `NAME ( REQ ) returns ( RESP ) ( ; | { option* } )` after `rpc`.
fn parse_rpc(lexer: &mut Lexer) -> Result<MethodDef, ParseError> {
    let name = expect_name(lexer)?;
    expect_token(lexer, Token::LParen)?;
    let request = expect_type_ref(lexer)?;
    expect_token(lexer, Token::RParen)?;
    let tok = lexer.next_token()?;
    if tok.token != Token::Word("returns") {
        return Err(syntax(tok.line, format!("expected 'returns', found {:?}", tok.token)));
    }
    expect_token(lexer, Token::LParen)?;
    let response = expect_type_ref(lexer)?;
    expect_token(lexer, Token::RParen)?;

    let mut options = Options::new();
    let tok = lexer.next_token()?;
    match tok.token {
        Token::Semicolon => {}
        Token::LBrace => loop {
            let tok = lexer.next_token()?;
            match tok.token {
                Token::RBrace => break,
                Token::Semicolon => continue,
                Token::Word("option") => {
                    let (name, value) = parse_option(lexer)?;
                    options.insert(name, value);
                }
                other => {
                    return Err(syntax(
                        tok.line,
                        format!("illegal token {:?} in rpc '{}'", other, name),
                    ));
                }
            }
        },
        other => return Err(syntax(tok.line, format!("expected ';' or '{{', found {:?}", other))),
    }

    Ok(MethodDef {
        name,
        request,
        response,
        options,
    })
}

fn parse_extend(lexer: &mut Lexer) -> Result<ExtendDef, ParseError> {
    let target = expect_type_ref(lexer)?;
    expect_token(lexer, Token::LBrace)?;
    let mut fields = Vec::new();

    loop {
        let tok = lexer.next_token()?;
        match tok.token {
            Token::RBrace => break,
            Token::Semicolon => continue,
            Token::Word(w) => match FieldRule::from_keyword(w) {
                Some(rule) => fields.push(parse_field(lexer, rule)?),
                None => {
                    return Err(syntax(
                        tok.line,
                        format!("illegal token '{}' in extend '{}'", w, target),
                    ));
                }
            },
            other => {
                return Err(syntax(
                    tok.line,
                    format!("illegal token {:?} in extend '{}'", other, target),
                ));
            }
        }
    }

    Ok(ExtendDef { target, fields })
}

/// Skip an unrecognized statement: up to the next `;`, or a whole
/// depth-balanced `{ ... }` block if one opens first.
fn skip_statement(lexer: &mut Lexer) -> Result<(), ParseError> {
    let mut depth = 0usize;
    loop {
        let tok = lexer.next_token()?;
        match tok.token {
            Token::Eof => return Err(syntax(tok.line, "unexpected end of input")),
            Token::Semicolon if depth == 0 => return Ok(()),
            Token::LBrace => depth += 1,
            Token::RBrace => {
                if depth == 0 {
                    return Err(syntax(tok.line, "unbalanced '}'"));
                }
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            _ => {}
        }
    }
}

/// Parse an integer literal: decimal, hex (`0x`) or octal (leading `0`),
/// with an optional sign.
fn parse_int(text: &str) -> Result<i64, String> {
    let illegal = || format!("illegal number '{}'", text);
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (radix, body) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    // only one sign, and only in front of the prefix
    if body.starts_with(|c| c == '+' || c == '-') {
        return Err(illegal());
    }
    let value = i64::from_str_radix(body, radix).map_err(|_| illegal())?;
    Ok(if negative { -value } else { value })
}

/// Parse a field or enum value id. Negative ids are only accepted when
/// `allow_negative` is set.
fn parse_id(text: &str, allow_negative: bool) -> Result<i32, String> {
    let value = parse_int(text)?;
    if value < 0 && !allow_negative {
        return Err(format!("illegal id '{}': must not be negative", text));
    }
    i32::try_from(value).map_err(|_| format!("illegal id '{}': out of range", text))
}

// Helper functions

fn syntax(line: usize, message: impl Into<String>) -> ParseError {
    ParseError::Syntax {
        line,
        message: message.into(),
    }
}

fn expect_word<'a>(lexer: &mut Lexer<'a>) -> Result<&'a str, ParseError> {
    let tok = lexer.next_token()?;
    match tok.token {
        Token::Word(w) => Ok(w),
        other => Err(unexpected(&tok, "a name", other)),
    }
}

fn expect_name(lexer: &mut Lexer) -> Result<String, ParseError> {
    let tok = lexer.next_token()?;
    match tok.token {
        Token::Word(w) if is_name(w) => Ok(w.to_string()),
        Token::Word(w) => Err(syntax(tok.line, format!("illegal name '{}'", w))),
        other => Err(unexpected(&tok, "a name", other)),
    }
}

fn expect_type_ref(lexer: &mut Lexer) -> Result<String, ParseError> {
    let tok = lexer.next_token()?;
    match tok.token {
        Token::Word(w) if is_type_ref(w) => Ok(w.to_string()),
        Token::Word(w) => Err(syntax(tok.line, format!("illegal type reference '{}'", w))),
        other => Err(unexpected(&tok, "a type reference", other)),
    }
}

fn expect_id(lexer: &mut Lexer, allow_negative: bool) -> Result<i32, ParseError> {
    let tok = lexer.next_token()?;
    match tok.token {
        Token::Word(w) => parse_id(w, allow_negative).map_err(|m| syntax(tok.line, m)),
        other => Err(unexpected(&tok, "an id", other)),
    }
}

fn expect_string(lexer: &mut Lexer) -> Result<String, ParseError> {
    expect_token(lexer, Token::Quote)?;
    let tok = lexer.next_token()?;
    let body = match tok.token {
        Token::Str(s) => s.to_string(),
        other => return Err(unexpected(&tok, "a string", other)),
    };
    expect_token(lexer, Token::Quote)?;
    Ok(body)
}

fn expect_token(lexer: &mut Lexer, expected: Token) -> Result<(), ParseError> {
    let tok = lexer.next_token()?;
    if tok.token == expected {
        Ok(())
    } else {
        Err(syntax(
            tok.line,
            format!("expected {:?}, found {:?}", expected, tok.token),
        ))
    }
}

fn unexpected(tok: &Located, what: &str, found: Token) -> ParseError {
    match found {
        Token::Eof => syntax(tok.line, format!("unexpected end of input, expected {}", what)),
        other => syntax(tok.line, format!("expected {}, found {:?}", what, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_message() {
        let proto =
            parse_schema("message Point { required int32 x = 1; required int32 y = 2; }").unwrap();
        assert_eq!(proto.messages.len(), 1);
        let msg = &proto.messages[0];
        assert_eq!(msg.name, "Point");
        assert_eq!(msg.fields.len(), 2);
        assert_eq!(msg.fields[1].name, "y");
        assert_eq!(msg.fields[1].id, 2);
        assert_eq!(msg.fields[1].rule, FieldRule::Required);
    }

    #[test]
    fn test_parse_header() {
        let proto = parse_schema(
            r#"
            syntax = "proto2";
            package a.b;
            import public "other.proto";
            option java_package = "com.example";
            option (my.opt).sub = 3;
            message M {}
            "#,
        )
        .unwrap();
        assert_eq!(proto.syntax.as_deref(), Some("proto2"));
        assert_eq!(proto.package.as_deref(), Some("a.b"));
        assert_eq!(proto.imports, vec![ImportDef::Path("other.proto".into())]);
        assert_eq!(
            proto.options.get("java_package"),
            Some(&OptionValue::Str("com.example".into()))
        );
        assert_eq!(proto.options.get("(my.opt).sub"), Some(&OptionValue::Int(3)));
    }

    #[test]
    fn test_header_after_message_fails() {
        let err = parse_schema("message M {}\npackage late;").unwrap_err();
        match err {
            ParseError::Syntax { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("before the first message or enum"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_id("10", false), Ok(10));
        assert_eq!(parse_id("0x1F", false), Ok(31));
        assert_eq!(parse_id("017", false), Ok(15));
        assert_eq!(parse_id("-3", true), Ok(-3));
        assert!(parse_id("-3", false).is_err());
        assert!(parse_id("abc", false).is_err());
        assert!(parse_id("--5", true).is_err());
        assert!(parse_id("+-5", true).is_err());
        assert!(parse_id("0x-5", true).is_err());
        assert!(parse_id("0x+5", false).is_err());
        assert!(parse_id("0-7", true).is_err());
    }

    #[test]
    fn test_parse_field_options() {
        let proto = parse_schema(
            "message M { repeated int32 v = 1 [packed = true, (custom) = \"x\"]; \
             optional string s = 2 [default = \"hi\"]; }",
        )
        .unwrap();
        let f = &proto.messages[0].fields[0];
        assert_eq!(f.options.get("packed"), Some(&OptionValue::Bool(true)));
        assert_eq!(f.options.get("(custom)"), Some(&OptionValue::Str("x".into())));
        let s = &proto.messages[0].fields[1];
        assert_eq!(s.options.get("default"), Some(&OptionValue::Str("hi".into())));
    }

    #[test]
    fn test_parse_enum_and_negative_values() {
        let proto = parse_schema("enum E { A = 0; B = -1; C = 0x10; }").unwrap();
        let e = &proto.enums[0];
        assert_eq!(e.values.len(), 3);
        assert_eq!(e.values[1].id, -1);
        assert_eq!(e.values[2].id, 16);
    }

    #[test]
    fn test_parse_extensions_and_extend() {
        let proto = parse_schema(
            r#"
            message Base { extensions 100 to max; }
            extend Base { optional int32 extra = 100; }
            "#,
        )
        .unwrap();
        assert_eq!(proto.messages[0].extensions, Some([100, ID_MAX]));
        assert_eq!(proto.extends[0].target, "Base");
        assert_eq!(proto.extends[0].fields[0].id, 100);
    }

    #[test]
    fn test_parse_service() {
        let proto = parse_schema(
            r#"
            service Greeter {
                rpc Hello (Req) returns (.pkg.Resp);
                rpc Bye (Req) returns (Resp) { option deadline = 5; }
            }
            "#,
        )
        .unwrap();
        let svc = &proto.services[0];
        assert_eq!(svc.methods.len(), 2);
        assert_eq!(svc.methods[0].response, ".pkg.Resp");
        assert_eq!(svc.methods[1].options.get("deadline"), Some(&OptionValue::Int(5)));
    }

    #[test]
    fn test_unknown_nested_directives_skipped() {
        let proto = parse_schema(
            r#"
            message M {
                reserved 4, 5;
                weird { nested { deep; } }
                optional int32 v = 1;
            }
            "#,
        )
        .unwrap();
        assert_eq!(proto.messages[0].fields.len(), 1);
    }

    #[test]
    fn test_unknown_top_level_fails() {
        assert!(matches!(
            parse_schema("struct S {}"),
            Err(ParseError::Syntax { line: 1, .. })
        ));
    }

    #[test]
    fn test_unterminated_comment_reports_eof() {
        let err = parse_schema("message M { /* oops").unwrap_err();
        match err {
            ParseError::Syntax { message, .. } => assert!(message.contains("end of input")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
