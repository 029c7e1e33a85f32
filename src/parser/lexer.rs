//! Lexer for fragment sources using logos
//!
//! Lexing runs in two passes. The outer pass splits the source into literal
//! markup and `{{ ... }}` tags, the inner pass tokenizes the inside of each tag.
//! Both passes feed a single flat token stream to the grammar.

use logos::Logos;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Tokens consumed by the fragment grammar
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal markup between tags
    Text(String),
    /// `{{`
    Open,
    /// `}}`
    Close,

    // Tag punctuation
    Hash,
    Slash,
    Gt,
    Pipe,
    Equals,

    // Block keywords
    If,
    Unless,
    Else,
    Each,

    Ident(String),
    String(String),

    /// A `{{` that is never closed
    Unclosed,
    /// Anything the lexer could not make sense of
    Invalid(String),
}

/// Outer pass: markup vs tags
#[derive(Logos, Debug, Clone, PartialEq)]
enum Segment {
    #[regex(r"\{\{![^}]*\}\}", priority = 10)]
    Comment,

    // Quoted strings inside a tag may contain braces
    #[regex(r#"\{\{([^{}"]|"([^"\\]|\\.)*")*\}\}"#)]
    Tag,

    // Matches every prefix of an unfinished tag
    #[regex(r"\{\{[^{}]*")]
    Unclosed,

    #[regex(r"[^{]+")]
    Text,

    // A lone brace is ordinary markup (CSS, code samples)
    #[token("{")]
    Brace,
}

/// Inner pass: the contents of a single tag
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
enum TagToken {
    #[token("#")]
    Hash,
    #[token("/")]
    Slash,
    #[token(">")]
    Gt,
    #[token("|")]
    Pipe,
    #[token("=")]
    Equals,

    #[token("if")]
    If,
    #[token("unless")]
    Unless,
    #[token("else")]
    Else,
    #[token("each")]
    Each,

    // Identifiers must come after keywords; `@` marks loop locals
    #[regex(r"@?[a-zA-Z_][a-zA-Z0-9_\-]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    String(String),
}

impl From<TagToken> for Token {
    fn from(tok: TagToken) -> Self {
        match tok {
            TagToken::Hash => Token::Hash,
            TagToken::Slash => Token::Slash,
            TagToken::Gt => Token::Gt,
            TagToken::Pipe => Token::Pipe,
            TagToken::Equals => Token::Equals,
            TagToken::If => Token::If,
            TagToken::Unless => Token::Unless,
            TagToken::Else => Token::Else,
            TagToken::Each => Token::Each,
            TagToken::Ident(s) => Token::Ident(s),
            TagToken::String(s) => Token::String(s),
        }
    }
}

/// Strip the quotes from a string literal and resolve `\"` and `\\`
fn unescape(literal: &str) -> String {
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Lex a fragment source into tokens with spans
///
/// Comments are dropped. Adjacent markup pieces (text and lone braces) are
/// merged into a single `Text` token.
pub fn lex(input: &str) -> Vec<(Token, Span)> {
    let mut tokens: Vec<(Token, Span)> = Vec::new();
    let mut segments = Segment::lexer(input);

    while let Some(segment) = segments.next() {
        let span = segments.span();
        match segment {
            Ok(Segment::Text) | Ok(Segment::Brace) => {
                push_text(&mut tokens, &input[span.clone()], span)
            }
            Ok(Segment::Comment) => {}
            Ok(Segment::Tag) => lex_tag(input, span, &mut tokens),
            Ok(Segment::Unclosed) => tokens.push((Token::Unclosed, span)),
            Err(()) => tokens.push((Token::Invalid(input[span.clone()].to_string()), span)),
        }
    }

    tokens
}

fn push_text(tokens: &mut Vec<(Token, Span)>, text: &str, span: Span) {
    if let Some((Token::Text(prev), prev_span)) = tokens.last_mut() {
        if prev_span.end == span.start {
            prev.push_str(text);
            prev_span.end = span.end;
            return;
        }
    }
    tokens.push((Token::Text(text.to_string()), span));
}

fn lex_tag(input: &str, span: Span, tokens: &mut Vec<(Token, Span)>) {
    let inner_start = span.start + 2;
    let inner_end = span.end - 2;
    tokens.push((Token::Open, span.start..inner_start));

    let mut lexer = TagToken::lexer(&input[inner_start..inner_end]);
    while let Some(tok) = lexer.next() {
        let local = lexer.span();
        let token = match tok {
            Ok(t) => t.into(),
            Err(()) => Token::Invalid(lexer.slice().to_string()),
        };
        tokens.push((token, inner_start + local.start..inner_start + local.end));
    }

    tokens.push((Token::Close, inner_end..span.end));
}
