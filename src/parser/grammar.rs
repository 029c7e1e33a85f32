//! Fragment grammar using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::parser::ast::*;
use crate::parser::lexer::Token;

/// Parse fragment source into the template model
pub fn parse(input: &str) -> Result<Fragment, Vec<crate::ParseError>> {
    let len = input.len();

    let token_iter = crate::parser::lexer::lex(input)
        .into_iter()
        .map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    fragment_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn fragment_parser<'a, I>() -> impl Parser<'a, I, Fragment, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let identifier = select! {
        Token::Ident(s) => Identifier::new(s),
    }
    .map_with(|id, e| Spanned::new(id, span_range(&e.span())));

    let string_literal = select! {
        Token::String(s) => s,
    }
    .map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    let open = just(Token::Open);
    let close = just(Token::Close);

    let text = select! {
        Token::Text(s) => Node::Text(s),
    };

    // {{name}} or {{name | "default"}}
    let placeholder = identifier
        .clone()
        .then(
            just(Token::Pipe)
                .ignore_then(string_literal.clone())
                .or_not(),
        )
        .delimited_by(open.clone(), close.clone())
        .map(|(name, default)| Node::Placeholder(Placeholder { name, default }));

    // {{> name key="value" ...}}; quoted names may contain '/'
    let binding = identifier
        .clone()
        .then_ignore(just(Token::Equals))
        .then(string_literal.clone())
        .map(|(name, value)| Binding { name, value });

    let include_target = choice((
        string_literal.clone(),
        identifier
            .clone()
            .map(|id| Spanned::new(id.node.0, id.span)),
    ));

    let include = just(Token::Gt)
        .ignore_then(include_target)
        .then(binding.repeated().collect::<Vec<_>>())
        .delimited_by(open.clone(), close.clone())
        .map(|(fragment, bindings)| Node::Include(IncludeDecl { fragment, bindings }));

    let else_tag = just(Token::Else).delimited_by(open.clone(), close.clone());

    let node = recursive(|node| {
        let body = node.clone().repeated().collect::<Vec<_>>();

        // Conditionals and loops share one shape:
        // {{#kw name}} body ({{else}} body)? {{/kw}}
        // The closing keyword must repeat the opening one.
        let block = |keyword: Token| {
            just(Token::Hash)
                .ignore_then(just(keyword.clone()))
                .ignore_then(identifier.clone())
                .delimited_by(open.clone(), close.clone())
                .then(body.clone())
                .then(else_tag.clone().ignore_then(body.clone()).or_not())
                .then_ignore(
                    just(Token::Slash)
                        .ignore_then(just(keyword))
                        .delimited_by(open.clone(), close.clone()),
                )
        };

        let if_block = block(Token::If).map(|((condition, then_branch), else_branch)| {
            Node::Conditional(Conditional {
                condition,
                negated: false,
                then_branch,
                else_branch: else_branch.unwrap_or_default(),
            })
        });

        let unless_block = block(Token::Unless).map(|((condition, then_branch), else_branch)| {
            Node::Conditional(Conditional {
                condition,
                negated: true,
                then_branch,
                else_branch: else_branch.unwrap_or_default(),
            })
        });

        let each_block = block(Token::Each).map(|((list, body), empty_branch)| {
            Node::Each(EachBlock {
                list,
                body,
                empty_branch: empty_branch.unwrap_or_default(),
            })
        });

        // Blocks and includes start with '{{' plus a marker token, so plain
        // placeholders go last
        choice((
            text.clone(),
            if_block,
            unless_block,
            each_block,
            include.clone(),
            placeholder.clone(),
        ))
        .map_with(|n, e| Spanned::new(n, span_range(&e.span())))
        .boxed()
    });

    node.repeated()
        .collect()
        .then_ignore(end())
        .map(|nodes| Fragment { nodes })
}
