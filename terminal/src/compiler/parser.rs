use std::{fmt, ops::Range, path::PathBuf, rc::Rc};

use arcstr::ArcStr;
use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use chumsky::{prelude::*, primitive::take_until, Stream};

use super::{
    ast::{is_symbol_char, Name, Number, Term, TermList, CURLY_BRACKETS, EMPTY_LIST},
    operators::{OperatorTable, Priority, ARGUMENT_PRIORITY, MAX_PRIORITY},
};

type Span = Range<usize>;
type SingleParseError = Simple<String>;

#[derive(Debug)]
pub enum ParseErrorReport {
    FailedToOpenFile {
        path: PathBuf,
        error: std::io::Error,
    },
    ParseError {
        id: ArcStr,
        source: ArcStr,
        errors: Vec<SingleParseError>,
    },
}

impl fmt::Display for ParseErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailedToOpenFile { path, error } => {
                write!(f, "Failed to open {}: {}", path.display(), error)
            }
            Self::ParseError { id, source, errors } => {
                for error in errors {
                    let msg = if let chumsky::error::SimpleReason::Custom(msg) = error.reason() {
                        msg.clone()
                    } else {
                        format!(
                            "{}{}, expected {}",
                            if error.found().is_some() {
                                "Unexpected token"
                            } else {
                                "Unexpected end of input"
                            },
                            if let Some(label) = error.label() {
                                format!(" while parsing {}", label)
                            } else {
                                String::new()
                            },
                            if error.expected().len() == 0 {
                                "something else".to_string()
                            } else {
                                error
                                    .expected()
                                    .map(|expected| match expected {
                                        Some(expected) => expected.to_string(),
                                        None => "end of input".to_string(),
                                    })
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            },
                        )
                    };

                    let report = Report::build(ReportKind::Error, id, error.span().start)
                        .with_message(msg)
                        .with_label(
                            Label::new((id, error.span()))
                                .with_message(match error.reason() {
                                    chumsky::error::SimpleReason::Custom(msg) => msg.clone(),
                                    _ => format!(
                                        "Unexpected {}",
                                        error
                                            .found()
                                            .map(|found| format!("token {}", found.fg(Color::Red)))
                                            .unwrap_or_else(|| "end of input".to_string())
                                    ),
                                })
                                .with_color(Color::Red),
                        );

                    let report = match error.reason() {
                        chumsky::error::SimpleReason::Unclosed { span, delimiter } => report
                            .with_label(
                                Label::new((id, span.clone()))
                                    .with_message(format!(
                                        "Unclosed delimiter {}",
                                        delimiter.fg(Color::Yellow)
                                    ))
                                    .with_color(Color::Yellow),
                            ),
                        chumsky::error::SimpleReason::Unexpected => report,
                        chumsky::error::SimpleReason::Custom(_) => report,
                    };

                    let mut buffer = Vec::new();

                    report
                        .finish()
                        .write((id, Source::from(source.as_str())), &mut buffer)
                        .map_err(|_| fmt::Error)?;

                    f.write_str(&String::from_utf8_lossy(&buffer))?;
                }

                Ok(())
            }
        }
    }
}

impl std::error::Error for ParseErrorReport {}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Token {
    Name(ArcStr),
    /// A name immediately followed by an opening bracket
    Functor(ArcStr),
    Variable(ArcStr),
    Number(Number),
    Open,
    Close,
    OpenList,
    CloseList,
    OpenCurly,
    CloseCurly,
    Comma,
    Bar,
    End,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) | Self::Variable(name) => name.fmt(f),
            Self::Functor(name) => write!(f, "{name}("),
            Self::Number(number) => number.fmt(f),
            Self::Open => "(".fmt(f),
            Self::Close => ")".fmt(f),
            Self::OpenList => "[".fmt(f),
            Self::CloseList => "]".fmt(f),
            Self::OpenCurly => "{".fmt(f),
            Self::CloseCurly => "}".fmt(f),
            Self::Comma => ",".fmt(f),
            Self::Bar => "|".fmt(f),
            Self::End => "end of clause".fmt(f),
        }
    }
}

fn lowercase(c: &char) -> bool {
    c.is_lowercase()
}

fn variable_start(c: &char) -> bool {
    c.is_uppercase() || *c == '_'
}

fn ident(c: &char) -> bool {
    c.is_alphanumeric() || *c == '_'
}

fn whitespace(c: &char) -> bool {
    c.is_whitespace()
}

fn line_comment() -> impl Parser<char, (), Error = Simple<char>> + Clone {
    just('%')
        .then(filter(|c: &char| *c != '\n').repeated())
        .ignored()
}

fn layout() -> impl Parser<char, (), Error = Simple<char>> + Clone {
    let block_comment = just("/*").then(take_until(just("*/"))).ignored();

    choice((filter(whitespace).ignored(), line_comment(), block_comment))
        .repeated()
        .ignored()
}

fn lexer() -> impl Parser<char, Vec<(Token, Span)>, Error = Simple<char>> {
    let end_of_clause = just('.')
        .then(choice((
            filter(whitespace).ignored(),
            line_comment(),
            end(),
        )))
        .to(Token::End)
        .labelled("end of clause");

    let number = text::digits(10)
        .then(just('.').ignore_then(text::digits(10)).or_not())
        .try_map(|(integral, fractional): (String, Option<String>), span| {
            Number::from_digits(&integral, fractional.as_deref())
                .map(Token::Number)
                .ok_or_else(|| Simple::custom(span, "Invalid number"))
        })
        .labelled("number");

    let variable = filter(variable_start)
        .chain(filter(ident).repeated())
        .collect::<String>()
        .map(|name| Token::Variable(name.into()))
        .labelled("variable");

    let letter_name = filter(lowercase)
        .chain(filter(ident).repeated())
        .collect::<String>();

    let quoted_char = just("''")
        .to('\'')
        .or(just('\\').ignore_then(choice((
            just('n').to('\n'),
            just('t').to('\t'),
            just('\\'),
            just('\''),
        ))))
        .or(filter(|c: &char| *c != '\'' && *c != '\\'));

    let quoted_name = just('\'')
        .ignore_then(quoted_char.repeated())
        .then_ignore(just('\''))
        .collect::<String>();

    let symbol_name = filter(|c: &char| is_symbol_char(*c))
        .repeated()
        .at_least(1)
        .collect::<String>();

    let solo_name = choice((
        just('!').to(String::from("!")),
        just(';').to(String::from(";")),
        just('[')
            .then(layout())
            .then(just(']'))
            .to(EMPTY_LIST.to_string()),
        just('{')
            .then(layout())
            .then(just('}'))
            .to(CURLY_BRACKETS.to_string()),
    ));

    let name = choice((letter_name, quoted_name, symbol_name, solo_name))
        .then(just('(').or_not())
        .map(|(name, open)| match open {
            Some(_) => Token::Functor(name.into()),
            None => Token::Name(name.into()),
        })
        .labelled("name");

    let punctuation = choice((
        just('(').to(Token::Open),
        just(')').to(Token::Close),
        just('[').to(Token::OpenList),
        just(']').to(Token::CloseList),
        just('{').to(Token::OpenCurly),
        just('}').to(Token::CloseCurly),
        just(',').to(Token::Comma),
        just('|').to(Token::Bar),
    ));

    let token = choice((end_of_clause, number, variable, name, punctuation))
        .map_with_span(|token, span| (token, span));

    layout()
        .ignore_then(token.then_ignore(layout()).repeated())
        .then_ignore(end())
}

#[derive(Debug, Clone)]
enum Item {
    Term { term: Term, span: Span },
    Name(Name),
    Comma(Span),
    Bar(Span),
}

impl Item {
    fn span(&self) -> Span {
        match self {
            Self::Term { span, .. } | Self::Comma(span) | Self::Bar(span) => span.clone(),
            Self::Name(name) => name.span().clone(),
        }
    }
}

/// Resolves a flat sequence of operands and names into a term using operator priorities
struct Resolver<'a> {
    operators: &'a OperatorTable,
    items: std::iter::Peekable<std::vec::IntoIter<Item>>,
    span: Span,
}

impl<'a> Resolver<'a> {
    fn resolve(
        operators: &'a OperatorTable,
        items: Vec<Item>,
        max_priority: Priority,
        span: Span,
    ) -> Result<Term, Simple<Token>> {
        let mut resolver = Self {
            operators,
            items: items.into_iter().peekable(),
            span,
        };

        let (term, _) = resolver.parse(max_priority)?;

        match resolver.items.next() {
            None => Ok(term),
            Some(item) => Err(Simple::custom(item.span(), "Operator priority clash")),
        }
    }

    fn starts_term(&mut self) -> bool {
        match self.items.peek() {
            Some(Item::Term { .. }) => true,
            Some(Item::Name(name)) => {
                self.operators.prefix(name.as_ref()).is_some()
                    || !self.operators.is_operator(name.as_ref())
            }
            Some(Item::Comma(_) | Item::Bar(_)) | None => false,
        }
    }

    fn parse_primary(&mut self, max_priority: Priority) -> Result<(Term, Priority), Simple<Token>> {
        let name = match self.items.next() {
            None => {
                let end = self.span.end;
                return Err(Simple::custom(end..end, "Expected a term"));
            }
            Some(Item::Term { term, .. }) => return Ok((term, 0)),
            Some(Item::Comma(span) | Item::Bar(span)) => {
                return Err(Simple::custom(span, "Expected a term"))
            }
            Some(Item::Name(name)) => name,
        };

        if name.as_ref() == "-" {
            if let Some(Item::Term {
                term: Term::Number { .. },
                span,
            }) = self.items.peek()
            {
                if span.start == name.span().end {
                    if let Some(Item::Term {
                        term: Term::Number { value },
                        ..
                    }) = self.items.next()
                    {
                        return Ok((
                            Term::Number {
                                value: value.negate(),
                            },
                            0,
                        ));
                    }
                }
            }
        }

        if let Some(operator) = self.operators.prefix(name.as_ref()) {
            if operator.priority <= max_priority && self.starts_term() {
                let (term, _) = self.parse(operator.right)?;

                return Ok((
                    Term::Callable {
                        name,
                        terms: TermList::from([term]),
                    },
                    operator.priority,
                ));
            }
        }

        Ok((Term::Atom { name }, 0))
    }

    fn parse(&mut self, max_priority: Priority) -> Result<(Term, Priority), Simple<Token>> {
        let (mut left, mut left_priority) = self.parse_primary(max_priority)?;

        loop {
            let name = match self.items.peek() {
                None => break,
                Some(Item::Name(name)) => name.clone(),
                Some(Item::Comma(span)) => Name::new(",", span.clone()),
                Some(Item::Bar(span)) => Name::new("|", span.clone()),
                Some(Item::Term { span, .. }) => {
                    return Err(Simple::custom(span.clone(), "Expected an operator"))
                }
            };

            if let Some(operator) = self.operators.infix(name.as_ref()) {
                if operator.priority <= max_priority && left_priority <= operator.left {
                    self.items.next();

                    let (right, _) = self.parse(operator.right)?;

                    left = Term::Callable {
                        name,
                        terms: TermList::from([left, right]),
                    };
                    left_priority = operator.priority;
                    continue;
                }
            }

            if let Some(operator) = self.operators.postfix(name.as_ref()) {
                if operator.priority <= max_priority && left_priority <= operator.left {
                    self.items.next();

                    left = Term::Callable {
                        name,
                        terms: TermList::from([left]),
                    };
                    left_priority = operator.priority;
                    continue;
                }
            }

            break;
        }

        Ok((left, left_priority))
    }
}

fn split_on_commas(items: Vec<Item>) -> Vec<Vec<Item>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();

    for item in items {
        if let Item::Comma(_) = item {
            groups.push(std::mem::take(&mut current));
        } else {
            current.push(item);
        }
    }

    groups.push(current);

    groups
}

fn arguments(
    operators: &OperatorTable,
    items: Vec<Item>,
    span: Span,
) -> Result<Vec<Term>, Simple<Token>> {
    split_on_commas(items)
        .into_iter()
        .map(|argument| {
            Resolver::resolve(operators, argument, ARGUMENT_PRIORITY, span.clone())
        })
        .collect()
}

fn list(operators: &OperatorTable, items: Vec<Item>, span: Span) -> Result<Term, Simple<Token>> {
    let (elements, tail) = match items.iter().position(|item| matches!(item, Item::Bar(_))) {
        Some(bar) => {
            let mut elements = items;
            let tail = elements.split_off(bar + 1);
            elements.pop();
            (
                elements,
                Resolver::resolve(operators, tail, ARGUMENT_PRIORITY, span.clone())?,
            )
        }
        None => (
            items,
            Term::Atom {
                name: Name::new(EMPTY_LIST, span.end..span.end),
            },
        ),
    };

    Ok(arguments(operators, elements, span)?
        .into_iter()
        .rev()
        .fold(tail, |tail, head| Term::list(head, tail)))
}

fn items(operators: Rc<OperatorTable>) -> impl Parser<Token, Vec<Item>, Error = Simple<Token>> + Clone {
    recursive(move |items| {
        let term = items.clone().try_map({
            let operators = operators.clone();
            move |items, span| Resolver::resolve(&operators, items, MAX_PRIORITY, span)
        });

        let functor = filter_map(|span: Span, token: Token| match token {
            Token::Functor(name) => Ok(Name::new(name, span)),
            _ => Err(Simple::expected_input_found(span, Vec::new(), Some(token))),
        });

        let compound = functor
            .then(
                items
                    .clone()
                    .try_map({
                        let operators = operators.clone();
                        move |items, span| arguments(&operators, items, span)
                    })
                    .or_not(),
            )
            .then_ignore(just(Token::Close))
            .map(|(name, terms)| Term::Callable {
                name,
                terms: TermList::from(terms.unwrap_or_default()),
            })
            .labelled("structure");

        let parenthesised = term
            .clone()
            .delimited_by(just(Token::Open), just(Token::Close));

        let curly = term
            .delimited_by(just(Token::OpenCurly), just(Token::CloseCurly))
            .map_with_span(|term, span| Term::Callable {
                name: Name::new(CURLY_BRACKETS, span),
                terms: TermList::from([term]),
            });

        let list = items
            .delimited_by(just(Token::OpenList), just(Token::CloseList))
            .try_map({
                let operators = operators.clone();
                move |items, span| list(&operators, items, span)
            })
            .labelled("list");

        let variable = filter_map(|span: Span, token: Token| match token {
            Token::Variable(name) => Ok(Term::Variable {
                name: Name::new(name, span),
            }),
            _ => Err(Simple::expected_input_found(span, Vec::new(), Some(token))),
        })
        .labelled("variable");

        let number = filter_map(|span: Span, token: Token| match token {
            Token::Number(value) => Ok(Term::Number { value }),
            _ => Err(Simple::expected_input_found(span, Vec::new(), Some(token))),
        })
        .labelled("number");

        let operand = choice((compound, parenthesised, curly, list, variable, number))
            .map_with_span(|term, span| Item::Term { term, span });

        let name = filter_map(|span: Span, token: Token| match token {
            Token::Name(name) => Ok(Item::Name(Name::new(name, span))),
            _ => Err(Simple::expected_input_found(span, Vec::new(), Some(token))),
        });

        let comma = just(Token::Comma).map_with_span(|_, span| Item::Comma(span));
        let bar = just(Token::Bar).map_with_span(|_, span| Item::Bar(span));

        choice((operand, name, comma, bar)).repeated().at_least(1)
    })
}

fn clause(operators: Rc<OperatorTable>) -> impl Parser<Token, Term, Error = Simple<Token>> {
    items(operators.clone())
        .try_map(move |items, span| Resolver::resolve(&operators, items, MAX_PRIORITY, span))
        .then_ignore(just(Token::End))
        .then_ignore(end())
        .labelled("term")
}

/// Reads terms one at a time from a source, each terminated by `.`
pub struct TermParser {
    id: ArcStr,
    source: ArcStr,
    operators: Rc<OperatorTable>,
    tokens: std::vec::IntoIter<(Token, Span)>,
    lexer_errors: Option<Vec<Simple<char>>>,
}

impl TermParser {
    pub fn new(id: ArcStr, source: ArcStr, operators: OperatorTable) -> Self {
        let (tokens, lexer_errors) = match lexer().parse(source.as_str()) {
            Ok(tokens) => (tokens, None),
            Err(errors) => (Vec::new(), Some(errors)),
        };

        Self {
            id,
            source,
            operators: Rc::new(operators),
            tokens: tokens.into_iter(),
            lexer_errors,
        }
    }

    pub fn from_file(path: PathBuf, operators: OperatorTable) -> Result<Self, ParseErrorReport> {
        let source = std::fs::read_to_string(&path)
            .map_err(|error| ParseErrorReport::FailedToOpenFile {
                path: path.clone(),
                error,
            })?;

        Ok(Self::new(
            arcstr::format!("{}", path.display()),
            source.into(),
            operators,
        ))
    }

    fn report(&self, errors: impl IntoIterator<Item = SingleParseError>) -> ParseErrorReport {
        ParseErrorReport::ParseError {
            id: self.id.clone(),
            source: self.source.clone(),
            errors: errors.into_iter().collect(),
        }
    }

    fn end_of_input(&self) -> Span {
        let end = self.source.chars().count();
        end..end
    }
}

impl Iterator for TermParser {
    type Item = Result<Term, ParseErrorReport>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(errors) = self.lexer_errors.take() {
            return Some(Err(self.report(
                errors
                    .into_iter()
                    .map(|error| error.map(|c| c.to_string())),
            )));
        }

        let mut tokens = Vec::new();

        for (token, span) in self.tokens.by_ref() {
            let is_end = token == Token::End;
            tokens.push((token, span));
            if is_end {
                break;
            }
        }

        if tokens.is_empty() {
            return None;
        }

        let end_of_input = self.end_of_input();

        let term = clause(self.operators.clone())
            .parse(Stream::from_iter(end_of_input, tokens.into_iter()))
            .map_err(|errors| {
                self.report(
                    errors
                        .into_iter()
                        .map(|error| error.map(|token| token.to_string())),
                )
            });

        if let Ok(term) = &term {
            log::debug!("Parsed {term}");
        }

        Some(term)
    }
}

/// Parses a source containing exactly one term
pub fn parse_term(
    id: ArcStr,
    source: ArcStr,
    operators: OperatorTable,
) -> Result<Term, ParseErrorReport> {
    let mut parser = TermParser::new(id, source, operators);

    let term = match parser.next() {
        Some(term) => term?,
        None => {
            return Err(parser.report([Simple::custom(
                parser.end_of_input(),
                "Expected a term",
            )]))
        }
    };

    match parser.next() {
        None => Ok(term),
        Some(Err(error)) => Err(error),
        Some(Ok(extra)) => Err(parser.report([Simple::custom(
            parser.end_of_input(),
            format!("Expected a single term, found {extra} as well"),
        )])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(source: &str) -> Vec<String> {
        TermParser::new(
            arcstr::literal!("<test>"),
            source.into(),
            OperatorTable::default(),
        )
        .map(|term| term.map(|term| term.to_string()))
        .collect::<Result<_, _>>()
        .unwrap()
    }

    fn parse_one(source: &str) -> String {
        parse_term(
            arcstr::literal!("<test>"),
            source.into(),
            OperatorTable::default(),
        )
        .unwrap()
        .to_string()
    }

    fn fails(source: &str) -> bool {
        parse_term(
            arcstr::literal!("<test>"),
            source.into(),
            OperatorTable::default(),
        )
        .is_err()
    }

    #[test]
    fn structures() {
        assert_eq!(parse_one("p(Z,h(Z,W),f(W))."), "p(Z, h(Z, W), f(W))");
        assert_eq!(parse_one("a()."), "a()");
        assert_eq!(parse_one("a."), "a");
        assert_eq!(parse_one("X."), "X");
        assert_eq!(parse_one("_G1."), "_G1");
        assert_eq!(parse_one("'hello world'(X)."), "'hello world'(X)");
        assert_eq!(parse_one("'it''s'."), "'it\\'s'");
    }

    #[test]
    fn atoms_and_variables() {
        let term = parse_term(
            arcstr::literal!("<test>"),
            "f(a, X, [], 3.25).".into(),
            OperatorTable::default(),
        )
        .unwrap();

        let Term::Callable { terms, .. } = term else {
            panic!("Expected a callable");
        };

        assert!(matches!(&terms[0], Term::Atom { name } if name.as_ref() == "a"));
        assert!(matches!(&terms[1], Term::Variable { name } if name.as_ref() == "X"));
        assert!(matches!(&terms[2], Term::Atom { name } if name.as_ref() == "[]"));
        assert!(matches!(&terms[3], Term::Number { value } if value.to_string() == "3.25"));
    }

    #[test]
    fn operators() {
        assert_eq!(parse_one("a - b - c."), "-(-(a, b), c)");
        assert_eq!(parse_one("a ^ b ^ c."), "^(a, ^(b, c))");
        assert_eq!(parse_one("a + b * c."), "+(a, *(b, c))");
        assert_eq!(parse_one("(a + b) * c."), "*(+(a, b), c)");
        assert_eq!(
            parse_one("p(X) :- q(X), \\+ r(X)."),
            ":-(p(X), ','(q(X), \\+(r(X))))"
        );
        assert_eq!(parse_one(":- a."), ":-(a)");
        assert_eq!(parse_one("X = f(- a)."), "=(X, f(-(a)))");
        assert_eq!(parse_one("f(+, -)."), "f(+, -)");
    }

    #[test]
    fn negative_numbers() {
        assert_eq!(parse_one("-1."), "-1");
        assert_eq!(parse_one("- 1."), "-(1)");
        assert_eq!(parse_one("a-1."), "-(a, 1)");
        assert_eq!(parse_one("f(-2.5)."), "f(-2.5)");
        assert_eq!(parse_one("-(1)."), "-(1)");
    }

    #[test]
    fn lists_and_curly_terms() {
        assert_eq!(parse_one("[a]."), "'.'(a, [])");
        assert_eq!(parse_one("[a, b | T]."), "'.'(a, '.'(b, T))");
        assert_eq!(parse_one("[ ]."), "[]");
        assert_eq!(parse_one("{a, b}."), "{}(','(a, b))");
    }

    #[test]
    fn several_terms_and_comments() {
        assert_eq!(
            parse_all("% facts\np(a). /* block\ncomment */ q(b).\nr.% trailing\ns."),
            ["p(a)", "q(b)", "r", "s"]
        );
        assert_eq!(parse_all("  \n% nothing here\n"), Vec::<String>::new());
    }

    #[test]
    fn custom_operator_table() {
        let mut operators = OperatorTable::empty();
        operators.add(700, super::super::operators::OperatorType::Xfx, "likes");

        let term = parse_term(
            arcstr::literal!("<test>"),
            "alice likes bob.".into(),
            operators,
        )
        .unwrap();

        assert_eq!(term.to_string(), "likes(alice, bob)");
        assert!(fails("alice likes bob."));
    }

    #[test]
    fn syntax_errors() {
        assert!(fails("f(a."));
        assert!(fails("f(a :- b)."));
        assert!(fails("a :- b :- c."));
        assert!(fails("f(a,,b)."));
        assert!(fails("p(a)"));
        assert!(fails("a. b."));
        assert!(fails("'unterminated."));
        assert!(fails(""));
        assert!(fails("a b."));
    }

    #[test]
    fn error_report_mentions_source() {
        let error = parse_term(
            arcstr::literal!("<query>"),
            "f(a.".into(),
            OperatorTable::default(),
        )
        .unwrap_err();

        let report = error.to_string();
        assert!(report.contains("<query>"), "{report}");
    }
}
