//! Análisis sintáctico.
//!
//! Parser descendente recursivo con un token de lookahead. Las
//! construcciones opcionales (lista de banderas de un estado, código
//! de transición, `start(...)`) se prueban sobre una copia del parser
//! y solo se confirman si tienen éxito; ver [`Parser::attempt()`].
//!
//! Los errores dentro de la lista de miembros de un bloque `fsm` o
//! `until` se registran y el parser se resincroniza en el siguiente
//! `state`, `until`, declaración o `}`. Los errores a nivel de programa
//! detienen el análisis de inmediato.

use std::{
    fmt::{self, Display},
    iter::Peekable,
    marker::PhantomData,
};

use thiserror::Error;

use crate::{
    fragment::Fragment,
    lex::{Identifier, Keyword, Token},
    source::{Located, Location},
};

#[derive(Debug)]
pub struct Program {
    pub decl: Option<Located<Fragment>>,
    pub clock: Option<Located<Clock>>,
    pub fsm: Fsm,
}

/// Fuente de tiempo para temporizadores.
#[derive(Debug)]
pub enum Clock {
    /// Cuerpo de una función que retorna el tiempo actual.
    Time(Fragment),

    /// Cuerpo de una función que retorna el tiempo transcurrido por paso.
    Period(Fragment),
}

#[derive(Debug)]
pub struct Fsm {
    pub name: Located<Identifier>,
    pub variables: Vec<Variable>,
    pub timers: Vec<Timer>,
    pub items: Vec<Item>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Family {
    Var,
    Input,
    Output,
}

#[derive(Debug)]
pub struct Variable {
    pub family: Located<Family>,
    pub ty: Located<String>,
    pub name: Located<Identifier>,
    pub init: Located<Fragment>,
}

#[derive(Debug)]
pub struct Timer {
    pub name: Located<Identifier>,
    pub duration: Located<Constant>,
}

/// Constante entera, literal o nombrada (típicamente un `#define` de `decl`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Constant {
    Integer(u32),
    Named(Identifier),
}

#[derive(Debug)]
pub enum Item {
    State(State),
    Until(Until),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flag {
    Start,
    End,
    Err,
}

#[derive(Debug)]
pub struct State {
    pub name: Located<Identifier>,
    pub flags: Vec<Located<Flag>>,
    pub entry: Option<Located<Fragment>>,
    pub transitions: Vec<Transition>,
    pub outputs: Vec<Output>,
}

#[derive(Debug)]
pub struct Transition {
    pub condition: Located<Condition>,
    pub code: Option<Located<Fragment>>,
    pub actuator: Located<Actuator>,
    pub start: Option<Located<Identifier>>,
}

#[derive(Debug)]
pub enum Condition {
    Code(Fragment),
    Timeout(Located<Identifier>),
}

#[derive(Debug)]
pub enum Actuator {
    Go(Located<Identifier>),
    Err(Located<Identifier>),
    Retry,
}

#[derive(Debug)]
pub struct Output {
    pub variable: Located<Identifier>,
    pub value: Located<Fragment>,
}

#[derive(Debug)]
pub struct Until {
    pub keyword: Location,
    pub bound: Located<Constant>,
    pub states: Vec<State>,
    pub overflow: Located<Actuator>,
}

impl Display for Family {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Var => fmt.write_str("var"),
            Family::Input => fmt.write_str("input"),
            Family::Output => fmt.write_str("output"),
        }
    }
}

impl Display for Flag {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::Start => fmt.write_str("start"),
            Flag::End => fmt.write_str("end"),
            Flag::Err => fmt.write_str("err"),
        }
    }
}

impl Fsm {
    /// Todos los estados en orden de declaración, incluyendo los
    /// que se encuentran dentro de bloques `until`.
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.items.iter().flat_map(|item| match item {
            Item::State(state) => std::slice::from_ref(state),
            Item::Until(until) => until.states.as_slice(),
        })
    }
}

#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ParserError {
    #[error("Expected token {0}, found {1} instead")]
    UnexpectedToken(Token, Token),

    #[error("Expected token {0}, none was found instead")]
    MissingToken(Token),

    #[error("Expected {0}, found {1} instead")]
    Expected(&'static str, Token),

    #[error("Expected state flag `start`, `end` or `err`, found {0} instead")]
    ExpectedFlag(Token),

    #[error("Until-block overflow must be `go` or `err`, `retry` is not allowed here")]
    RetryOverflow,

    #[error("Missing type for variable `{0}`")]
    MissingType(Identifier),

    #[error("Variable `{0}` requires an initializer `{{...}}`")]
    MissingInitializer(Identifier),

    #[error("A program defines either `time` or `period`, not both")]
    DuplicateClock,

    #[error("Unexpected {0} after the end of the `fsm` block")]
    TrailingInput(Token),

    #[error("Abrupt end of program")]
    UnexpectedEof,
}

pub fn parse<'a, I>(tokens: I, start: Location) -> Result<Program, Vec<Located<ParserError>>>
where
    I: Iterator<Item = &'a Located<Token>> + Clone,
{
    let mut parser = Parser {
        tokens: tokens.peekable(),
        last_known: start,
        errors: Vec::new(),
        lifetime_hack: PhantomData,
    };

    let result = parser.program();
    let mut errors = parser.errors;

    match result {
        Ok(program) if errors.is_empty() => {
            log::debug!(
                "parsed fsm `{}`: {} items",
                program.fsm.name.as_ref(),
                program.fsm.items.len()
            );

            Ok(program)
        }

        Ok(_) => Err(errors),
        Err(failure) => {
            errors.push(failure.coerce());
            Err(errors)
        }
    }
}

#[derive(Clone)]
struct Parser<'a, I: Iterator<Item = &'a Located<Token>>> {
    tokens: Peekable<I>,
    last_known: Location,
    errors: Vec<Located<ParserError>>,
    lifetime_hack: PhantomData<&'a ()>,
}

enum Failure {
    Weak(Located<ParserError>),
    Strict(Located<ParserError>),
}

impl Failure {
    fn weak(self) -> Self {
        Failure::Weak(self.coerce())
    }

    fn strict(self) -> Self {
        Failure::Strict(self.coerce())
    }

    fn coerce(self) -> Located<ParserError> {
        match self {
            Failure::Weak(error) => error,
            Failure::Strict(error) => error,
        }
    }
}

type Parse<T> = Result<T, Failure>;

impl<'a, I> Parser<'a, I>
where
    I: Iterator<Item = &'a Located<Token>> + Clone,
{
    fn program(&mut self) -> Parse<Program> {
        let decl = self.optional(|s| {
            s.keyword(Keyword::Decl).map_err(Failure::weak)?;
            s.fragment().map_err(Failure::strict)
        })?;

        let clock = self.optional(Parser::clock)?;
        if clock.is_some() && self.optional(Parser::clock)?.is_some() {
            return self.fail(ParserError::DuplicateClock);
        }

        let fsm = self.fsm()?;

        match self.tokens.next() {
            None => Ok(Program { decl, clock, fsm }),
            Some(token) => {
                self.last_known = token.location().clone();
                self.fail(ParserError::TrailingInput(token.val().clone()))
            }
        }
    }

    fn clock(&mut self) -> Parse<Located<Clock>> {
        let (location, token) = self.next().map_err(Failure::weak)?.split();
        let make: fn(Fragment) -> Clock = match token {
            Token::Keyword(Keyword::Time) => Clock::Time,
            Token::Keyword(Keyword::Period) => Clock::Period,
            found => {
                let failure = self.failure(ParserError::Expected("`time` or `period`", found));
                return Err(failure.weak());
            }
        };

        let body = self.fragment().map_err(Failure::strict)?;
        let location = Location::span(location, body.location());

        Ok(Located::at(make(body.into_inner()), location))
    }

    fn fsm(&mut self) -> Parse<Fsm> {
        self.keyword(Keyword::Fsm)?;
        let name = self.id()?;
        self.expect(Token::OpenCurly)?;

        let mut fsm = Fsm {
            name,
            variables: Vec::new(),
            timers: Vec::new(),
            items: Vec::new(),
        };

        loop {
            let result = match self.lookahead(|s| s.next().map(Located::into_inner))? {
                Token::CloseCurly => {
                    self.next()?;
                    break Ok(fsm);
                }

                Token::Keyword(Keyword::Var | Keyword::Input | Keyword::Output) => {
                    self.variable().map(|variable| fsm.variables.push(variable))
                }

                Token::Keyword(Keyword::Timer) => self.timer().map(|timer| fsm.timers.push(timer)),
                Token::Keyword(Keyword::State) => self.state().map(|state| fsm.items.push(Item::State(state))),
                Token::Keyword(Keyword::Until) => self.until().map(|until| fsm.items.push(Item::Until(until))),

                found => {
                    self.next()?;
                    self.fail(ParserError::Expected("`state`, `until`, a declaration or `}`", found))
                }
            };

            if let Err(failure) = result {
                self.recover(failure);
            }
        }
    }

    fn variable(&mut self) -> Parse<Variable> {
        let (location, token) = self.next()?.split();
        let family = match token {
            Token::Keyword(Keyword::Var) => Family::Var,
            Token::Keyword(Keyword::Input) => Family::Input,
            Token::Keyword(Keyword::Output) => Family::Output,
            found => return self.fail(ParserError::Expected("`var`, `input` or `output`", found)),
        };

        let mut words = vec![self.type_word()?];
        while let Some(word) = self.optional(|s| s.type_word().map_err(Failure::weak))? {
            words.push(word);
        }

        // La última palabra es el nombre, las anteriores forman el tipo
        let (name_location, last) = words
            .pop()
            .ok_or_else(|| self.failure(ParserError::UnexpectedEof))?
            .split();

        let name = match last {
            Token::Id(name) => Located::at(name, name_location),
            found => return self.fail(ParserError::Expected("variable name", found)),
        };

        let (first, last) = match (words.first(), words.last()) {
            (Some(first), Some(last)) => (first.location().clone(), last.location()),
            _ => return self.fail(ParserError::MissingType(name.into_inner())),
        };

        let mut ty_text = String::new();
        for word in &words {
            match word.as_ref() {
                Token::Id(id) => {
                    if !ty_text.is_empty() {
                        ty_text.push(' ');
                    }

                    ty_text.push_str(id.as_ref());
                }

                _ => ty_text.push('*'),
            }
        }

        let ty = Located::at(ty_text, Location::span(first, last));

        let init = match self.optional(Parser::fragment)? {
            Some(init) => init,
            None => return self.fail(ParserError::MissingInitializer(name.into_inner())),
        };

        self.expect(Token::Semicolon)?;

        Ok(Variable {
            family: Located::at(family, location),
            ty,
            name,
            init,
        })
    }

    /// Palabra de una declaración de variable: identificador o `*`.
    fn type_word(&mut self) -> Parse<Located<Token>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Id(_) | Token::Star => Ok(Located::at(token, location)),
            found => self.fail(ParserError::Expected("a type or variable name", found)),
        }
    }

    fn timer(&mut self) -> Parse<Timer> {
        self.keyword(Keyword::Timer)?;
        let name = self.id()?;

        self.expect(Token::OpenParen)?;
        let duration = self.constant()?;
        self.expect(Token::CloseParen)?;
        self.expect(Token::Semicolon)?;

        Ok(Timer { name, duration })
    }

    fn state(&mut self) -> Parse<State> {
        self.keyword(Keyword::State)?;

        let flags = self.optional(Parser::flags)?.unwrap_or_default();
        let name = self.id()?;
        let entry = self.optional(Parser::fragment)?;

        let mut transitions = Vec::new();
        let mut outputs = Vec::new();

        loop {
            match self.lookahead(|s| s.next().map(Located::into_inner)) {
                Ok(Token::Keyword(Keyword::On)) => transitions.push(self.transition()?),
                Ok(Token::Keyword(Keyword::Out)) => outputs.extend(self.outputs()?),
                _ => break,
            }
        }

        Ok(State {
            name,
            flags,
            entry,
            transitions,
            outputs,
        })
    }

    fn flags(&mut self) -> Parse<Vec<Located<Flag>>> {
        self.expect(Token::OpenSquare).map_err(Failure::weak)?;
        let flags = self.comma_separated(Parser::flag, false)?;
        self.expect(Token::CloseSquare)?;

        Ok(flags)
    }

    fn flag(&mut self) -> Parse<Located<Flag>> {
        let (location, token) = self.next()?.split();
        let flag = match token {
            Token::Keyword(Keyword::Start) => Flag::Start,
            Token::Keyword(Keyword::Err) => Flag::Err,
            Token::Id(id) if id.as_ref() == "end" => Flag::End,
            found => return self.fail(ParserError::ExpectedFlag(found)),
        };

        Ok(Located::at(flag, location))
    }

    fn transition(&mut self) -> Parse<Transition> {
        self.keyword(Keyword::On)?;

        let condition = self.condition()?;
        let code = self.optional(Parser::fragment)?;
        let actuator = self.actuator()?;

        let start = self.optional(|s| {
            s.keyword(Keyword::Start).map_err(Failure::weak)?;
            s.expect(Token::OpenParen)?;
            let timer = s.id()?;
            s.expect(Token::CloseParen)?;

            Ok(timer)
        })?;

        self.expect(Token::Semicolon)?;

        Ok(Transition {
            condition,
            code,
            actuator,
            start,
        })
    }

    fn condition(&mut self) -> Parse<Located<Condition>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Fragment(fragment) => Ok(Located::at(Condition::Code(fragment), location)),

            Token::Keyword(Keyword::Timeout) => {
                self.expect(Token::OpenParen)?;
                let timer = self.id()?;
                self.expect(Token::CloseParen)?;

                let location = Location::span(location, &self.last_known);
                Ok(Located::at(Condition::Timeout(timer), location))
            }

            found => self.fail(ParserError::Expected("condition `(...)` or `timeout(...)`", found)),
        }
    }

    fn actuator(&mut self) -> Parse<Located<Actuator>> {
        let (location, token) = self.next()?.split();
        let actuator = match token {
            Token::Keyword(Keyword::Go) => Actuator::Go(self.id()?),
            Token::Keyword(Keyword::Err) => Actuator::Err(self.id()?),
            Token::Keyword(Keyword::Retry) => Actuator::Retry,
            found => return self.fail(ParserError::Expected("`go`, `err` or `retry`", found)),
        };

        let location = Location::span(location, &self.last_known);
        Ok(Located::at(actuator, location))
    }

    fn outputs(&mut self) -> Parse<Vec<Output>> {
        self.keyword(Keyword::Out)?;
        let outputs = self.comma_separated(Parser::output, false)?;
        self.expect(Token::Semicolon)?;

        Ok(outputs)
    }

    fn output(&mut self) -> Parse<Output> {
        let variable = self.id().map_err(Failure::weak)?;
        let value = self.fragment()?;

        Ok(Output { variable, value })
    }

    fn until(&mut self) -> Parse<Until> {
        self.keyword(Keyword::Until)?;
        let keyword = self.last_known.clone();

        self.expect(Token::OpenParen)?;
        let bound = self.constant()?;
        self.expect(Token::CloseParen)?;
        self.expect(Token::OpenCurly)?;

        let mut states = Vec::new();
        loop {
            let result = match self.lookahead(|s| s.next().map(Located::into_inner))? {
                Token::CloseCurly => {
                    self.next()?;
                    break;
                }

                Token::Keyword(Keyword::State) => self.state().map(|state| states.push(state)),

                found => {
                    self.next()?;
                    self.fail(ParserError::Expected("`state` or `}`", found))
                }
            };

            if let Err(failure) = result {
                self.recover(failure);
            }
        }

        let overflow = self.actuator()?;
        if let Actuator::Retry = overflow.as_ref() {
            self.last_known = overflow.location().clone();
            return self.fail(ParserError::RetryOverflow);
        }

        self.expect(Token::Semicolon)?;

        Ok(Until {
            keyword,
            bound,
            states,
            overflow,
        })
    }

    fn constant(&mut self) -> Parse<Located<Constant>> {
        let (location, token) = self.next()?.split();
        let constant = match token {
            Token::IntLiteral(integer) => Constant::Integer(integer),
            Token::Id(id) => Constant::Named(id),
            found => return self.fail(ParserError::Expected("integer constant or name", found)),
        };

        Ok(Located::at(constant, location))
    }

    fn fragment(&mut self) -> Parse<Located<Fragment>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Fragment(fragment) => Ok(Located::at(fragment, location)),
            found => self.fail(ParserError::Expected("code fragment", found)).map_err(Failure::weak),
        }
    }

    /// Registra un error y descarta tokens hasta una frontera de miembro.
    fn recover(&mut self, failure: Failure) {
        self.errors.push(failure.coerce());

        while let Some(token) = self.tokens.peek() {
            let boundary = matches!(
                token.as_ref(),
                Token::CloseCurly
                    | Token::Keyword(
                        Keyword::State
                            | Keyword::Until
                            | Keyword::Var
                            | Keyword::Input
                            | Keyword::Output
                            | Keyword::Timer
                    )
            );

            if boundary {
                break;
            }

            self.tokens.next();
        }
    }

    fn optional<T, F>(&mut self, rule: F) -> Parse<Option<T>>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        match self.attempt(rule) {
            Err(Failure::Weak(_)) => Ok(None),
            result => Ok(Some(result?)),
        }
    }

    fn attempt<T, F>(&mut self, rule: F) -> Parse<T>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        let mut fork = self.clone();

        let result = rule(&mut fork);
        if result.is_ok() {
            *self = fork;
        }

        result
    }

    fn lookahead<T, F>(&mut self, rule: F) -> Parse<T>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        rule(&mut self.clone())
    }

    fn comma_separated<T, F>(&mut self, mut rule: F, allow_empty: bool) -> Parse<Vec<T>>
    where
        F: FnMut(&mut Self) -> Parse<T>,
    {
        let mut items = match self.attempt(|s| rule(s)) {
            Err(Failure::Weak(_)) if allow_empty => return Ok(Vec::new()),
            item => vec![item.map_err(Failure::strict)?],
        };

        loop {
            match self.attempt(|s| s.expect(Token::Comma).map_err(Failure::weak)) {
                Err(Failure::Weak(_)) => break Ok(items),
                result => {
                    result?;
                    items.push(rule(self).map_err(Failure::strict)?);
                }
            }
        }
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Id(id) => Ok(Located::at(id, location)),
            found => self.fail(ParserError::Expected("identifier", found)),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        match self.next().map(Located::into_inner) {
            Ok(found) if found == token => Ok(()),
            Ok(found) => self.fail(ParserError::UnexpectedToken(token, found)),
            Err(_) => self.fail(ParserError::MissingToken(token)),
        }
    }

    fn next(&mut self) -> Parse<Located<Token>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                Ok(token.clone())
            }

            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    fn failure(&self, error: ParserError) -> Failure {
        Failure::Strict(Located::at(error, self.last_known.clone()))
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(self.failure(error))
    }
}
