//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto fuente
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios se descartan durante esta operación. Cada
//! token emitido esta asociado a una ubicación en el código fuente original,
//! lo cual permite rastrear errores en tanto los mismos como constructos
//! más elevados de fases posteriores.
//!
//! # Fragmentos
//! Donde la gramática espera código C (condiciones, cuerpos de estado,
//! expresiones de salida, `decl`, `time` y `period`) el lexer cambia a un
//! modo de conteo de delimitadores y emite todo el contenido entre el
//! delimitador de apertura y su pareja como un único [`Token::Fragment`].
//! El lexer sabe cuándo ocurre esto porque lleva un [`Context`] mínimo
//! derivado de los tokens que ya emitió; la gramática es lo
//! suficientemente regular como para que esto baste.
//!
//! # Errores
//! El lexer es capaz de recuperarse parcialmente de condiciones de error.
//! Esto ocurre en suficiente grado como para reportar más de un error por
//! ejecución, pero no lo suficiente como para permitir el avance a las
//! demás fases de la compilación.

use crate::{
    fragment::{Cursor, Fragment},
    source::{self, Located, Location, Position, Source},
};

use std::{
    borrow::Borrow,
    fmt::{self, Display},
    iter::Peekable,
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Se esperaba un carácter específico en esta posición.
    #[error("Expected {0:?}")]
    Expected(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, {}]", u32::MAX)]
    IntOverflow,

    /// El archivo terminó antes de cerrar un fragmento de código.
    #[error("Unterminated code fragment, missing closing {0:?}")]
    UnterminatedFragment(char),
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(u32),

    /// Código C opaco, sin sus delimitadores.
    Fragment(Fragment),

    /// `,`
    Comma,

    /// `.`
    Dot,

    /// `;`
    Semicolon,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,

    /// `*`, solo válido en el tipo de una variable
    Star,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            Fragment(_) => fmt.write_str("code fragment"),
            Comma => fmt.write_str("`,`"),
            Dot => fmt.write_str("`.`"),
            Semicolon => fmt.write_str("`;`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseCurly => fmt.write_str("`}`"),
            OpenSquare => fmt.write_str("`[`"),
            CloseSquare => fmt.write_str("`]`"),
            Star => fmt.write_str("`*`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Fsm,
    State,
    On,
    Go,
    Err,
    Retry,
    Until,
    Var,
    Input,
    Output,
    Timer,
    Decl,
    Time,
    Period,
    Start,
    Timeout,
    Out,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("fsm",     Keyword::Fsm),
    ("state",   Keyword::State),
    ("on",      Keyword::On),
    ("go",      Keyword::Go),
    ("err",     Keyword::Err),
    ("retry",   Keyword::Retry),
    ("until",   Keyword::Until),
    ("var",     Keyword::Var),
    ("input",   Keyword::Input),
    ("output",  Keyword::Output),
    ("timer",   Keyword::Timer),
    ("decl",    Keyword::Decl),
    ("time",    Keyword::Time),
    ("period",  Keyword::Period),
    ("start",   Keyword::Start),
    ("timeout", Keyword::Timeout),
    ("out",     Keyword::Out),
];

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = KEYWORDS
            .iter()
            .find(|&&(_, keyword)| keyword == *self)
            .map(|&(name, _)| name)
            .unwrap_or("?");

        fmt.write_str(name)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, ()> {
        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Construcción gramatical en la que se encuentra el lexer.
///
/// Determina si un `{` o un `(` abre un fragmento de código o si
/// es simple puntuación.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Context {
    /// Puntuación ordinaria.
    Plain,

    /// Tras `decl`, `time` o `period`.
    Body,

    /// Dentro de `var`, `input` u `output`, hasta `;`.
    Declaration,

    /// Tras `state`, hasta el código de entrada o la siguiente palabra clave.
    Header,

    /// Inmediatamente tras `on`.
    Condition,

    /// Resto de una transición, hasta `;`.
    Transition,

    /// Dentro de una lista `out`, hasta `;`.
    Out,
}

impl Context {
    /// Si `c` abre un fragmento en este contexto, retorna su cierre.
    fn fragment_close(self, c: char) -> Option<char> {
        use Context::*;

        match (self, c) {
            (Body, '{') | (Declaration, '{') | (Header, '{') | (Transition, '{') => Some('}'),
            (Condition, '(') | (Out, '(') => Some(')'),
            _ => None,
        }
    }

    /// Contexto que sigue a la emisión de un token.
    fn after(self, token: &Token) -> Context {
        use Context::*;

        match token {
            Token::Keyword(Keyword::Decl | Keyword::Time | Keyword::Period) => Body,
            Token::Keyword(Keyword::Var | Keyword::Input | Keyword::Output) => Declaration,
            Token::Keyword(Keyword::State) => Header,
            Token::Keyword(Keyword::On) => Condition,
            Token::Keyword(Keyword::Out) => Out,
            Token::Keyword(Keyword::Fsm | Keyword::Timer | Keyword::Until) => Plain,
            Token::Semicolon | Token::CloseCurly => Plain,

            Token::Fragment(_) => match self {
                Body | Header => Plain,
                Condition => Transition,
                other => other,
            },

            _ => match self {
                Condition => Transition,
                other => other,
            },
        }
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: Peekable<S>,
    origin: Rc<Source>,
    state: State,
    context: Context,
    start: Position,
    last: Position,
    next: Position,
}

/// Fragmento en construcción.
struct Pending {
    open: char,
    close: char,
    depth: u32,
    cursor: Cursor,
    text: String,
    origin: Position,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de error.
    Error,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Se encontró `/`.
    ///
    /// Debería seguir otro `/` para entrar en un comentario.
    Slash,

    /// Comentario de línea.
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`.
    Comment,

    /// Constante entera.
    ///
    /// Este estado incluirá dígitos en el token mientras que
    /// el siguiente carácter sea un dígito.
    Integer(u32),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),

    /// Fragmento de código, hasta balancear su delimitador.
    Balancing(Box<Pending>),
}

impl<S: Iterator<Item = (char, Position)>> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(origin: &Rc<Source>, source: S) -> Self {
        Lexer {
            source: source.peekable(),
            origin: Rc::clone(origin),
            state: State::Start,
            context: Context::Plain,
            start: Position::default(),
            last: Position::default(),
            next: Position::default(),
        }
    }

    /// Reduce la entrada a sea una secuencia conocida de tokens
    /// infalibles o una secuencia de errores.
    ///
    /// En caso de que ocurra al menos un error, el lexer dejará
    /// de buscar tokens exitosos y comenzará a acumular solamente
    /// errores. El propósito de esta función es permitir la
    /// recolección de múltiples errores léxicos en una misma ejecución
    /// del compilador.
    pub fn try_exhaustive(mut self) -> Result<Vec<Located<Token>>, Vec<Located<LexerError>>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => {
                    drop(tokens);

                    let mut errors = vec![error];
                    errors.extend(self.filter_map(Result::err));

                    return Err(errors);
                }
            }
        }

        Ok(tokens)
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Token>, LexerError> {
        use {State::*, Token::*};

        let token = loop {
            let (next_char, here) = match self.source.peek() {
                Some(&(c, at)) => (Some(c), at),
                None => (None, self.next),
            };

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = here;
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                // Condiciones de error: se descarta la línea donde
                // ocurrió el error. Al llegar al final de la línea
                // el lexer se recupera y reinicia.
                (Error, None) => return Ok(None),
                (Error, Some('\n')) => self.state = Start,
                (Error, Some(_)) => (),

                // Apertura de un fragmento según el contexto gramatical
                (Start, Some(c)) if self.context.fragment_close(c).is_some() => {
                    let close = self.context.fragment_close(c).unwrap_or(c);
                    self.state = Balancing(Box::new(Pending {
                        open: c,
                        close,
                        depth: 1,
                        cursor: Cursor::default(),
                        text: String::new(),
                        origin: here.after(c),
                    }));
                }

                // Tokens triviales
                (Start, None) => return Ok(None),
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some('.')) => self.state = Complete(Dot),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some('[')) => self.state = Complete(OpenSquare),
                (Start, Some(']')) => self.state = Complete(CloseSquare),
                (Start, Some('*')) => self.state = Complete(Star),
                (Start, Some('/')) => self.state = Slash,

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                // Inicio de una constante numérica. No se consume
                // el entero, ya que esta lógica ya está implementada
                // en el respectivo caso para un estado de constante
                // entera para el cual el siguiente carácter es un
                // dígito. Por tanto, la constante es inicialmente cero.
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(0);
                    continue;
                }

                // Espacios en blanco y caracteres inesperados
                (Start, Some(c)) if c.is_whitespace() => (),
                (Start, Some(c)) => break Err(LexerError::BadChar(c)),

                // Emisión retardada de tokens cualesquiera
                (Complete(value), _) => break Ok(std::mem::replace(value, Comma)),

                // `/` siempre debería iniciar un comentario de la forma `//`
                (Slash, Some('/')) => self.state = Comment,
                (Slash, _) => break Err(LexerError::Expected('/')),

                // Los comentarios descartan la línea donde ocurren
                (Comment, Some('\n')) => self.state = Start,
                (Comment, Some(_)) => (),
                (Comment, None) => self.state = Start,

                // Acumulación dígito por dígito de constantes enteras
                (Integer(accumulated), Some(digit)) if digit.is_ascii_digit() => {
                    let digit = digit as u32 - '0' as u32;

                    match accumulated
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(digit))
                    {
                        Some(result) => *accumulated = result,
                        None => break Err(LexerError::IntOverflow),
                    }
                }

                // Si sigue algo que no es un dígito, la constante a terminado
                (Integer(integer), _) => break Ok(IntLiteral(*integer)),

                // Extensión de términos
                (Word(word), Some(c)) if c.is_ascii_alphanumeric() || c == '_' => {
                    word.push(c);
                }

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => match self::Keyword::from_str(word) {
                    Ok(keyword) => break Ok(Keyword(keyword)),
                    Err(()) => break Ok(Id(Identifier(Rc::from(word.as_str())))),
                },

                // Los fragmentos se copian verbatim hasta balancear
                (Balancing(pending), None) => {
                    break Err(LexerError::UnterminatedFragment(pending.close))
                }

                (Balancing(pending), Some(c)) => {
                    if pending.cursor.feed(c) {
                        if c == pending.open {
                            pending.depth += 1;
                        } else if c == pending.close {
                            pending.depth -= 1;
                        }
                    }

                    if pending.depth == 0 {
                        let text = std::mem::take(&mut pending.text);
                        let fragment = self::Fragment::new(text, pending.origin);
                        self.state = Complete(Token::Fragment(fragment));
                    } else {
                        pending.text.push(c);
                    }
                }
            }

            // Si no hubo `continue` ni `break`, aquí se consume el
            // carácter que se observó con lookahead anteriormente
            if let Some((c, at)) = self.source.next() {
                self.last = at;
                self.next = at.after(c);
            }
        };

        token.map(Some)
    }
}

impl<S: Iterator<Item = (char, Position)>> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => None,
            Ok(Some(token)) => {
                self.state = State::Start;
                self.context = self.context.after(&token);

                let end = self.last.advance().max(self.start.advance());
                let location = Location::range(&self.origin, self.start..end);
                Some(Ok(Located::at(token, location)))
            }

            Err(error) => {
                self.state = State::Error;
                self.context = Context::Plain;
                Some(Err(Located::at(error, Location::point(&self.origin, self.start))))
            }
        }
    }
}

/// Análisis léxico completo de un código fuente.
pub fn tokenize(source: &Rc<Source>) -> Result<Vec<Located<Token>>, Vec<Located<LexerError>>> {
    let tokens = Lexer::new(source, source::consume(source)).try_exhaustive()?;
    log::debug!("{}: {} tokens", source.name(), tokens.len());

    Ok(tokens)
}
