//! Fragmentos de código foráneo.
//!
//! Condiciones, cuerpos de estado, bloques `decl` y funciones de
//! tiempo se escriben en C y el compilador no los interpreta. Aun
//! así, hay dos operaciones que requieren un conocimiento mínimo
//! de la sintaxis léxica de C:
//!
//! - Balancear delimitadores durante el análisis léxico. Una llave
//!   dentro de un literal de cadena o de un comentario no debe
//!   cerrar el fragmento.
//! - Encontrar identificadores durante el análisis semántico, para
//!   resolver referencias a variables y a los accesores de `this`.
//!
//! Ambas se construyen sobre [`Cursor`].

use crate::source::Position;
use std::{ops::Range, rc::Rc};

/// Texto verbatim de un fragmento junto a la posición de su primer carácter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    text: Rc<str>,
    origin: Position,
}

impl Fragment {
    pub fn new<S: Into<Rc<str>>>(text: S, origin: Position) -> Self {
        Fragment {
            text: text.into(),
            origin,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Posición en el archivo fuente del primer carácter del texto.
    pub fn origin(&self) -> Position {
        self.origin
    }

    /// Descompone el texto en lexemas de C.
    pub fn lexemes(&self) -> Vec<Lexeme<'_>> {
        scan(&self.text, self.origin)
    }
}

/// Contexto léxico de C en el que se encuentra un carácter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    Code,
    Slash,
    LineComment,
    BlockComment,
    BlockStar,
    Literal(char),
    Escape(char),
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Code
    }
}

/// Seguimiento carácter por carácter de literales y comentarios de C.
#[derive(Clone, Debug, Default)]
pub struct Cursor {
    mode: Mode,
}

impl Cursor {
    /// Avanza un carácter. Retorna `true` si el carácter es código
    /// "vivo", es decir, no pertenece a un literal ni a un comentario.
    pub fn feed(&mut self, c: char) -> bool {
        use Mode::*;

        let (mode, live) = match (self.mode, c) {
            (Code, '"') | (Code, '\'') => (Literal(c), false),
            (Code, '/') => (Slash, true),
            (Code, _) => (Code, true),

            (Slash, '/') => (LineComment, false),
            (Slash, '*') => (BlockComment, false),
            (Slash, _) => {
                // El `/` anterior era un operador, se reprocesa el carácter
                self.mode = Code;
                return self.feed(c);
            }

            (LineComment, '\n') => (Code, true),
            (LineComment, _) => (LineComment, false),

            (BlockComment, '*') => (BlockStar, false),
            (BlockComment, _) => (BlockComment, false),
            (BlockStar, '/') => (Code, false),
            (BlockStar, '*') => (BlockStar, false),
            (BlockStar, _) => (BlockComment, false),

            (Literal(quote), '\\') => (Escape(quote), false),
            (Literal(quote), c) if c == quote => (Code, false),
            (Literal(quote), _) => (Literal(quote), false),
            (Escape(quote), _) => (Literal(quote), false),
        };

        self.mode = mode;
        live
    }
}

/// Indica si el texto termina dentro de un comentario `//` abierto.
///
/// Lo que se escriba a continuación en la misma línea quedaría comentado.
pub fn ends_in_line_comment(text: &str) -> bool {
    let mut cursor = Cursor::default();
    text.chars().for_each(|c| {
        cursor.feed(c);
    });

    cursor.mode == Mode::LineComment
}

/// Unidad léxica mínima dentro de un fragmento.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LexemeKind<'a> {
    /// Identificador de C.
    Word(&'a str),

    /// Constante numérica, incluyendo sufijos y prefijos.
    Number,

    /// Cualquier otro carácter visible.
    Punct(char),
}

/// Lexema junto a su rango de bytes y posición en el fuente.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lexeme<'a> {
    pub kind: LexemeKind<'a>,
    pub span: Range<usize>,
    pub position: Position,
}

fn scan(text: &str, origin: Position) -> Vec<Lexeme<'_>> {
    let mut cursor = Cursor::default();
    let mut lexemes = Vec::new();
    let mut position = origin;

    // Inicio de la palabra en curso (offset, posición, primer carácter)
    let mut word: Option<(usize, Position, char)> = None;

    for (offset, c) in text.char_indices() {
        let live = cursor.feed(c);
        let continues_word = live && (c.is_ascii_alphanumeric() || c == '_');

        if !continues_word {
            if let Some((start, at, first)) = word.take() {
                lexemes.push(word_lexeme(text, start..offset, at, first));
            }
        }

        if continues_word {
            word.get_or_insert((offset, position, c));
        } else if live && !c.is_whitespace() {
            lexemes.push(Lexeme {
                kind: LexemeKind::Punct(c),
                span: offset..offset + c.len_utf8(),
                position,
            });
        }

        position = position.after(c);
    }

    if let Some((start, at, first)) = word {
        lexemes.push(word_lexeme(text, start..text.len(), at, first));
    }

    lexemes
}

fn word_lexeme(text: &str, span: Range<usize>, position: Position, first: char) -> Lexeme<'_> {
    let kind = if first.is_ascii_digit() {
        LexemeKind::Number
    } else {
        LexemeKind::Word(&text[span.clone()])
    };

    Lexeme {
        kind,
        span,
        position,
    }
}
