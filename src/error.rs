//! Diagnósticos.
//!
//! Cada fase del compilador produce errores propios, siempre con una
//! ubicación asociada. Aquí se agrupan en un solo lote, junto con las
//! advertencias, y se presentan al estilo de `rustc`: mensaje, ubicación,
//! la línea de código fuente y una marca bajo el rango señalado.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Debug, Display},
};

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Display for Severity {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => fmt.write_str("error"),
            Severity::Warning => fmt.write_str("warning"),
        }
    }
}

/// Fase que originó un diagnóstico.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    Lexical,
    Syntax,
    Semantic,
}

impl Display for Kind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Lexical => fmt.write_str("lexical"),
            Kind::Syntax => fmt.write_str("syntax"),
            Kind::Semantic => fmt.write_str("semantic"),
        }
    }
}

pub struct Diagnostic {
    severity: Severity,
    kind: Kind,
    error: Box<dyn 'static + LocatedError>,
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn message(&self) -> String {
        self.error.source().to_string()
    }

    pub fn location(&self) -> &Location {
        self.error.location()
    }

    pub fn line(&self) -> u32 {
        self.location().start().line()
    }

    pub fn column(&self) -> u32 {
        self.location().start().column()
    }
}

#[derive(Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Construye un lote de errores provenientes de una misma fase.
    pub fn rejected<E: 'static + Error>(kind: Kind, errors: Vec<Located<E>>) -> Self {
        let mut diagnostics = Diagnostics::default();
        diagnostics.report(Severity::Error, kind, errors);

        diagnostics
    }

    pub fn report<E: 'static + Error>(&mut self, severity: Severity, kind: Kind, errors: Vec<Located<E>>) {
        self.entries.extend(errors.into_iter().map(|error| {
            let error: Box<dyn LocatedError> = Box::new(error);
            Diagnostic { severity, kind, error }
        }));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|entry| entry.severity == severity).count()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for entry in &self.entries {
            writeln!(fmt, "{}[{}]: {}", entry.severity, entry.kind, entry.message())?;
            snippet(fmt, entry.location())?;
            writeln!(fmt)?;
        }

        let (errors, warnings) = (self.errors(), self.warnings());
        let plural = |count: usize, what: &str| {
            if count == 1 {
                format!("{} {}", count, what)
            } else {
                format!("{} {}s", count, what)
            }
        };

        if errors > 0 {
            writeln!(fmt, "Build failed with {}", plural(errors, "error"))
        } else {
            writeln!(fmt, "Build succeeded with {}", plural(warnings, "warning"))
        }
    }
}

impl Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_list()
            .entries(self.entries.iter().map(|entry| {
                format!("{} {}: {}", entry.severity, entry.location(), entry.message())
            }))
            .finish()
    }
}

/// Muestra la primera línea de una ubicación y marca el rango cubierto.
///
/// Si el rango abarca varias líneas se marca hasta el final de la primera.
fn snippet(fmt: &mut fmt::Formatter<'_>, location: &Location) -> fmt::Result {
    writeln!(fmt, " --> {}", location)?;

    let (start, end) = (location.start(), location.end());
    let digits = start.line().to_string().len();

    writeln!(fmt, "{:digits$} |", "", digits = digits)?;

    location.source().with_line(start.line(), |line| {
        writeln!(fmt, "{:>digits$} | {}", start.line(), line, digits = digits)?;

        let skip = start.column().saturating_sub(1) as usize;
        let highlight = if end.line() == start.line() {
            end.column().saturating_sub(start.column()).max(1) as usize
        } else {
            line.chars().count().saturating_sub(skip).max(1)
        };

        writeln!(
            fmt,
            "{:digits$} | {:skip$}{:^<highlight$}",
            "",
            "",
            "",
            digits = digits,
            skip = skip,
            highlight = highlight
        )
    })
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Position, Source};
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("Something is off with `{0}`")]
    struct Oops(&'static str);

    #[test]
    fn renders_snippet() {
        let source = Source::new("door.fsml", "fsm door {\n    state [start] closed\n}");
        let location = Location::range(&source, Position::new(2, 19)..Position::new(2, 25));

        let mut diagnostics = Diagnostics::rejected(Kind::Semantic, vec![Located::at(Oops("closed"), location)]);
        let warning = Located::at(Oops("door"), Location::point(&source, Position::new(1, 5)));
        diagnostics.report(Severity::Warning, Kind::Semantic, vec![warning]);

        let expected = "\
error[semantic]: Something is off with `closed`
 --> door.fsml:[2:19-2:24]
  |
2 |     state [start] closed
  |                   ^^^^^^

warning[semantic]: Something is off with `door`
 --> door.fsml:1:5
  |
1 | fsm door {
  |     ^

Build failed with 1 error
";

        assert_eq!(diagnostics.to_string(), expected);
        assert_eq!((diagnostics.errors(), diagnostics.warnings()), (1, 1));
    }

    #[test]
    fn structured_entries() {
        let source = Source::new("m.fsml", "fsm m { }");
        let location = Location::point(&source, Position::new(1, 5));
        let diagnostics = Diagnostics::rejected(Kind::Syntax, vec![Located::at(Oops("m"), location)]);

        let entry = diagnostics.iter().next().unwrap();
        assert_eq!(entry.severity(), Severity::Error);
        assert_eq!(entry.kind(), Kind::Syntax);
        assert_eq!((entry.line(), entry.column()), (1, 5));
        assert_eq!(entry.message(), "Something is off with `m`");
    }
}
