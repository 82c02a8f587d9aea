//! Compilador de FSML a C.
//!
//! FSML describe máquinas de estados finitos de forma declarativa:
//! estados, transiciones con guardas, reintentos acotados y
//! temporizadores. El resultado de compilar es un único archivo C
//! autocontenido, pensado para enlazarse directamente en firmware.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. Los fragmentos de código C
//! incrustados se conservan como tokens opacos, ver [`fragment`]. El
//! flujo de tokens se dispone en un AST por medio de análisis sintáctico
//! en [`parse`]. El árbol sintáctico es procesado por análisis semántico
//! en [`semantic`], de lo cual se obtiene la máquina resuelta descrita
//! en [`ir`].
//!
//! # Back end
//! [`codegen`] emite la unidad de traducción C a partir de la máquina
//! resuelta. [`sim`] interpreta la misma máquina con las reglas que
//! codifica el código generado.

#[macro_use]
mod macros;

pub mod codegen;
pub mod error;
pub mod fragment;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod semantic;
pub mod sim;
pub mod source;

use std::rc::Rc;
use thiserror::Error;

use crate::{
    error::{Diagnostics, Kind, Severity},
    ir::{InternalError, Machine},
    source::Source,
};

/// Resultado de una compilación exitosa.
pub struct Compilation {
    /// Unidad de traducción C completa.
    pub code: String,

    /// Advertencias, nunca impiden generar código.
    pub warnings: Diagnostics,
}

#[derive(Error, Debug)]
pub enum CompileError {
    /// El programa tiene errores.
    #[error("{0}")]
    Rejected(Diagnostics),

    /// Defecto del compilador.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Ejecuta las fases delanteras sobre un código fuente.
///
/// Retorna la máquina resuelta junto con las advertencias, o bien
/// todos los errores de la primera fase que haya fallado.
pub fn analyze(source: &Rc<Source>) -> Result<(Machine, Diagnostics), Diagnostics> {
    log::debug!("analyzing `{}`", source.name());

    let tokens = lex::tokenize(source).map_err(|errors| Diagnostics::rejected(Kind::Lexical, errors))?;
    let program =
        parse::parse(tokens.iter(), source.start()).map_err(|errors| Diagnostics::rejected(Kind::Syntax, errors))?;

    let analysis = program
        .resolve()
        .map_err(|errors| Diagnostics::rejected(Kind::Semantic, errors))?;

    let mut warnings = Diagnostics::default();
    warnings.report(Severity::Warning, Kind::Semantic, analysis.warnings);

    Ok((analysis.machine, warnings))
}

/// Compila un código fuente completo a C.
///
/// No se produce salida alguna si hubo errores en cualquier fase.
pub fn compile(source: &Rc<Source>, options: &codegen::Options) -> Result<Compilation, CompileError> {
    let (machine, warnings) = analyze(source).map_err(CompileError::Rejected)?;
    let code = codegen::generate(&machine, options)?;

    Ok(Compilation { code, warnings })
}
