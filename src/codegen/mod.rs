//! Generación de código C.
//!
//! A partir de una [`Machine`] se emite una única unidad de traducción,
//! sin dependencias de un runtime. Para una máquina `NAME` la unidad
//! expone:
//!
//! - `struct NAME`, con el estado completo de una instancia.
//! - `void NAME_init(struct NAME *this)`
//! - `void NAME_step(struct NAME *this)`, que ejecuta a lo sumo una transición.
//! - `int NAME_finished(const struct NAME *this)`
//!
//! Los fragmentos de código del usuario se copian tal cual, excepto
//! por las referencias resueltas en [`crate::semantic`]. Con directivas
//! de línea habilitadas, cada fragmento se rodea de `#line` de forma que
//! los errores del compilador de C apunten al archivo fuente original.
//!
//! La salida es determinista: solo depende del orden de declaración.

use std::fmt::{self, Write};

use crate::{
    fragment::{self, Fragment},
    ir::{Clock, Code, InternalError, Machine, Piece, StateFlags},
    parse::Constant,
};

mod step;

/// Opciones de generación.
#[derive(Clone, Debug)]
pub struct Options {
    /// Nombre del archivo fuente, para directivas `#line`.
    pub source_name: String,

    /// Nombre del archivo generado, para restaurar la numeración.
    pub output_name: String,

    /// Emitir directivas `#line` alrededor de los fragmentos.
    pub line_directives: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            source_name: String::from("input.fsml"),
            output_name: String::from("output.c"),
            line_directives: true,
        }
    }
}

/// Genera la unidad de traducción completa.
pub fn generate(machine: &Machine, options: &Options) -> Result<String, InternalError> {
    let mut unit = Unit {
        machine,
        options,
        output: Output::default(),
    };

    unit.write_unit()?;

    log::debug!(
        "generated {} lines of C for fsm `{}`",
        unit.output.lines,
        machine.name
    );

    Ok(unit.output.text)
}

/// Búfer de salida que lleva la cuenta de líneas emitidas.
#[derive(Default)]
struct Output {
    text: String,
    lines: u32,
    depth: usize,
}

impl Output {
    fn indent(&mut self) -> fmt::Result {
        for _ in 0..self.depth {
            self.text.push_str("    ");
        }

        Ok(())
    }
}

impl Write for Output {
    fn write_str(&mut self, string: &str) -> fmt::Result {
        self.lines += string.matches('\n').count() as u32;
        self.text.push_str(string);
        Ok(())
    }
}

struct Unit<'a> {
    machine: &'a Machine,
    options: &'a Options,
    output: Output,
}

impl Unit<'_> {
    fn write_unit(&mut self) -> Result<(), InternalError> {
        let machine = self.machine;
        let name = &machine.name;

        emit!(
            self,
            "/* Generated by fsmlc from {}, do not edit. */",
            self.options.source_name
        )?;

        if let Some(decl) = &machine.decl {
            emit!(self)?;
            self.raw(decl)?;
        }

        emit!(self)?;
        emit!(self, "enum {}_state {{", name)?;
        self.output.depth += 1;
        for state in &machine.states {
            emit!(self, "{}_state_{},", name, state.name)?;
        }

        self.output.depth -= 1;
        emit!(self, "}};")?;

        emit!(self)?;
        emit!(self, "enum {}_error {{", name)?;
        self.output.depth += 1;
        emit!(self, "{}_no_error,", name)?;
        for label in &machine.errors {
            emit!(self, "{}_error_{},", name, label)?;
        }

        self.output.depth -= 1;
        emit!(self, "}};")?;

        self.write_struct()?;
        self.write_clock()?;
        self.write_init()?;
        self.write_finished()?;
        self.write_step()
    }

    fn write_struct(&mut self) -> Result<(), InternalError> {
        let machine = self.machine;
        let name = &machine.name;

        emit!(self)?;
        emit!(self, "struct {} {{", name)?;
        self.output.depth += 1;

        emit!(self, "enum {}_state fsml_state;", name)?;
        emit!(self, "enum {}_error fsml_error;", name)?;

        for variable in &machine.variables {
            emit!(self, "{} {};", variable.ty, variable.name)?;
        }

        for timer in &machine.timers {
            emit!(self, "unsigned long fsml_timer_{};", timer.name)?;
            emit!(self, "unsigned char fsml_running_{};", timer.name)?;
        }

        if let Clock::Time(_) = machine.clock {
            emit!(self, "unsigned long fsml_last_time;")?;
        }

        for block in 0..machine.blocks.len() {
            emit!(self, "unsigned int fsml_retries_{};", block)?;
        }

        self.output.depth -= 1;
        emit!(self, "}};")
    }

    fn write_clock(&mut self) -> Result<(), InternalError> {
        let machine = self.machine;
        let (function, body) = match &machine.clock {
            Clock::Default => ("period", None),
            Clock::Time(body) => ("time", Some(body)),
            Clock::Period(body) => ("period", Some(body)),
        };

        emit!(self)?;
        emit!(self, "static unsigned long {}_{}(void)", machine.name, function)?;
        emit!(self, "{{")?;

        match body {
            Some(body) => self.raw(body)?,
            None => {
                self.output.depth += 1;
                emit!(self, "return 1;")?;
                self.output.depth -= 1;
            }
        }

        emit!(self, "}}")
    }

    fn write_init(&mut self) -> Result<(), InternalError> {
        let machine = self.machine;
        let name = &machine.name;

        emit!(self)?;
        emit!(self, "void {}_init(struct {} *this)", name, name)?;
        emit!(self, "{{")?;
        self.output.depth += 1;

        let start = &machine.state(machine.start)?.name;
        emit!(self, "this->fsml_state = {}_state_{};", name, start)?;
        emit!(self, "this->fsml_error = {}_no_error;", name)?;

        for variable in &machine.variables {
            let prefix = format!("this->{} = ", variable.name);
            self.code(&variable.init, &prefix, ";")?;
        }

        for timer in &machine.timers {
            emit!(self, "this->fsml_timer_{} = 0;", timer.name)?;
            emit!(self, "this->fsml_running_{} = 0;", timer.name)?;
        }

        for block in 0..machine.blocks.len() {
            emit!(self, "this->fsml_retries_{} = 0;", block)?;
        }

        if let Clock::Time(_) = machine.clock {
            emit!(self, "this->fsml_last_time = {}_time();", name)?;
        }

        self.output.depth -= 1;
        emit!(self, "}}")
    }

    fn write_finished(&mut self) -> Result<(), InternalError> {
        let machine = self.machine;
        let name = &machine.name;

        emit!(self)?;
        emit!(self, "int {}_finished(const struct {} *this)", name, name)?;
        emit!(self, "{{")?;
        self.output.depth += 1;
        emit!(self, "switch (this->fsml_state) {{")?;

        let terminal = StateFlags::END | StateFlags::ERR;
        for state in machine.states.iter().filter(|state| state.flags.intersects(terminal)) {
            emit!(self, "case {}_state_{}:", name, state.name)?;
        }

        self.output.depth += 1;
        emit!(self, "return 1;")?;
        self.output.depth -= 1;

        emit!(self, "default:")?;
        self.output.depth += 1;
        emit!(self, "return 0;")?;
        self.output.depth -= 1;

        emit!(self, "}}")?;
        self.output.depth -= 1;
        emit!(self, "}}")
    }

    /// Emite un fragmento verbatim en sus propias líneas.
    fn raw(&mut self, fragment: &Fragment) -> Result<(), InternalError> {
        self.source_line(fragment.origin().line())?;
        writeln!(self.output, "{}", fragment.text())?;
        self.restore_line()
    }

    /// Emite un fragmento resuelto entre un prefijo y un sufijo.
    ///
    /// Se recortan los espacios en blanco de ambos extremos. Los saltos
    /// de línea descartados al inicio desplazan la línea de origen. Si el
    /// fragmento termina en un comentario `//`, el sufijo va en otra línea.
    fn code(&mut self, code: &Code, prefix: &str, suffix: &str) -> Result<(), InternalError> {
        let expanded = self.expand(code)?;
        let trimmed = expanded.trim_start();
        let skipped = expanded[..expanded.len() - trimmed.len()].matches('\n').count() as u32;
        let trimmed = trimmed.trim_end();

        self.source_line(code.fragment.origin().line() + skipped)?;

        if !suffix.is_empty() && fragment::ends_in_line_comment(trimmed) {
            emit!(self, "{}{}", prefix, trimmed)?;
            emit!(self, "{}", suffix.trim_start())?;
        } else {
            emit!(self, "{}{}{}", prefix, trimmed, suffix)?;
        }

        self.restore_line()
    }

    fn expand(&self, code: &Code) -> Result<String, InternalError> {
        let mut expanded = String::with_capacity(code.fragment.text().len());
        for piece in &code.pieces {
            match piece {
                Piece::Text(range) => expanded.push_str(code.text(range)?),
                Piece::Variable(id) => write!(expanded, "this->{}", self.machine.variable(*id)?.name)?,
                Piece::CurrentState => expanded.push_str("this->fsml_state"),
                Piece::CurrentError => expanded.push_str("this->fsml_error"),
            }
        }

        Ok(expanded)
    }

    fn source_line(&mut self, line: u32) -> Result<(), InternalError> {
        if self.options.line_directives {
            let file = escape(&self.options.source_name);
            writeln!(self.output, "#line {} \"{}\"", line, file)?;
        }

        Ok(())
    }

    /// Retorna a la numeración propia de la unidad generada.
    fn restore_line(&mut self) -> Result<(), InternalError> {
        if self.options.line_directives {
            // La directiva ocupa la siguiente línea, se numera la posterior
            let line = self.output.lines + 2;
            let file = escape(&self.options.output_name);
            writeln!(self.output, "#line {} \"{}\"", line, file)?;
        }

        Ok(())
    }
}

fn constant(constant: &Constant) -> String {
    match constant {
        Constant::Integer(integer) => format!("{}UL", integer),
        Constant::Named(name) => name.to_string(),
    }
}

fn escape(path: &str) -> String {
    path.replace('\\', "\\\\").replace('"', "\\\"")
}
