//! Representación intermedia.
//!
//! Una [`Machine`] es el árbol sintáctico tras el análisis semántico:
//! toda referencia por nombre (destino de una transición, temporizador,
//! reintento, etiqueta de error, variable dentro de un fragmento) se
//! ha reemplazado por un índice estable dentro de un arreglo plano.
//! Los ciclos del grafo de transiciones no implican ninguna relación
//! de ownership entre estados.
//!
//! Las consultas por índice retornan [`InternalError`] si el índice no
//! existe. Esto nunca debería ocurrir para una máquina producida por
//! [`crate::semantic`]; de ocurrir se trata de un defecto del compilador.

use std::{fmt, ops::Range};

use bitflags::bitflags;
use thiserror::Error;

use crate::{
    fragment::Fragment,
    parse::{Constant, Family},
};

bitflags! {
    /// Banderas de tipo de un estado.
    pub struct StateFlags: u8 {
        const START = 0x01;
        const END   = 0x02;
        const ERR   = 0x04;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VarId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ErrorId(pub usize);

/// Violación de un invariante que el análisis semántico debió garantizar.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InternalError {
    #[error("internal compiler error: state index {0} out of range")]
    State(usize),

    #[error("internal compiler error: variable index {0} out of range")]
    Variable(usize),

    #[error("internal compiler error: timer index {0} out of range")]
    Timer(usize),

    #[error("internal compiler error: until-block index {0} out of range")]
    Block(usize),

    #[error("internal compiler error: error label index {0} out of range")]
    Label(usize),

    #[error("internal compiler error: `err` actuator without an error sink")]
    NoSink,

    #[error("internal compiler error: fragment piece {0:?} out of bounds")]
    Piece(Range<usize>),

    #[error("internal compiler error: formatting failure")]
    Format(#[from] fmt::Error),
}

pub struct Machine {
    pub name: String,
    pub decl: Option<Fragment>,
    pub clock: Clock,
    pub variables: Vec<Variable>,
    pub timers: Vec<Timer>,
    pub states: Vec<State>,
    pub blocks: Vec<Block>,
    pub errors: Vec<String>,
    pub start: StateId,
    pub sink: Option<StateId>,
}

pub enum Clock {
    /// Sin función de tiempo, cada paso equivale a una unidad.
    Default,
    Time(Fragment),
    Period(Fragment),
}

pub struct Variable {
    pub family: Family,
    pub ty: String,
    pub name: String,
    pub init: Code,
}

pub struct Timer {
    pub name: String,
    pub duration: Constant,
}

pub struct State {
    pub name: String,
    pub flags: StateFlags,
    pub block: Option<BlockId>,
    pub entry: Option<Code>,
    pub transitions: Vec<Transition>,
    pub outputs: Vec<Assignment>,
}

pub struct Transition {
    pub condition: Condition,
    pub code: Option<Code>,
    pub action: Action,
    pub start: Option<TimerId>,
}

pub enum Condition {
    Code(Code),
    Timeout(TimerId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Go(StateId),
    Err(ErrorId),
    Retry(BlockId),
}

pub struct Assignment {
    pub variable: VarId,
    pub value: Code,
}

/// Bloque `until`.
pub struct Block {
    pub bound: Constant,
    pub first: StateId,
    pub overflow: Action,
}

/// Fragmento de código con sus referencias resueltas.
///
/// Las piezas cubren el texto completo, en orden.
pub struct Code {
    pub fragment: Fragment,
    pub pieces: Vec<Piece>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Piece {
    /// Texto verbatim, como rango de bytes del fragmento.
    Text(Range<usize>),

    /// Referencia a una variable declarada.
    Variable(VarId),

    /// `this.state()`
    CurrentState,

    /// `this.err()`
    CurrentError,
}

impl Code {
    /// Texto correspondiente a una pieza [`Piece::Text`].
    pub fn text(&self, range: &Range<usize>) -> Result<&str, InternalError> {
        self.fragment
            .text()
            .get(range.clone())
            .ok_or_else(|| InternalError::Piece(range.clone()))
    }
}

impl Machine {
    pub fn state(&self, StateId(id): StateId) -> Result<&State, InternalError> {
        self.states.get(id).ok_or(InternalError::State(id))
    }

    pub fn variable(&self, VarId(id): VarId) -> Result<&Variable, InternalError> {
        self.variables.get(id).ok_or(InternalError::Variable(id))
    }

    pub fn timer(&self, TimerId(id): TimerId) -> Result<&Timer, InternalError> {
        self.timers.get(id).ok_or(InternalError::Timer(id))
    }

    pub fn block(&self, BlockId(id): BlockId) -> Result<&Block, InternalError> {
        self.blocks.get(id).ok_or(InternalError::Block(id))
    }

    pub fn label(&self, ErrorId(id): ErrorId) -> Result<&str, InternalError> {
        self.errors
            .get(id)
            .map(String::as_str)
            .ok_or(InternalError::Label(id))
    }

    /// Estado sumidero de todas las transiciones `err`.
    pub fn sink(&self) -> Result<StateId, InternalError> {
        self.sink.ok_or(InternalError::NoSink)
    }

    /// Estado al que conduce una acción `go` o `err`.
    ///
    /// Para `retry` se retorna el primer estado del bloque, sin
    /// considerar desbordamiento.
    pub fn target(&self, action: Action) -> Result<StateId, InternalError> {
        match action {
            Action::Go(state) => Ok(state),
            Action::Err(_) => self.sink(),
            Action::Retry(block) => Ok(self.block(block)?.first),
        }
    }

    /// Bloque `until` cuyo contador debe reiniciarse cuando `from`
    /// abandona su bloque por medio de `action`.
    pub fn exits_block(&self, from: StateId, action: Action) -> Result<Option<BlockId>, InternalError> {
        let block = match self.state(from)?.block {
            Some(block) => block,
            None => return Ok(None),
        };

        match action {
            Action::Retry(_) => Ok(None),
            _ => {
                let target = self.state(self.target(action)?)?;
                Ok((target.block != Some(block)).then(|| block))
            }
        }
    }

    /// Estados sucesores directos de un estado, incluyendo los
    /// desbordamientos de reintentos.
    pub fn successors(&self, from: StateId) -> Result<Vec<StateId>, InternalError> {
        let mut successors = Vec::new();
        for transition in &self.state(from)?.transitions {
            successors.push(self.target(transition.action)?);

            if let Action::Retry(block) = transition.action {
                successors.push(self.target(self.block(block)?.overflow)?);
            }
        }

        Ok(successors)
    }
}
