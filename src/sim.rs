//! Intérprete de referencia.
//!
//! Ejecuta una [`Machine`] paso a paso con las mismas reglas que codifica
//! `NAME_step()` en la unidad generada. Los fragmentos de C no se
//! interpretan aquí: se delegan a un [`Host`], que decide el valor de
//! cada condición, expresión o cuerpo de función de tiempo. Los valores
//! de las variables se modelan como enteros con signo.

use thiserror::Error;

use crate::{
    ir::{Action, BlockId, Clock, Code, Condition, ErrorId, InternalError, Machine, StateFlags, StateId},
    parse::Constant,
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error("Constant `{0}` has no value in this host")]
    UnknownConstant(String),
}

/// Evaluador de fragmentos de código.
pub trait Host {
    /// Evalúa un fragmento. El resultado se interpreta como valor de
    /// verdad en condiciones, se asigna en inicializadores y `out`, y se
    /// descarta en código de estado o de transición.
    fn eval(&mut self, code: &str, frame: &mut Frame<'_>) -> i64;

    /// Valor de una constante con nombre, típicamente definida en `decl`.
    fn constant(&mut self, _name: &str) -> Option<u64> {
        None
    }
}

impl<F> Host for F
where
    F: FnMut(&str, &mut Frame<'_>) -> i64,
{
    fn eval(&mut self, code: &str, frame: &mut Frame<'_>) -> i64 {
        self(code, frame)
    }
}

/// Construye un [`Host`] a partir de un closure.
pub fn host<F>(eval: F) -> F
where
    F: FnMut(&str, &mut Frame<'_>) -> i64,
{
    eval
}

/// Vista de una instancia durante la evaluación de un fragmento.
pub struct Frame<'s> {
    machine: &'s Machine,
    values: &'s mut [i64],
    state: StateId,
    error: Option<ErrorId>,
}

impl Frame<'_> {
    pub fn get(&self, name: &str) -> Option<i64> {
        let index = self.machine.variables.iter().position(|variable| variable.name == name)?;
        self.values.get(index).copied()
    }

    pub fn set(&mut self, name: &str, value: i64) -> bool {
        let index = self.machine.variables.iter().position(|variable| variable.name == name);
        match index.and_then(|index| self.values.get_mut(index)) {
            Some(slot) => {
                *slot = value;
                true
            }

            None => false,
        }
    }

    /// Equivalente a `this.state()`.
    pub fn state(&self) -> &str {
        self.machine.states.get(self.state.0).map_or("", |state| state.name.as_str())
    }

    /// Equivalente a `this.err()`.
    pub fn error(&self) -> Option<&str> {
        self.error.and_then(|error| self.machine.label(error).ok())
    }
}

#[derive(Copy, Clone, Default)]
struct Timer {
    remaining: u64,
    running: bool,
}

pub struct Simulator<'m, H> {
    machine: &'m Machine,
    host: H,
    state: StateId,
    error: Option<ErrorId>,
    values: Vec<i64>,
    timers: Vec<Timer>,
    retries: Vec<u64>,
    last_time: u64,
}

impl<'m, H: Host> Simulator<'m, H> {
    /// Equivalente a `NAME_init()`.
    pub fn new(machine: &'m Machine, host: H) -> Result<Self, SimError> {
        let mut simulator = Simulator {
            machine,
            host,
            state: machine.start,
            error: None,
            values: vec![0; machine.variables.len()],
            timers: vec![Timer::default(); machine.timers.len()],
            retries: vec![0; machine.blocks.len()],
            last_time: 0,
        };

        for (index, variable) in machine.variables.iter().enumerate() {
            let value = simulator.eval(&variable.init);
            if let Some(slot) = simulator.values.get_mut(index) {
                *slot = value;
            }
        }

        if let Clock::Time(body) = &machine.clock {
            simulator.last_time = simulator.eval_text(body.text()) as u64;
        }

        Ok(simulator)
    }

    /// Equivalente a `NAME_step()`.
    pub fn step(&mut self) -> Result<(), SimError> {
        let machine = self.machine;

        let elapsed = match &machine.clock {
            Clock::Default => 1,
            Clock::Period(body) => self.eval_text(body.text()) as u64,
            Clock::Time(body) => {
                let now = self.eval_text(body.text()) as u64;
                let elapsed = now.wrapping_sub(self.last_time);
                self.last_time = now;
                elapsed
            }
        };

        for timer in self.timers.iter_mut().filter(|timer| timer.running) {
            timer.remaining = timer.remaining.saturating_sub(elapsed);
        }

        let from = self.state;
        let state = machine.state(from)?;

        if let Some(entry) = &state.entry {
            self.eval(entry);
        }

        for transition in &state.transitions {
            let holds = match &transition.condition {
                Condition::Code(code) => self.eval(code) != 0,
                Condition::Timeout(timer) => {
                    let timer = self.timers.get(timer.0).ok_or(InternalError::Timer(timer.0))?;
                    timer.running && timer.remaining == 0
                }
            };

            if holds {
                log::trace!("{}: `{}` fires {:?}", machine.name, state.name, transition.action);

                if let Some(code) = &transition.code {
                    self.eval(code);
                }

                self.outputs(from)?;

                if let Some(id) = transition.start {
                    let duration = self.constant(&machine.timer(id)?.duration)?;
                    let timer = self.timers.get_mut(id.0).ok_or(InternalError::Timer(id.0))?;
                    *timer = Timer {
                        remaining: duration,
                        running: true,
                    };
                }

                return self.act(Some(from), transition.action);
            }
        }

        self.outputs(from)
    }

    /// Ejecuta pasos hasta alcanzar un estado final o agotar `limit`.
    /// Retorna la cantidad de pasos ejecutados.
    pub fn run(&mut self, limit: usize) -> Result<usize, SimError> {
        for steps in 0..limit {
            if self.finished()? {
                return Ok(steps);
            }

            self.step()?;
        }

        Ok(limit)
    }

    /// Equivalente a `NAME_finished()`.
    pub fn finished(&self) -> Result<bool, SimError> {
        let flags = self.machine.state(self.state)?.flags;
        Ok(flags.intersects(StateFlags::END | StateFlags::ERR))
    }

    pub fn state(&self) -> &str {
        self.machine.states.get(self.state.0).map_or("", |state| state.name.as_str())
    }

    pub fn error(&self) -> Option<&str> {
        self.error.and_then(|error| self.machine.label(error).ok())
    }

    pub fn value(&self, name: &str) -> Option<i64> {
        let index = self.machine.variables.iter().position(|variable| variable.name == name)?;
        self.values.get(index).copied()
    }

    /// Modifica una variable desde fuera, típicamente una entrada.
    pub fn set(&mut self, name: &str, value: i64) -> bool {
        let index = self.machine.variables.iter().position(|variable| variable.name == name);
        match index.and_then(|index| self.values.get_mut(index)) {
            Some(slot) => {
                *slot = value;
                true
            }

            None => false,
        }
    }

    /// Contador de reintentos del `index`-ésimo bloque `until`.
    pub fn retries(&self, index: usize) -> Option<u64> {
        self.retries.get(index).copied()
    }

    pub fn host(&mut self) -> &mut H {
        &mut self.host
    }

    fn act(&mut self, from: Option<StateId>, action: Action) -> Result<(), SimError> {
        let machine = self.machine;

        if let Some(from) = from {
            if let Some(block) = machine.exits_block(from, action)? {
                *self.counter(block)? = 0;
            }
        }

        match action {
            Action::Go(target) => self.state = target,

            Action::Err(label) => {
                self.error = Some(label);
                self.state = machine.sink()?;
            }

            Action::Retry(id) => {
                let block = machine.block(id)?;
                let bound = self.constant(&block.bound)?;

                let counter = self.counter(id)?;
                *counter += 1;

                if *counter >= bound {
                    *counter = 0;
                    return self.act(None, block.overflow);
                }

                self.state = block.first;
            }
        }

        Ok(())
    }

    fn outputs(&mut self, from: StateId) -> Result<(), SimError> {
        let machine = self.machine;

        for output in &machine.state(from)?.outputs {
            let value = self.eval(&output.value);
            let index = output.variable.0;
            let slot = self.values.get_mut(index).ok_or(InternalError::Variable(index))?;
            *slot = value;
        }

        Ok(())
    }

    fn counter(&mut self, BlockId(block): BlockId) -> Result<&mut u64, InternalError> {
        self.retries.get_mut(block).ok_or(InternalError::Block(block))
    }

    fn constant(&mut self, constant: &Constant) -> Result<u64, SimError> {
        match constant {
            Constant::Integer(integer) => Ok(u64::from(*integer)),
            Constant::Named(name) => self
                .host
                .constant(name.as_ref())
                .ok_or_else(|| SimError::UnknownConstant(name.to_string())),
        }
    }

    fn eval(&mut self, code: &Code) -> i64 {
        self.eval_text(code.fragment.text())
    }

    fn eval_text(&mut self, text: &str) -> i64 {
        let mut frame = Frame {
            machine: self.machine,
            values: &mut self.values,
            state: self.state,
            error: self.error,
        };

        self.host.eval(text.trim(), &mut frame)
    }
}
