//! Análisis semántico.
//!
//! Resuelve todos los nombres del árbol sintáctico y construye una
//! [`ir::Machine`]. El análisis no se detiene ante el primer error:
//! cada problema encontrado se acumula en el contexto y al final se
//! reportan todos juntos. Una máquina solo se produce si no hubo errores.
//!
//! Los fragmentos de código se inspeccionan de forma superficial. Todo
//! identificador que coincide con una variable declarada se reescribe
//! como acceso a la instancia, excepto si es un miembro (`a.x`, `a->x`).
//! Las únicas formas reconocidas de `this` son `this.state()` y `this.err()`.

use std::collections::{hash_map::Entry, HashMap, VecDeque};
use thiserror::Error;

use crate::{
    fragment::{Fragment, Lexeme, LexemeKind},
    ir::{self, Action, BlockId, ErrorId, InternalError, Piece, StateFlags, StateId, TimerId, VarId},
    lex::Identifier,
    parse::{self, Actuator, Constant, Family, Flag, Item},
    source::{Located, Location},
};

/// Prefijo reservado para los nombres que genera el compilador.
pub const RESERVED_PREFIX: &str = "fsml_";

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Duplicate variable `{0}`, first declared at {1}")]
    DuplicateVariable(Identifier, Location),

    #[error("Duplicate timer `{0}`, first declared at {1}")]
    DuplicateTimer(Identifier, Location),

    #[error("Duplicate state `{0}`, first declared at {1}")]
    DuplicateState(Identifier, Location),

    #[error("Duplicate flag `{0}`")]
    DuplicateFlag(Flag),

    #[error("Identifier `{0}` is reserved, names cannot be `this` or start with `fsml_`")]
    Reserved(Identifier),

    #[error("No start state, flag exactly one state with `[start]`")]
    NoStart,

    #[error("Found multiple start states: `{0}` conflicts with `{1}`")]
    MultipleStart(Identifier, Identifier),

    #[error("No end state, flag at least one state with `[end]`")]
    NoEnd,

    #[error("State `{0}` is undefined")]
    UndefinedState(Identifier),

    #[error("Timer `{0}` is undefined")]
    UndefinedTimer(Identifier),

    #[error("Variable `{0}` is undefined")]
    UndefinedVariable(Identifier),

    #[error("`retry` is only allowed inside an until-block")]
    RetryOutsideUntil,

    #[error("`err {0}` requires a state flagged `[err]`")]
    NoErrState(Identifier),

    #[error("`out` expects an output variable, `{0}` is declared as `{1}`")]
    NotAnOutput(Identifier, Family),

    #[error("Output variable `{0}` cannot be read in a condition")]
    OutputInCondition(Identifier),

    #[error("Unknown accessor `this.{0}()`, expected `this.state()` or `this.err()`")]
    UnknownAccessor(String),

    #[error("Until-block bound must be greater than zero")]
    ZeroBound,

    #[error("Until-block has no states")]
    EmptyUntil,

    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticWarning {
    #[error("State `{0}` is unreachable from the start state")]
    Unreachable(Identifier),

    #[error("State `{0}` is flagged `err` but `{1}` is the error sink, `err` transitions never go there")]
    IgnoredErrState(Identifier, Identifier),
}

/// Resultado de un análisis exitoso.
pub struct Analysis {
    pub machine: ir::Machine,
    pub warnings: Vec<Located<SemanticWarning>>,
}

struct SymbolTable<Id> {
    symbols: HashMap<Identifier, (Id, Location)>,
}

impl<Id: Copy> SymbolTable<Id> {
    fn new() -> Self {
        SymbolTable {
            symbols: HashMap::new(),
        }
    }

    fn define<C>(&mut self, name: &Located<Identifier>, id: Id, clash: C) -> Semantic<()>
    where
        C: FnOnce(Identifier, Location) -> SemanticError,
    {
        match self.symbols.entry(name.as_ref().clone()) {
            Entry::Vacant(entry) => {
                entry.insert((id, name.location().clone()));
                Ok(())
            }

            Entry::Occupied(previous) => {
                let error = clash(name.as_ref().clone(), previous.get().1.clone());
                Err(Located::at(error, name.location().clone()))
            }
        }
    }

    fn get(&self, name: &str) -> Option<Id> {
        self.symbols.get(name).map(|(id, _)| *id)
    }

    fn lookup<U>(&self, name: &Located<Identifier>, undefined: U) -> Semantic<Id>
    where
        U: FnOnce(Identifier) -> SemanticError,
    {
        self.get(name.as_ref().as_ref())
            .ok_or_else(|| Located::at(undefined(name.as_ref().clone()), name.location().clone()))
    }
}

/// Uso de un fragmento, determina qué variables puede leer.
#[derive(Copy, Clone, PartialEq, Eq)]
enum Usage {
    Statement,
    Condition,
}

impl parse::Program {
    pub fn resolve(&self) -> Result<Analysis, Vec<Located<SemanticError>>> {
        let fsm = &self.fsm;
        let mut context = Context::new(fsm);

        context.declare_variables();
        context.declare_timers();
        let mut states = context.declare_states();

        let variables = fsm
            .variables
            .iter()
            .map(|variable| ir::Variable {
                family: *variable.family.as_ref(),
                ty: variable.ty.as_ref().clone(),
                name: variable.name.as_ref().to_string(),
                init: context.code(variable.init.as_ref(), variable.init.location(), Usage::Statement),
            })
            .collect();

        let timers = fsm
            .timers
            .iter()
            .map(|timer| ir::Timer {
                name: timer.name.as_ref().to_string(),
                duration: timer.duration.as_ref().clone(),
            })
            .collect();

        // Recorrido en orden textual, así las etiquetas de error quedan
        // numeradas según su primer uso
        let mut blocks = Vec::new();
        let mut position = 0;

        for item in &fsm.items {
            match item {
                Item::State(state) => {
                    context.fill(&mut states, position, state);
                    position += 1;
                }

                Item::Until(until) => {
                    let first = StateId(position);
                    for state in &until.states {
                        context.fill(&mut states, position, state);
                        position += 1;
                    }

                    blocks.extend(context.block(until, first));
                }
            }
        }

        let start = match context.start {
            Some(start) => start,
            None => {
                context.fail(SemanticError::NoStart, fsm.name.location());
                StateId(0)
            }
        };

        if !states.iter().any(|state| state.flags.contains(StateFlags::END)) {
            context.fail(SemanticError::NoEnd, fsm.name.location());
        }

        if !context.errors.is_empty() {
            return Err(context.errors);
        }

        let machine = ir::Machine {
            name: fsm.name.as_ref().to_string(),
            decl: self.decl.as_ref().map(|decl| decl.as_ref().clone()),
            clock: match self.clock.as_ref().map(|clock| clock.as_ref()) {
                None => ir::Clock::Default,
                Some(parse::Clock::Time(body)) => ir::Clock::Time(body.clone()),
                Some(parse::Clock::Period(body)) => ir::Clock::Period(body.clone()),
            },
            variables,
            timers,
            states,
            blocks,
            errors: context.labels,
            start,
            sink: context.sink,
        };

        let mut warnings = Vec::new();

        let sink = machine.sink.and_then(|StateId(sink)| context.names.get(sink));
        if let Some(sink) = sink.filter(|_| !machine.errors.is_empty()) {
            for ignored in &context.ignored_err_states {
                let warning = SemanticWarning::IgnoredErrState(ignored.as_ref().clone(), sink.as_ref().clone());
                warnings.push(Located::at(warning, ignored.location().clone()));
            }
        }

        let reachable = reachable(&machine)
            .map_err(|error| vec![Located::at(SemanticError::from(error), fsm.name.location().clone())])?;

        for (name, _) in context.names.iter().zip(&reachable).filter(|(_, reached)| !**reached) {
            let warning = SemanticWarning::Unreachable(name.as_ref().clone());
            warnings.push(Located::at(warning, name.location().clone()));
        }

        log::debug!(
            "resolved fsm `{}`: {} states, {} timers, {} until-blocks, {} error labels",
            machine.name,
            machine.states.len(),
            machine.timers.len(),
            machine.blocks.len(),
            machine.errors.len()
        );

        Ok(Analysis { machine, warnings })
    }
}

struct Context<'a> {
    fsm: &'a parse::Fsm,
    variables: SymbolTable<VarId>,
    families: Vec<Family>,
    timers: SymbolTable<TimerId>,
    states: SymbolTable<StateId>,
    names: Vec<Located<Identifier>>,
    start: Option<StateId>,
    sink: Option<StateId>,
    ignored_err_states: Vec<Located<Identifier>>,
    labels: Vec<String>,
    errors: Vec<Located<SemanticError>>,
}

impl<'a> Context<'a> {
    fn new(fsm: &'a parse::Fsm) -> Self {
        Context {
            fsm,
            variables: SymbolTable::new(),
            families: Vec::new(),
            timers: SymbolTable::new(),
            states: SymbolTable::new(),
            names: Vec::new(),
            start: None,
            sink: None,
            ignored_err_states: Vec::new(),
            labels: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn declare_variables(&mut self) {
        for (index, variable) in self.fsm.variables.iter().enumerate() {
            let name = &variable.name;
            let text = name.as_ref().as_ref();

            if text == "this" || text.starts_with(RESERVED_PREFIX) {
                self.fail(SemanticError::Reserved(name.as_ref().clone()), name.location());
            }

            let result = self.variables.define(name, VarId(index), SemanticError::DuplicateVariable);
            self.report(result);

            self.families.push(*variable.family.as_ref());
        }
    }

    fn declare_timers(&mut self) {
        for (index, timer) in self.fsm.timers.iter().enumerate() {
            let result = self.timers.define(&timer.name, TimerId(index), SemanticError::DuplicateTimer);
            self.report(result);
        }
    }

    /// Registra todos los estados y retorna sus esqueletos, sin transiciones.
    fn declare_states(&mut self) -> Vec<ir::State> {
        let mut states = Vec::new();
        let mut blocks = 0;

        for item in &self.fsm.items {
            match item {
                Item::State(state) => states.push(self.declare_state(state, None, states.len())),
                Item::Until(until) => {
                    let block = BlockId(blocks);
                    blocks += 1;

                    for state in &until.states {
                        states.push(self.declare_state(state, Some(block), states.len()));
                    }
                }
            }
        }

        states
    }

    fn declare_state(&mut self, state: &parse::State, block: Option<BlockId>, index: usize) -> ir::State {
        let id = StateId(index);
        let name = &state.name;

        let result = self.states.define(name, id, SemanticError::DuplicateState);
        self.report(result);
        self.names.push(name.clone());

        let mut flags = StateFlags::empty();
        for flag in &state.flags {
            let bit = match flag.as_ref() {
                Flag::Start => StateFlags::START,
                Flag::End => StateFlags::END,
                Flag::Err => StateFlags::ERR,
            };

            if flags.contains(bit) {
                self.fail(SemanticError::DuplicateFlag(*flag.as_ref()), flag.location());
            }

            flags |= bit;
        }

        if flags.contains(StateFlags::START) {
            match self.start {
                None => self.start = Some(id),
                Some(StateId(first)) => {
                    if let Some(first) = self.names.get(first) {
                        let error = SemanticError::MultipleStart(name.as_ref().clone(), first.as_ref().clone());
                        self.fail(error, name.location());
                    }
                }
            }
        }

        if flags.contains(StateFlags::ERR) {
            match self.sink {
                None => self.sink = Some(id),
                Some(_) => self.ignored_err_states.push(name.clone()),
            }
        }

        ir::State {
            name: name.as_ref().to_string(),
            flags,
            block,
            entry: None,
            transitions: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Resuelve el cuerpo de un estado sobre su esqueleto.
    fn fill(&mut self, states: &mut [ir::State], position: usize, state: &parse::State) {
        let target = match states.get_mut(position) {
            Some(target) => target,
            None => return,
        };

        target.entry = state
            .entry
            .as_ref()
            .map(|entry| self.code(entry.as_ref(), entry.location(), Usage::Statement));

        for transition in &state.transitions {
            let location = transition.condition.location();
            let condition = match transition.condition.as_ref() {
                parse::Condition::Code(fragment) => {
                    Some(ir::Condition::Code(self.code(fragment, location, Usage::Condition)))
                }

                parse::Condition::Timeout(timer) => {
                    let result = self.timers.lookup(timer, SemanticError::UndefinedTimer);
                    self.report(result).map(ir::Condition::Timeout)
                }
            };

            let code = transition
                .code
                .as_ref()
                .map(|code| self.code(code.as_ref(), code.location(), Usage::Statement));

            let action = self.action(&transition.actuator, target.block);
            let action = self.report(action);

            let start = match &transition.start {
                None => Some(None),
                Some(timer) => {
                    let result = self.timers.lookup(timer, SemanticError::UndefinedTimer);
                    self.report(result).map(Some)
                }
            };

            if let (Some(condition), Some(action), Some(start)) = (condition, action, start) {
                target.transitions.push(ir::Transition {
                    condition,
                    code,
                    action,
                    start,
                });
            }
        }

        for output in &state.outputs {
            let variable = self.output(&output.variable);
            let value = self.code(output.value.as_ref(), output.value.location(), Usage::Statement);

            if let Some(variable) = variable {
                target.outputs.push(ir::Assignment { variable, value });
            }
        }
    }

    fn block(&mut self, until: &parse::Until, first: StateId) -> Option<ir::Block> {
        if let Constant::Integer(0) = until.bound.as_ref() {
            self.fail(SemanticError::ZeroBound, until.bound.location());
        }

        let overflow = self.action(&until.overflow, None);
        let overflow = self.report(overflow)?;

        if until.states.is_empty() {
            self.fail(SemanticError::EmptyUntil, &until.keyword);
            return None;
        }

        Some(ir::Block {
            bound: until.bound.as_ref().clone(),
            first,
            overflow,
        })
    }

    fn action(&mut self, actuator: &Located<Actuator>, block: Option<BlockId>) -> Semantic<Action> {
        match actuator.as_ref() {
            Actuator::Go(target) => self.states.lookup(target, SemanticError::UndefinedState).map(Action::Go),

            Actuator::Err(label) => match self.sink {
                Some(_) => Ok(Action::Err(self.label(label.as_ref()))),
                None => Err(Located::at(
                    SemanticError::NoErrState(label.as_ref().clone()),
                    actuator.location().clone(),
                )),
            },

            Actuator::Retry => block
                .map(Action::Retry)
                .ok_or_else(|| Located::at(SemanticError::RetryOutsideUntil, actuator.location().clone())),
        }
    }

    /// Numera una etiqueta de error, en orden de primer uso.
    fn label(&mut self, label: &Identifier) -> ErrorId {
        let label = label.as_ref();
        match self.labels.iter().position(|known| known == label) {
            Some(index) => ErrorId(index),
            None => {
                self.labels.push(label.to_string());
                ErrorId(self.labels.len() - 1)
            }
        }
    }

    fn output(&mut self, name: &Located<Identifier>) -> Option<VarId> {
        let result = self.variables.lookup(name, SemanticError::UndefinedVariable);
        let id = self.report(result)?;

        match self.families.get(id.0) {
            Some(Family::Output) => Some(id),
            Some(&family) => {
                self.fail(SemanticError::NotAnOutput(name.as_ref().clone(), family), name.location());
                None
            }

            None => None,
        }
    }

    fn code(&mut self, fragment: &Fragment, location: &Location, usage: Usage) -> ir::Code {
        let lexemes = fragment.lexemes();
        let at = |lexeme: &Lexeme<'_>| Location::point(location.source(), lexeme.position);

        let mut pieces = Vec::new();
        let mut copied = 0;
        let mut index = 0;

        while let Some(lexeme) = lexemes.get(index) {
            let before = &lexemes[..index];
            index += 1;

            let word = match lexeme.kind {
                LexemeKind::Word(word) if !is_member(before) => word,
                _ => continue,
            };

            let (piece, end) = if word == "this" {
                let (accessor, close) = match accessor(&lexemes[index..]) {
                    Some(accessor) => accessor,
                    None => continue,
                };

                index += 4;
                match accessor {
                    "state" => (Piece::CurrentState, close.span.end),
                    "err" => (Piece::CurrentError, close.span.end),
                    other => {
                        self.fail(SemanticError::UnknownAccessor(other.to_string()), &at(lexeme));
                        continue;
                    }
                }
            } else if let Some(id) = self.variables.get(word) {
                if usage == Usage::Condition && self.families.get(id.0) == Some(&Family::Output) {
                    self.fail(SemanticError::OutputInCondition(Identifier::from(word)), &at(lexeme));
                }

                (Piece::Variable(id), lexeme.span.end)
            } else {
                continue;
            };

            if lexeme.span.start > copied {
                pieces.push(Piece::Text(copied..lexeme.span.start));
            }

            pieces.push(piece);
            copied = end;
        }

        if fragment.text().len() > copied {
            pieces.push(Piece::Text(copied..fragment.text().len()));
        }

        ir::Code {
            fragment: fragment.clone(),
            pieces,
        }
    }

    fn report<T>(&mut self, result: Semantic<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.errors.push(error);
                None
            }
        }
    }

    fn fail(&mut self, error: SemanticError, location: &Location) {
        self.errors.push(Located::at(error, location.clone()));
    }
}

/// Determina si el lexema siguiente es el miembro de una estructura.
fn is_member(before: &[Lexeme<'_>]) -> bool {
    match before {
        [.., last] if last.kind == LexemeKind::Punct('.') => true,
        [.., minus, greater] => {
            minus.kind == LexemeKind::Punct('-')
                && greater.kind == LexemeKind::Punct('>')
                && minus.span.end == greater.span.start
        }

        _ => false,
    }
}

/// Reconoce `.name()` a continuación de `this`.
fn accessor<'l, 'a>(rest: &'l [Lexeme<'a>]) -> Option<(&'a str, &'l Lexeme<'a>)> {
    match rest {
        [dot, name, open, close, ..]
            if dot.kind == LexemeKind::Punct('.')
                && open.kind == LexemeKind::Punct('(')
                && close.kind == LexemeKind::Punct(')') =>
        {
            match name.kind {
                LexemeKind::Word(name) => Some((name, close)),
                _ => None,
            }
        }

        _ => None,
    }
}

/// Búsqueda en anchura desde el estado inicial.
fn reachable(machine: &ir::Machine) -> Result<Vec<bool>, InternalError> {
    let mut reached = vec![false; machine.states.len()];
    let mut pending = VecDeque::from([machine.start]);

    while let Some(state) = pending.pop_front() {
        match reached.get_mut(state.0) {
            Some(true) => continue,
            Some(flag) => *flag = true,
            None => return Err(InternalError::State(state.0)),
        }

        pending.extend(machine.successors(state)?);
    }

    Ok(reached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex, parse, source::Source};

    fn analyze(text: &str) -> Result<Analysis, Vec<(String, u32)>> {
        let source = Source::new("test.fsml", text);
        let tokens = lex::tokenize(&source).expect("lexical errors");
        let program = parse::parse(tokens.iter(), source.start()).expect("syntax errors");

        program.resolve().map_err(|errors| {
            errors
                .into_iter()
                .map(|error| (error.as_ref().to_string(), error.location().start().line()))
                .collect()
        })
    }

    fn messages(text: &str) -> Vec<String> {
        analyze(text).err().unwrap_or_default().into_iter().map(|(message, _)| message).collect()
    }

    /// Reconstruye un fragmento marcando cada referencia resuelta.
    fn expand(machine: &ir::Machine, code: &ir::Code) -> String {
        code.pieces
            .iter()
            .map(|piece| match piece {
                Piece::Text(range) => code.text(range).unwrap().to_string(),
                Piece::Variable(id) => format!("${}", machine.variable(*id).unwrap().name),
                Piece::CurrentState => "$state".to_string(),
                Piece::CurrentError => "$err".to_string(),
            })
            .collect()
    }

    const DOOR: &str = r#"
fsm door {
    input int sensor {0};
    output int motor {0};
    var int tries {0};
    timer settle(10);

    state [start] closed
        on (sensor > 0) { tries = 0; } go opening start(settle);
        out motor(0);

    until (3) {
        state opening { tries++; }
            on timeout(settle) go open;
            on (sensor < 0) retry;
    } err jammed;

    state [end] open
        on (this.state() != 0) err stuck;
    state [err] failed
}
"#;

    #[test]
    fn resolves_machine() {
        let Analysis { machine, warnings } = analyze(DOOR).unwrap_or_else(|e| panic!("{:?}", e));

        assert!(warnings.is_empty());
        assert_eq!(machine.name, "door");
        assert_eq!(machine.start, StateId(0));
        assert_eq!(machine.sink, Some(StateId(3)));
        assert_eq!(machine.errors, vec!["jammed", "stuck"]);

        let opening = machine.state(StateId(1)).unwrap();
        assert_eq!(opening.block, Some(BlockId(0)));
        assert_eq!(opening.transitions[1].action, Action::Retry(BlockId(0)));
        assert_eq!(expand(&machine, opening.entry.as_ref().unwrap()), " $tries++; ");

        let block = machine.block(BlockId(0)).unwrap();
        assert_eq!(block.first, StateId(1));
        assert_eq!(block.overflow, Action::Err(ErrorId(0)));

        let closed = machine.state(StateId(0)).unwrap();
        assert_eq!(closed.transitions[0].start, Some(TimerId(0)));
        match &closed.transitions[0].condition {
            ir::Condition::Code(code) => assert_eq!(expand(&machine, code), "$sensor > 0"),
            _ => panic!("expected code condition"),
        }

        let open = machine.state(StateId(2)).unwrap();
        match &open.transitions[0].condition {
            ir::Condition::Code(code) => assert_eq!(expand(&machine, code), "$state != 0"),
            _ => panic!("expected code condition"),
        }
    }

    #[test]
    fn members_are_not_rewritten() {
        let text = "fsm m {\nvar int x {0};\nstate [start, end] s { p.x = x; q->x = x; s.x(x); }\n}";
        let machine = analyze(text).unwrap_or_else(|e| panic!("{:?}", e)).machine;
        let entry = machine.states[0].entry.as_ref().unwrap();

        assert_eq!(expand(&machine, entry), " p.x = $x; q->x = $x; s.x($x); ");
    }

    #[test]
    fn literals_are_not_rewritten() {
        let text = "fsm m {\nvar int x {0};\nstate [start, end] s { puts(\"x\"); /* x */ }\n}";
        let machine = analyze(text).unwrap_or_else(|e| panic!("{:?}", e)).machine;
        let entry = machine.states[0].entry.as_ref().unwrap();

        assert_eq!(entry.pieces, vec![Piece::Text(0..entry.fragment.text().len())]);
    }

    #[test]
    fn multiple_start_states() {
        let errors = analyze("fsm m {\nstate [start] a\nstate [start, end] b\n}")
            .err()
            .expect("expected semantic errors");

        assert_eq!(errors.len(), 1);
        assert!(errors[0].0.contains("multiple start states"));
        assert_eq!(errors[0].1, 3);
    }

    #[test]
    fn missing_start_and_end() {
        assert_eq!(
            messages("fsm m { state a }"),
            vec![
                "No start state, flag exactly one state with `[start]`",
                "No end state, flag at least one state with `[end]`"
            ]
        );
    }

    #[test]
    fn undefined_references() {
        let errors = analyze(
            "fsm m {\n\
             state [start, end] a\n\
             on (1) go nowhere;\n\
             on timeout(t) go a start(u);\n\
             out y(1);\n\
             }",
        )
        .err()
        .expect("expected semantic errors");

        let expected = vec![
            ("State `nowhere` is undefined".to_string(), 3),
            ("Timer `t` is undefined".to_string(), 4),
            ("Timer `u` is undefined".to_string(), 4),
            ("Variable `y` is undefined".to_string(), 5),
        ];

        assert_eq!(errors, expected);
    }

    #[test]
    fn duplicates_cite_first_definition() {
        let errors = messages("fsm m {\nvar int x {0};\ninput int x {0};\nstate [start, end] a\nstate a\n}");

        assert_eq!(errors[0], "Duplicate variable `x`, first declared at test.fsml:2:9");
        assert_eq!(errors[1], "Duplicate state `a`, first declared at test.fsml:4:20");
    }

    #[test]
    fn duplicate_flags() {
        assert_eq!(messages("fsm m { state [start, end, start] a }"), vec!["Duplicate flag `start`"]);
    }

    #[test]
    fn reserved_names() {
        assert_eq!(
            messages("fsm m { var int fsml_x {0}; var int this {0}; state [start, end] a }"),
            vec![
                "Identifier `fsml_x` is reserved, names cannot be `this` or start with `fsml_`",
                "Identifier `this` is reserved, names cannot be `this` or start with `fsml_`"
            ]
        );
    }

    #[test]
    fn retry_outside_until() {
        assert_eq!(
            messages("fsm m { state [start, end] a on (1) retry; }"),
            vec!["`retry` is only allowed inside an until-block"]
        );
    }

    #[test]
    fn err_requires_err_state() {
        assert_eq!(
            messages("fsm m { state [start, end] a on (1) err oops; }"),
            vec!["`err oops` requires a state flagged `[err]`"]
        );
    }

    #[test]
    fn out_requires_output() {
        assert_eq!(
            messages("fsm m { input int i {0}; state [start, end] a out i(1); }"),
            vec!["`out` expects an output variable, `i` is declared as `input`"]
        );
    }

    #[test]
    fn outputs_cannot_be_conditions() {
        let errors = analyze("fsm m {\noutput int o {0};\nstate [start, end] a\non (o == 1) { o = 2; } go a;\n}")
            .err()
            .expect("expected semantic errors");

        assert_eq!(errors, vec![("Output variable `o` cannot be read in a condition".to_string(), 4)]);
    }

    #[test]
    fn unknown_accessor() {
        assert_eq!(
            messages("fsm m { state [start, end] a { this.name(); } }"),
            vec!["Unknown accessor `this.name()`, expected `this.state()` or `this.err()`"]
        );
    }

    #[test]
    fn until_bounds() {
        assert_eq!(
            messages("fsm m { state [start, end] a until (0) { state b } go a; until (2) { } go a; }"),
            vec!["Until-block bound must be greater than zero", "Until-block has no states"]
        );

        let machine = analyze("fsm m { until (N) { state [start] a on (1) retry; } go b; state [end] b }")
            .unwrap_or_else(|e| panic!("{:?}", e))
            .machine;

        assert_eq!(machine.blocks[0].bound, Constant::Named(Identifier::from("N")));
    }

    #[test]
    fn warnings() {
        let analysis = analyze(
            "fsm m {\n\
             state [start] a on (1) err bad;\n\
             state [end] b\n\
             state [err] e1\n\
             state [err] e2\n\
             }",
        )
        .unwrap_or_else(|e| panic!("{:?}", e));

        let warnings: Vec<_> = analysis
            .warnings
            .iter()
            .map(|warning| (warning.as_ref().to_string(), warning.location().start().line()))
            .collect();

        assert_eq!(
            warnings,
            vec![
                (
                    "State `e2` is flagged `err` but `e1` is the error sink, `err` transitions never go there".to_string(),
                    5
                ),
                ("State `b` is unreachable from the start state".to_string(), 3),
                ("State `e2` is unreachable from the start state".to_string(), 5),
            ]
        );
    }
}
