//! Función de paso.
//!
//! Cada llamada a `NAME_step()` avanza los temporizadores activos y
//! luego despacha sobre el estado actual con un `switch`.

use std::fmt::Write;

use super::{constant, Unit};
use crate::ir::{Action, BlockId, Clock, Condition, InternalError, StateId, Transition};

impl Unit<'_> {
    pub(super) fn write_step(&mut self) -> Result<(), InternalError> {
        let machine = self.machine;
        let name = &machine.name;

        emit!(self)?;
        emit!(self, "void {}_step(struct {} *this)", name, name)?;
        emit!(self, "{{")?;
        self.output.depth += 1;

        match machine.clock {
            Clock::Time(_) => {
                emit!(self, "unsigned long fsml_now = {}_time();", name)?;
                emit!(self, "unsigned long fsml_elapsed = fsml_now - this->fsml_last_time;")?;
                emit!(self, "this->fsml_last_time = fsml_now;")?;
            }

            Clock::Period(_) | Clock::Default => {
                emit!(self, "unsigned long fsml_elapsed = {}_period();", name)?;
            }
        }

        if machine.timers.is_empty() {
            emit!(self, "(void) fsml_elapsed;")?;
        }

        // Los temporizadores se saturan en cero
        for timer in &machine.timers {
            emit!(self)?;
            emit!(self, "if (this->fsml_running_{}) {{", timer.name)?;
            self.output.depth += 1;
            emit!(
                self,
                "this->fsml_timer_{0} = this->fsml_timer_{0} > fsml_elapsed ? this->fsml_timer_{0} - fsml_elapsed : 0;",
                timer.name
            )?;

            self.output.depth -= 1;
            emit!(self, "}}")?;
        }

        emit!(self)?;
        emit!(self, "switch (this->fsml_state) {{")?;

        for index in 0..machine.states.len() {
            self.write_state(StateId(index))?;
        }

        emit!(self, "default:")?;
        self.output.depth += 1;
        emit!(self, "break;")?;
        self.output.depth -= 1;

        emit!(self, "}}")?;
        self.output.depth -= 1;
        emit!(self, "}}")
    }

    fn write_state(&mut self, id: StateId) -> Result<(), InternalError> {
        let machine = self.machine;
        let state = machine.state(id)?;

        log::trace!("emitting state `{}`", state.name);

        emit!(self, "case {}_state_{}: {{", machine.name, state.name)?;
        self.output.depth += 1;

        if let Some(entry) = &state.entry {
            self.code(entry, "", "")?;
        }

        for transition in &state.transitions {
            self.write_transition(id, transition)?;
        }

        // Ninguna condición se cumplió
        self.write_outputs(id)?;
        emit!(self, "break;")?;

        self.output.depth -= 1;
        emit!(self, "}}")
    }

    fn write_transition(&mut self, from: StateId, transition: &Transition) -> Result<(), InternalError> {
        let machine = self.machine;

        match &transition.condition {
            Condition::Code(code) => self.code(code, "if (", ") {")?,
            Condition::Timeout(timer) => {
                let timer = &machine.timer(*timer)?.name;
                emit!(self, "if (this->fsml_running_{0} && this->fsml_timer_{0} == 0) {{", timer)?;
            }
        }

        self.output.depth += 1;

        if let Some(code) = &transition.code {
            self.code(code, "", "")?;
        }

        self.write_outputs(from)?;

        if let Some(timer) = transition.start {
            let timer = machine.timer(timer)?;
            emit!(self, "this->fsml_timer_{} = {};", timer.name, constant(&timer.duration))?;
            emit!(self, "this->fsml_running_{} = 1;", timer.name)?;
        }

        self.write_action(Some(from), transition.action)?;
        emit!(self, "break;")?;

        self.output.depth -= 1;
        emit!(self, "}}")
    }

    fn write_outputs(&mut self, from: StateId) -> Result<(), InternalError> {
        let machine = self.machine;

        for output in &machine.state(from)?.outputs {
            let prefix = format!("this->{} = ", machine.variable(output.variable)?.name);
            self.code(&output.value, &prefix, ";")?;
        }

        Ok(())
    }

    /// Emite un actuador. `from` es `None` para desbordamientos de
    /// reintento, cuyo contador ya fue reiniciado.
    fn write_action(&mut self, from: Option<StateId>, action: Action) -> Result<(), InternalError> {
        let machine = self.machine;
        let name = &machine.name;

        if let Some(from) = from {
            if let Some(BlockId(block)) = machine.exits_block(from, action)? {
                emit!(self, "this->fsml_retries_{} = 0;", block)?;
            }
        }

        match action {
            Action::Go(target) => {
                emit!(self, "this->fsml_state = {}_state_{};", name, machine.state(target)?.name)?;
            }

            Action::Err(label) => {
                let sink = machine.state(machine.sink()?)?;
                emit!(self, "this->fsml_error = {}_error_{};", name, machine.label(label)?)?;
                emit!(self, "this->fsml_state = {}_state_{};", name, sink.name)?;
            }

            Action::Retry(id) => {
                let BlockId(index) = id;
                let block = machine.block(id)?;

                emit!(self, "if (++this->fsml_retries_{} >= {}) {{", index, constant(&block.bound))?;
                self.output.depth += 1;
                emit!(self, "this->fsml_retries_{} = 0;", index)?;
                self.write_action(None, block.overflow)?;
                self.output.depth -= 1;

                emit!(self, "}} else {{")?;
                self.output.depth += 1;
                let first = machine.state(block.first)?;
                emit!(self, "this->fsml_state = {}_state_{};", name, first.name)?;
                self.output.depth -= 1;
                emit!(self, "}}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        codegen::{generate, Options},
        ir::Machine,
        lex, parse,
        sim::{Frame, Host, Simulator},
        source::Source,
    };

    fn machine_of(text: &str) -> Machine {
        let source = Source::new("m.fsml", text);
        let tokens = lex::tokenize(&source).expect("lexical errors");
        let program = parse::parse(tokens.iter(), source.start()).expect("syntax errors");

        program.resolve().expect("semantic errors").machine
    }

    fn step_of(text: &str) -> String {
        let machine = machine_of(text);
        let options = Options {
            line_directives: false,
            ..Options::default()
        };

        let code = generate(&machine, &options).expect("internal error");
        let start = code.find("void m_step").expect("no step function");
        code[start..].to_string()
    }

    #[test]
    fn transitions_in_order() {
        let step = step_of(
            "fsm m {\n\
             output int led {0};\n\
             timer t(100);\n\
             state [start] a { enter(); }\n\
             on (go_b()) { leave(); } go b start(t);\n\
             out led(1);\n\
             state [end] b on timeout(t) go a;\n\
             }",
        );

        let expected = "\
void m_step(struct m *this)
{
    unsigned long fsml_elapsed = m_period();

    if (this->fsml_running_t) {
        this->fsml_timer_t = this->fsml_timer_t > fsml_elapsed ? this->fsml_timer_t - fsml_elapsed : 0;
    }

    switch (this->fsml_state) {
    case m_state_a: {
        enter();
        if (go_b()) {
            leave();
            this->led = 1;
            this->fsml_timer_t = 100UL;
            this->fsml_running_t = 1;
            this->fsml_state = m_state_b;
            break;
        }
        this->led = 1;
        break;
    }
    case m_state_b: {
        if (this->fsml_running_t && this->fsml_timer_t == 0) {
            this->fsml_state = m_state_a;
            break;
        }
        break;
    }
    default:
        break;
    }
}
";

        assert_eq!(step, expected);
    }

    #[test]
    fn trailing_line_comments_keep_suffix() {
        let step = step_of(
            "fsm m {\n\
             input int x {0};\n\
             output int y {0};\n\
             state [start] a on (x > 0 // positive\n) go b;\n\
             out y(1 // one\n);\n\
             state [end] b\n\
             }",
        );

        let expected = "\
    case m_state_a: {
        if (this->x > 0 // positive
        ) {
            this->y = 1 // one
            ;
            this->fsml_state = m_state_b;
            break;
        }
        this->y = 1 // one
        ;
        break;
    }
";

        assert!(step.contains(expected), "{}", step);
    }

    #[test]
    fn retry_and_block_exit() {
        let step = step_of(
            "fsm m {\n\
             until (3) {\n\
             state [start] a on (fail()) retry; on (ok()) go b;\n\
             } err exhausted;\n\
             state [end] b\n\
             state [err] e\n\
             }",
        );

        let expected = "\
    case m_state_a: {
        if (fail()) {
            if (++this->fsml_retries_0 >= 3UL) {
                this->fsml_retries_0 = 0;
                this->fsml_error = m_error_exhausted;
                this->fsml_state = m_state_e;
            } else {
                this->fsml_state = m_state_a;
            }
            break;
        }
        if (ok()) {
            this->fsml_retries_0 = 0;
            this->fsml_state = m_state_b;
            break;
        }
        break;
    }
";

        assert!(step.contains(expected), "{}", step);
        assert!(step.contains("(void) fsml_elapsed;"));
    }

    const GUARDED_RETRY: &str = "fsm m {\n\
                                 timer t(100);\n\
                                 until (3) {\n\
                                 state [start] a on (fail()) retry; on (ok()) go b start(t);\n\
                                 } err exhausted;\n\
                                 state b on timeout(t) go c;\n\
                                 state [end] c\n\
                                 state [err] e\n\
                                 }";

    struct Script {
        failing: bool,
    }

    impl Host for Script {
        fn eval(&mut self, code: &str, _frame: &mut Frame<'_>) -> i64 {
            match code {
                "fail()" => self.failing as i64,
                "ok()" => !self.failing as i64,
                _ => 0,
            }
        }
    }

    #[test]
    fn retry_and_timeout_agree_with_simulator() {
        let expected = "\
void m_step(struct m *this)
{
    unsigned long fsml_elapsed = m_period();

    if (this->fsml_running_t) {
        this->fsml_timer_t = this->fsml_timer_t > fsml_elapsed ? this->fsml_timer_t - fsml_elapsed : 0;
    }

    switch (this->fsml_state) {
    case m_state_a: {
        if (fail()) {
            if (++this->fsml_retries_0 >= 3UL) {
                this->fsml_retries_0 = 0;
                this->fsml_error = m_error_exhausted;
                this->fsml_state = m_state_e;
            } else {
                this->fsml_state = m_state_a;
            }
            break;
        }
        if (ok()) {
            this->fsml_timer_t = 100UL;
            this->fsml_running_t = 1;
            this->fsml_retries_0 = 0;
            this->fsml_state = m_state_b;
            break;
        }
        break;
    }
    case m_state_b: {
        if (this->fsml_running_t && this->fsml_timer_t == 0) {
            this->fsml_state = m_state_c;
            break;
        }
        break;
    }
    case m_state_c: {
        break;
    }
    case m_state_e: {
        break;
    }
    default:
        break;
    }
}
";

        assert_eq!(step_of(GUARDED_RETRY), expected);

        let machine = machine_of(GUARDED_RETRY);

        // Tercer `retry`: desborde hacia el sumidero de errores
        let mut failing = Simulator::new(&machine, Script { failing: true }).unwrap();
        assert_eq!(failing.run(10).unwrap(), 3);
        assert_eq!((failing.state(), failing.error()), ("e", Some("exhausted")));
        assert_eq!(failing.retries(0), Some(0));

        // `timeout(t)` se cumple 100 pasos después de `start(t)`
        let mut waiting = Simulator::new(&machine, Script { failing: false }).unwrap();
        waiting.step().unwrap();
        for _ in 0..99 {
            waiting.step().unwrap();
            assert_eq!(waiting.state(), "b");
        }

        waiting.step().unwrap();
        assert_eq!(waiting.state(), "c");
    }
}
