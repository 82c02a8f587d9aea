use fsmlc::{
    ir::Machine,
    sim::{Frame, Host, Simulator},
    source::Source,
};

fn machine(text: &str) -> Machine {
    let source = Source::new("test.fsml", text);
    match fsmlc::analyze(&source) {
        Ok((machine, _)) => machine,
        Err(errors) => panic!("{}", errors),
    }
}

fn operand(word: &str, frame: &Frame<'_>) -> i64 {
    word.parse()
        .ok()
        .or_else(|| frame.get(word))
        .unwrap_or_else(|| panic!("unknown operand `{}`", word))
}

/// Evaluador mínimo: literales, `return x;` y comparaciones `a op b`.
fn eval(code: &str, frame: &mut Frame<'_>) -> i64 {
    let words: Vec<&str> = code.trim_end_matches(';').split_whitespace().collect();
    match words.as_slice() {
        [word] | ["return", word] => operand(word, frame),
        [left, op, right] => {
            let (left, right) = (operand(left, frame), operand(right, frame));
            let holds = match *op {
                ">" => left > right,
                "<" => left < right,
                "==" => left == right,
                _ => panic!("unsupported operator `{}`", op),
            };

            holds as i64
        }

        _ => panic!("unsupported fragment `{}`", code),
    }
}

const GUARDS: &str = "
fsm guards {
    input int value {0};

    state [start] firstState
        on (value > 0) go secondState;
        on (value == 0) go thirdState;
        on (value < -9) err tooLow;

    state [end] secondState
    state [end] thirdState
    state [err] rejected
}
";

fn guarded(value: i64) -> (String, Option<String>, bool) {
    let machine = machine(GUARDS);
    let mut simulator = Simulator::new(&machine, eval).unwrap();

    assert!(simulator.set("value", value));
    simulator.step().unwrap();

    (
        simulator.state().to_string(),
        simulator.error().map(str::to_string),
        simulator.finished().unwrap(),
    )
}

#[test]
fn guards_select_the_target() {
    assert_eq!(guarded(5), ("secondState".to_string(), None, true));
    assert_eq!(guarded(0), ("thirdState".to_string(), None, true));
    assert_eq!(guarded(-10), ("rejected".to_string(), Some("tooLow".to_string()), true));
}

#[test]
fn no_guard_holds() {
    let machine = machine(GUARDS);
    let mut simulator = Simulator::new(&machine, eval).unwrap();
    simulator.set("value", -1);

    for _ in 0..5 {
        simulator.step().unwrap();
        assert_eq!(simulator.state(), "firstState");
    }

    assert!(!simulator.finished().unwrap());
    assert_eq!(simulator.run(20).unwrap(), 20);
}

#[test]
fn first_true_transition_wins() {
    let machine = machine(
        "fsm order {
            input int value {5};
            state [start] a
                on (value > 1) go b;
                on (value > 0) go c;
            state [end] b
            state [end] c
        }",
    );

    let mut simulator = Simulator::new(&machine, eval).unwrap();
    assert_eq!(simulator.run(10).unwrap(), 1);
    assert_eq!(simulator.state(), "b");
}

#[test]
fn until_overflow_on_third_retry() {
    let machine = machine(
        "fsm retrying {
            input int ok {0};
            until (3) {
                state [start] attempt
                    on (ok == 1) go done;
                    on (ok == 0) retry;
            } err exhausted;
            state [end] done
            state [err] failed
        }",
    );

    let mut simulator = Simulator::new(&machine, eval).unwrap();

    simulator.step().unwrap();
    assert_eq!((simulator.state(), simulator.retries(0)), ("attempt", Some(1)));

    simulator.step().unwrap();
    assert_eq!((simulator.state(), simulator.retries(0)), ("attempt", Some(2)));

    simulator.step().unwrap();
    assert_eq!(simulator.state(), "failed");
    assert_eq!(simulator.error(), Some("exhausted"));
    assert_eq!(simulator.retries(0), Some(0));
    assert!(simulator.finished().unwrap());
}

#[test]
fn retry_counters_are_per_block() {
    let machine = machine(
        "fsm blocks {
            input int ok {0};
            until (3) {
                state [start] first
                    on (ok == 1) go second;
                    on (ok == 0) retry;
            } err firstExhausted;
            until (3) {
                state second
                    on (ok == 2) go done;
                    on (ok == 1) retry;
            } err secondExhausted;
            state [end] done
            state [err] failed
        }",
    );

    let mut simulator = Simulator::new(&machine, eval).unwrap();

    simulator.step().unwrap();
    simulator.step().unwrap();
    assert_eq!((simulator.retries(0), simulator.retries(1)), (Some(2), Some(0)));

    // Salir del bloque reinicia su contador
    simulator.set("ok", 1);
    simulator.step().unwrap();
    assert_eq!(simulator.state(), "second");
    assert_eq!((simulator.retries(0), simulator.retries(1)), (Some(0), Some(0)));

    simulator.step().unwrap();
    simulator.step().unwrap();
    assert_eq!(simulator.state(), "second");
    assert_eq!((simulator.retries(0), simulator.retries(1)), (Some(0), Some(2)));

    simulator.set("ok", 2);
    simulator.step().unwrap();
    assert_eq!(simulator.state(), "done");
    assert_eq!(simulator.retries(1), Some(0));
    assert_eq!(simulator.error(), None);
}

#[test]
fn outputs_persist() {
    let machine = machine(
        "fsm lamp {
            input int button {1};
            output int led {7};

            state [start] first
                on (button == 1) go second;
                out led(3);

            state second
                on (button == 2) go third;

            state third
                on (button == 3) go done;
                out led(9);

            state [end] done
        }",
    );

    let mut simulator = Simulator::new(&machine, eval).unwrap();
    assert_eq!(simulator.value("led"), Some(7));

    // `out` también se ejecuta al disparar una transición
    simulator.step().unwrap();
    assert_eq!((simulator.state(), simulator.value("led")), ("second", Some(3)));

    // `second` no asigna, el valor de `first` persiste
    for _ in 0..3 {
        simulator.step().unwrap();
        assert_eq!((simulator.state(), simulator.value("led")), ("second", Some(3)));
    }

    simulator.set("button", 2);
    simulator.step().unwrap();
    assert_eq!((simulator.state(), simulator.value("led")), ("third", Some(3)));

    // y cuando ninguna condición se cumple
    simulator.step().unwrap();
    assert_eq!((simulator.state(), simulator.value("led")), ("third", Some(9)));

    simulator.set("button", 3);
    simulator.step().unwrap();
    assert_eq!((simulator.state(), simulator.value("led")), ("done", Some(9)));
}

#[test]
fn timeout_with_unit_period() {
    let machine = machine(
        "period { return 1; }
        fsm delay {
            timer t(100);
            state [start] arm on (1) go wait start(t);
            state wait on timeout(t) go done;
            state [end] done
        }",
    );

    let mut simulator = Simulator::new(&machine, eval).unwrap();
    simulator.step().unwrap();
    assert_eq!(simulator.state(), "wait");

    for _ in 0..99 {
        simulator.step().unwrap();
        assert_eq!(simulator.state(), "wait");
    }

    simulator.step().unwrap();
    assert_eq!(simulator.state(), "done");
}

struct Wall {
    now: i64,
}

impl Host for Wall {
    fn eval(&mut self, code: &str, frame: &mut Frame<'_>) -> i64 {
        match code {
            "return now();" => self.now,
            _ => eval(code, frame),
        }
    }
}

#[test]
fn timeout_with_wall_clock() {
    let machine = machine(
        "time { return now(); }
        fsm delay {
            timer t(100);
            state [start] arm on (1) go wait start(t);
            state wait on timeout(t) go done;
            state [end] done
        }",
    );

    let mut simulator = Simulator::new(&machine, Wall { now: 0 }).unwrap();

    for (now, state) in [(10, "wait"), (60, "wait"), (109, "wait"), (110, "done")] {
        simulator.host().now = now;
        simulator.step().unwrap();
        assert_eq!(simulator.state(), state, "at time {}", now);
    }
}
