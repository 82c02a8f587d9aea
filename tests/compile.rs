use fsmlc::{
    codegen::Options,
    compile,
    error::{Diagnostics, Kind, Severity},
    source::Source,
    Compilation, CompileError,
};

const TRAFFIC: &str = r#"decl {
#define RED_MS 3000
}

time { return millis(); }

fsm traffic {
    input int emergency {0};
    output int lamp {0};
    var unsigned int cycles {0};
    timer hold(RED_MS);

    state [start] red { cycles++; }
        on (emergency) err override;
        on timeout(hold) go green;
        out lamp(1);

    state green
        on (cycles > 10) go off;
        on (1) go red start(hold);
        out lamp(2);

    state [end] off
    state [err] fault
}
"#;

fn options() -> Options {
    Options {
        source_name: String::from("traffic.fsml"),
        output_name: String::from("traffic.c"),
        line_directives: true,
    }
}

fn compile_text(text: &str) -> Result<Compilation, CompileError> {
    compile(&Source::new("traffic.fsml", text), &options())
}

fn rejected(text: &str) -> Diagnostics {
    match compile_text(text) {
        Err(CompileError::Rejected(diagnostics)) => diagnostics,
        Err(CompileError::Internal(error)) => panic!("internal error: {}", error),
        Ok(compilation) => panic!("unexpectedly compiled:\n{}", compilation.code),
    }
}

#[test]
fn full_program() {
    let Compilation { code, warnings } = compile_text(TRAFFIC).unwrap_or_else(|error| panic!("{}", error));

    assert!(warnings.is_empty(), "{}", warnings);
    assert!(code.starts_with("/* Generated by fsmlc from traffic.fsml, do not edit. */\n"));
    assert!(code.contains("#define RED_MS 3000"));
    assert!(code.contains("static unsigned long traffic_time(void)"));
    assert!(code.contains("void traffic_init(struct traffic *this)"));
    assert!(code.contains("int traffic_finished(const struct traffic *this)"));
    assert!(code.contains("void traffic_step(struct traffic *this)"));
    assert!(code.contains("this->cycles++;"));
    assert!(code.contains("if (this->emergency) {"));
    assert!(code.contains("this->fsml_timer_hold = RED_MS;"));
    assert!(code.contains("this->fsml_error = traffic_error_override;"));
    assert!(code.contains("#line 13 \"traffic.fsml\""));
}

#[test]
fn states_in_declaration_order() {
    let code = compile_text(TRAFFIC).unwrap_or_else(|error| panic!("{}", error)).code;
    let positions: Vec<usize> = ["red", "green", "off", "fault"]
        .iter()
        .map(|state| code.find(&format!("    traffic_state_{},\n", state)).expect("missing enumerator"))
        .collect();

    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn output_is_deterministic() {
    let first = compile_text(TRAFFIC).unwrap_or_else(|error| panic!("{}", error)).code;
    let second = compile_text(TRAFFIC).unwrap_or_else(|error| panic!("{}", error)).code;

    assert_eq!(first.as_bytes(), second.as_bytes());
}

#[test]
fn multiple_start_states() {
    let diagnostics = rejected("fsm m {\nstate [start] a\nstate [start, end] b\n}");
    let entry = diagnostics.iter().next().unwrap();

    assert_eq!(diagnostics.errors(), 1);
    assert_eq!(entry.kind(), Kind::Semantic);
    assert!(entry.message().contains("multiple start states"));
    assert!(diagnostics.to_string().contains("Build failed with 1 error"));
}

#[test]
fn unknown_target_is_located() {
    let diagnostics = rejected("fsm m {\nstate [start, end] a\n    on (1) go nowhere;\n}");
    let entry = diagnostics.iter().next().unwrap();

    assert_eq!(entry.message(), "State `nowhere` is undefined");
    assert_eq!((entry.line(), entry.column()), (3, 15));
}

#[test]
fn output_in_condition() {
    let diagnostics = rejected("fsm m {\noutput int led {0};\nstate [start, end] a on (led) go a;\n}");
    let messages: Vec<String> = diagnostics.iter().map(|entry| entry.message()).collect();

    assert_eq!(messages, vec!["Output variable `led` cannot be read in a condition"]);
}

#[test]
fn every_lexical_error_is_reported() {
    let diagnostics = rejected("fsm m {\nstate @ a\nstate $ b\n}");

    assert_eq!(diagnostics.errors(), 2);
    assert!(diagnostics.iter().all(|entry| entry.kind() == Kind::Lexical));
}

#[test]
fn syntax_errors_stop_before_analysis() {
    let diagnostics = rejected("fsm m {\nstate a on (x) go;\nstate [start] a\n}");

    assert!(diagnostics.iter().all(|entry| entry.kind() == Kind::Syntax));
    assert_eq!(diagnostics.iter().next().unwrap().line(), 2);
}

#[test]
fn warnings_do_not_block_output() {
    let Compilation { code, warnings } =
        compile_text("fsm m {\nstate [start, end] a\nstate lonely\n}").unwrap_or_else(|error| panic!("{}", error));

    assert!(code.contains("m_state_lonely"));
    assert_eq!(warnings.warnings(), 1);

    let warning = warnings.iter().next().unwrap();
    assert_eq!(warning.severity(), Severity::Warning);
    assert_eq!(warning.message(), "State `lonely` is unreachable from the start state");
}

#[test]
fn without_line_directives() {
    let options = Options {
        line_directives: false,
        ..options()
    };

    let code = compile(&Source::new("traffic.fsml", TRAFFIC), &options)
        .unwrap_or_else(|error| panic!("{}", error))
        .code;

    assert!(!code.contains("#line"));
}

#[test]
fn pointer_variables() {
    let code = compile_text("fsm m {\nvar const char *greeting {\"hi\"};\nstate [start, end] a\n}")
        .unwrap_or_else(|error| panic!("{}", error))
        .code;

    assert!(code.contains("    const char* greeting;\n"), "{}", code);
    assert!(code.contains("    this->greeting = \"hi\";\n"), "{}", code);
}
