/// Emite una línea de C con la indentación vigente.
macro_rules! emit {
    ($unit:expr) => {
        writeln!($unit.output).map_err($crate::ir::InternalError::from)
    };

    ($unit:expr, $($format:tt)*) => {{
        $unit.output.indent()?;
        writeln!($unit.output, $($format)*).map_err($crate::ir::InternalError::from)
    }};
}
