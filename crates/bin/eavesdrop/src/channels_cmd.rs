use std::io::{self, Write};

use eavesdrop_config::Config;

/// Prints one line per configured channel with the names its SQL resolves to
pub fn run(config: &Config) -> io::Result<()> {
    let stdout = io::stdout();
    list(config, &mut stdout.lock())
}

fn list(config: &Config, out: &mut impl Write) -> io::Result<()> {
    for name in config.channel_names() {
        match config.channel(name) {
            Ok(spec) => writeln!(
                out,
                "{name}\t{op} on {schema}.{table}\tprocedure={procedure}\ttrigger={trigger}\thandler={handler}",
                op = spec.operation(),
                schema = spec.schema(),
                table = spec.table_name(),
                procedure = spec.procedure_name(),
                trigger = spec.trigger_name(),
                handler = spec.handler_function().unwrap_or(dispatcher::DEFAULT_HANDLER),
            )?,
            Err(err) => writeln!(out, "{name}\tinvalid: {}", error_with_source(&err))?,
        }
    }
    Ok(())
}

fn error_with_source(err: &dyn std::error::Error) -> String {
    match err.source() {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    }
}
