use dispatcher::{Bindings, ServiceRegistry, connection_url};
use eavesdrop_config::{Config, Credentials};
use monitoring::logging;

/// Validates everything `listen` and `generate` would need, without connecting.
///
/// Service objects are really constructed, so their constructors run with the configured
/// params. For the built-in `JsonlSink` that means its file is created if missing.
///
/// Every problem is logged. The command fails if there was at least one.
pub fn run(config: &Config, bindings: &Bindings) -> Result<(), Error> {
    let problems = check(config, bindings, Credentials::from_env);
    if problems > 0 {
        return Err(Error::Problems(problems));
    }
    tracing::info!(
        channels = config.channel_names().count(),
        service_objects = config.service_objects.len(),
        "configuration is valid"
    );
    Ok(())
}

fn check<E>(
    config: &Config,
    bindings: &Bindings,
    credentials: impl FnOnce() -> Result<Credentials, E>,
) -> usize
where
    E: std::error::Error + 'static,
{
    let mut problems = 0;
    let globals = &config.globals;

    if let Err(err) = globals.validate_for_dispatch() {
        tracing::error!(error = %err, "invalid global settings");
        problems += 1;
    }

    match credentials() {
        Ok(credentials) => {
            if let Err(err) = connection_url(globals, &credentials) {
                tracing::error!(error = %err, error_source = logging::error_source(&err), "invalid database location");
                problems += 1;
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "missing database credentials");
            problems += 1;
        }
    }

    for name in config.channel_names() {
        let spec = match config.channel(name) {
            Ok(spec) => spec,
            Err(err) => {
                tracing::error!(channel = name, error = %err, error_source = logging::error_source(&err), "invalid channel");
                problems += 1;
                continue;
            }
        };
        if let Err(err) = codegen::render(&spec) {
            tracing::error!(channel = name, error = %err, "channel SQL cannot be rendered");
            problems += 1;
        }
        if let Err(err) = bindings
            .handlers
            .resolve(spec.handler_function(), &globals.handler_module)
        {
            tracing::error!(channel = name, error = %err, "unbound handler");
            problems += 1;
        }
    }

    if let Err(err) = ServiceRegistry::build(
        &config.service_objects,
        bindings.services.module(&globals.service_module),
    ) {
        tracing::error!(
            name = err.name(),
            class = err.class_name(),
            error = %err, error_source = logging::error_source(&err),
            "service object cannot be constructed"
        );
        problems += 1;
    }

    problems
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("found {0} configuration problem(s), see the log for details")]
    Problems(usize),
}
