//! Canonical startup wiring for experiment binaries.

use std::sync::Arc;

use anyhow::Result;
use kestrel_configuration::{Configurable, ParameterServer, Startup};

use crate::state::ApplicationState;

/// Wires an application through the startup sequence: register the state
/// and application trees, parse the command line, bind the configuration
/// document, run the post-binding hooks, and finally hand control to
/// `run`. Property values are guaranteed final before any hook runs, and
/// hooks run before `run`.
///
/// Returns [`Startup::Exit`] without calling `run` when the command line
/// requested an early-exit action (help, template creation, usage error).
///
/// # Errors
///
/// Registration clashes and fatal configuration-file problems propagate;
/// the latter are already logged with remediation hints.
pub fn run_application<A>(
    server: &ParameterServer,
    state: &Arc<ApplicationState>,
    app: &Arc<A>,
    args: impl IntoIterator<Item = String>,
    run: impl FnOnce() -> Result<()>,
) -> Result<Startup>
where
    A: Configurable + 'static,
{
    server.register_property_tree(state.clone())?;
    server.register_property_tree(app.clone())?;

    if server.parse_application_parameters(args)? == Startup::Exit {
        return Ok(Startup::Exit);
    }

    server.load_properties_from_configuration();
    server.initialize_property_dependent_variables();

    run()?;
    Ok(Startup::Continue)
}
