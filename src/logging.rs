// SPDX-License-Identifier: GPL-3.0-only

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `quiet` limits output to errors. `json` switches the stderr formatter to
/// one JSON object per event.
pub fn init_logging(quiet: bool, json: bool) {
    let directive = if quiet {
        "window_snapshot=error"
    } else {
        "window_snapshot=info"
    };

    let filter = match directive.parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(err) = result {
        eprintln!("logging already initialised: {err}");
    }
}
