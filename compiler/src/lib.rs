mod args;
pub mod config;
mod error;
pub mod io;
pub mod ir;
pub mod passes;
pub mod transform;
mod utils;

use std::path::Path;

use anyhow::Context;
use clap::Parser;

use common::{log_error, log_info, log_warn};

pub use args::Args;
pub use error::{InstrumentError, Result};

use crate::config::{InstrumenterConfig, ReturnAssertionPolicy};
use crate::ir::{link::link_in, verify::verify_module, Module};
use crate::passes::{CalleeInstrumenter, CallerInstrumenter, ModulePass, ModulePassLogExt};
use crate::transform::InstrumentationContext;
use crate::utils::chain;

pub mod constants {
    pub(crate) const CONFIG_FILENAME: &str = "vasi_config";
    pub(crate) const CONFIG_ENV_PREFIX: &str = "VASI";

    pub const LOG_ENV: &str = "VASI_LOG";

    pub(crate) const TOOL_NAME: &str = "vasi";
}

/// Knobs of one instrumentation run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub return_assertions: ReturnAssertionPolicy,
    pub verify_each: bool,
    pub print_each: bool,
}

impl Options {
    fn new(config: &InstrumenterConfig, args: &Args) -> Self {
        Self {
            return_assertions: config.return_assertions,
            verify_each: config.verify_each || args.verify_each,
            print_each: config.print_each || args.print_each,
        }
    }
}

/// Runs the callee and the caller instrumentation on a module that is
/// already linked with the assertion library, then verifies the result.
pub fn instrument(module: &mut Module, options: &Options) -> Result<()> {
    let mut cx = InstrumentationContext::new(options.return_assertions);
    let mut pass = chain!(
        CalleeInstrumenter::default()
            .into_logged()
            .verified(options.verify_each)
            .printed(options.print_each),
        CallerInstrumenter::default()
            .into_logged()
            .verified(options.verify_each)
            .printed(options.print_each),
    );
    pass.run(module, &mut cx)?;
    verify_module(module)?;
    Ok(())
}

pub fn run_instrumenter<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let args = match Args::try_parse_from(args) {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return err.exit_code();
        }
    };
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => 0,
        Err(err) => {
            log_error!("Instrumentation failed: {err:?}");
            eprintln!("{}: {err:#}", constants::TOOL_NAME);
            1
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = config::load_config().context("Failed to load the configurations")?;
    let options = Options::new(&config, args);

    let mut module = io::load_module(&args.input)?;
    log_info!("Loaded module `{}`", module.name);

    let library_path = args.assertions.as_deref().or(config.library_path.as_deref());
    if let Some(path) = library_path {
        link_library(&mut module, path)?;
    } else {
        log_warn!("No assertion library given, routines are expected in the module itself");
    }

    instrument(&mut module, &options)
        .with_context(|| format!("Failed to instrument `{}`", args.input.display()))?;

    let form = args.output_form();
    if io::writes_binary_to_terminal(&args.output, form) && !args.force {
        log_warn!("Refusing to write the binary form to a terminal");
        eprintln!(
            "{}: refusing to write the binary form to a terminal, use `-S` for the listing or `-f` to force it",
            constants::TOOL_NAME
        );
        return Ok(());
    }
    io::write_module(&module, &args.output, form)
}

fn link_library(module: &mut Module, path: &Path) -> anyhow::Result<()> {
    let library = io::load_module(path)?;
    log_info!("Linking with assertion library `{}`", library.name);
    link_in(module, library)
        .with_context(|| format!("Failed to link with `{}`", path.display()))
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{
        filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
    };

    let default_level = if verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var(constants::LOG_ENV)
        .from_env_lossy();

    let fmt_layer = fmt::layer().with_writer(std::io::stderr);

    // Ignored when a subscriber is already installed, e.g. by a test harness.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
