//! devprov - main entry point
//!
//! Resolves settings and the target user once, then hands the catalog to
//! the orchestrator and exits with the run's status.

use anyhow::Context;
use devprov::catalog::{self, CATALOG};
use devprov::cli::{Cli, Commands};
use devprov::command::{ProcessExecutor, ThreadSleeper};
use devprov::config::Settings;
use devprov::context::ProvisionContext;
use devprov::error::ProvisionError;
use devprov::step::Orchestrator;
use devprov::{logging, process_guard, sanity, user_context};
use tracing::{debug, error, info, warn};

/// Log any panic before the process goes down.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("Unexpected failure at {}: {}", location, message);
        default_hook(panic_info);
    }));
}

fn print_catalog() {
    println!("{:>3}  {:<24} CRITICALITY", "#", "STEP");
    for (index, entry) in CATALOG.iter().enumerate() {
        println!("{:>3}  {:<24} {}", index + 1, entry.label, entry.criticality);
    }
}

fn main() {
    let cli = Cli::parse_args();

    logging::init(cli.verbose);
    install_panic_hook();
    info!("devprov starting up");

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    if cli.command == Some(Commands::List) {
        print_catalog();
        return;
    }

    match provision(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let code = e
                .downcast_ref::<ProvisionError>()
                .map_or(1, ProvisionError::exit_code);
            error!("{:#} (exit code {})", e, code);
            std::process::exit(code);
        }
    }
}

/// Run the catalog and return the process exit code.
fn provision(cli: &Cli) -> anyhow::Result<i32> {
    let skipped = cli.skipped_labels()?;

    let settings = Settings::from_env();
    let skip_root_check = cli.skip_root_check || settings.skip_root_check;
    if cli.dry_run {
        info!("[DRY RUN] Skipping pre-flight checks");
    } else {
        sanity::run_preflight_checks(skip_root_check);
    }

    let user = user_context::resolve().context("Failed to resolve the target user")?;
    info!(
        "Target user: {} (home {})",
        user.username,
        user.home.display()
    );
    let running_as_target = user
        .uid
        .is_none_or(|uid| uid == nix::unistd::geteuid().as_raw());

    let executor = ProcessExecutor::new(settings.kill_grace);
    let sleeper = ThreadSleeper;
    let ctx = ProvisionContext::new(&settings, &user, running_as_target, &executor, &sleeper);

    let report = Orchestrator::new()
        .dry_run(cli.dry_run)
        .skip(skipped)
        .run(catalog::steps(&ctx));

    println!("{}", report.summary());
    let code = report.exit_code();
    if code == 0 {
        info!("Provisioning finished");
    } else {
        error!("Provisioning aborted (exit code {})", code);
    }
    Ok(code)
}
