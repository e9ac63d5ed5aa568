//! Host provisioner - Entry Point
//!
//! One provisioning pass per invocation: configuration, platform detection, installation,
//! artifact deployment, database migration and process supervision.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use provisioner::app::options::{parse_args, RunOptions};
use provisioner::app::run::run;
use provisioner::config::settings::LoadContext;
use provisioner::exec::runner::SystemRunner;
use provisioner::logs::init_logging;
use provisioner::platform::detect::HostOs;
use provisioner::report::{report_failure, Fatal};
use provisioner::trace;
use provisioner::utils::version_info;

#[tokio::main]
async fn main() {
    let cli_args = parse_args(env::args());

    // The default configuration file sits next to the executable
    let exe_dir = env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let options = match RunOptions::from_args(&cli_args, &exe_dir) {
        Ok(options) => options,
        Err(e) => std::process::exit(report_failure(&Fatal::new("options", trace!(), e))),
    };

    // Print version and exit
    let version = version_info();
    if options.show_version {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{} {}", version.name, version.version),
        }
        return;
    }

    // Initialize logging
    let guard = match init_logging(&options.log) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let cwd = match env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => std::process::exit(report_failure(&Fatal::new("startup", trace!(), e.into()))),
    };
    let ctx = LoadContext {
        cwd,
        env: process_env(),
    };
    let runner = SystemRunner::new(env::var_os("PATH").as_deref());

    info!("Running provisioner {}", version.version);
    match run(&runner, HostOs::current(), &options.config_path, &ctx, Local::now()).await {
        Ok(summary) => summary.print(),
        Err(fatal) => {
            let status = report_failure(&fatal);
            drop(guard);
            std::process::exit(status);
        }
    }
}

/// Snapshot of the process environment, skipping entries that are not valid UTF-8
fn process_env() -> HashMap<String, String> {
    env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}
