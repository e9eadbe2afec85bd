// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result};
use config::Config;
use runtime::ChannelRuntime;
use std::env;
use std::path::PathBuf;
use tabletalk_app::AppState;
use tabletalk_session::{HttpChannel, Session, validate_endpoint};
use tabletalk_testkit::ScriptedChannel;
use tabletalk_tui::UiOptions;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `tabletalk --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let endpoint = match &options.endpoint {
        Some(endpoint) => validate_endpoint(endpoint)?,
        None => config.endpoint().to_owned(),
    };
    let timeout = config.timeout()?;
    if options.check_only {
        return Ok(());
    }

    let mut state = AppState::default();
    let ui = UiOptions {
        page_size: config.page_size(),
    };

    if options.demo {
        let mut runtime = ChannelRuntime::new(Session::new(ScriptedChannel::connected()));
        return tabletalk_tui::run_app(&mut state, &mut runtime, ui);
    }

    let channel = HttpChannel::connect(&endpoint, timeout).with_context(|| {
        format!("connect to {endpoint} -- if this address is wrong, set [connection].endpoint")
    })?;
    let mut runtime = ChannelRuntime::new(Session::new(channel));
    tabletalk_tui::run_app(&mut state, &mut runtime, ui)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    endpoint: Option<String>,
    print_config_path: bool,
    print_example: bool,
    check_only: bool,
    demo: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        endpoint: None,
        print_config_path: false,
        print_example: false,
        check_only: false,
        demo: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--endpoint" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--endpoint requires a URL"))?;
                options.endpoint = Some(value.as_ref().to_owned());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow::anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("tabletalk");
    println!("  --config <path>          Use a specific config path");
    println!("  --endpoint <url>         Override [connection].endpoint for this run");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config and endpoint, then exit");
    println!("  --demo                   Launch against a canned in-process server");
    println!("  --help                   Show this help");
}
