use clap::{Parser, Subcommand};
use std::process::exit;
use tracing::{error, info_span};

use sslcheck::config::{Config, ConfigError, LogConfig, SlackConfig, SslConfig, APP_NAME};
use sslcheck::inspect::VerifyMode;
use sslcheck::notify::{Deliver, Discard, MessageFormat, NotifyPolicy, Webhook};
use sslcheck::{logging, run};

#[derive(Parser)]
#[command(name = APP_NAME, version, about = "Check SSL certificate status for provided hosts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default is $HOME/.config/sslcheck.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// The domain names of the hosts to check, optionally with a port
    #[arg(long = "host")]
    hosts: Option<Vec<String>>,

    /// Connection timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Warning validity in days
    #[arg(long)]
    warning: Option<i64>,

    /// Critical validity in days
    #[arg(long)]
    critical: Option<i64>,

    /// Chain verification mode: skip or platform
    #[arg(long)]
    verify: Option<VerifyMode>,

    /// Send result to slack webhook
    #[arg(long)]
    slack: bool,

    /// Slack incoming webhook URL
    #[arg(long, env = "SSLCHECK_SLACK_HOOK_URL", hide_env_values = true)]
    hook_url: Option<String>,

    /// Which results are sent: escalations or all
    #[arg(long)]
    policy: Option<NotifyPolicy>,

    /// Message layout: attachments or blocks
    #[arg(long)]
    format: Option<MessageFormat>,

    /// Use console log writer
    #[arg(long, global = true)]
    console: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information
    Version,
    /// Print an example configuration file
    ExampleConfig,
}

impl Cli {
    fn to_config(&self) -> Config {
        Config {
            hosts: self.hosts.clone(),
            log: Some(LogConfig {
                console: self.console.then_some(true),
                verbose: self.verbose.then_some(true),
                level: self.log_level.clone(),
            }),
            ssl: Some(SslConfig {
                connect_timeout: self.timeout,
                warn_validity: self.warning,
                critical_validity: self.critical,
                verify: self.verify,
            }),
            slack: Some(SlackConfig {
                enabled: self.slack.then_some(true),
                hook_url: self.hook_url.clone(),
                policy: self.policy,
                format: self.format,
            }),
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let file_config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => match Config::default_path() {
            Some(path) if path.exists() => Config::from_file(path)?,
            _ => Config::default(),
        },
    };
    Ok(Config::defaults()
        .merge_with(file_config)
        .merge_with(cli.to_config()))
}

fn print_version() {
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "Build Time: {}",
        option_env!("SSLCHECK_BUILD_TIME").unwrap_or("unknown")
    );
    println!(
        "Git Commit: {}",
        option_env!("SSLCHECK_GIT_COMMIT").unwrap_or("unknown")
    );
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Version) => {
            print_version();
            return;
        }
        Some(Command::ExampleConfig) => {
            println!("{}", Config::example_toml());
            return;
        }
        None => {}
    }

    let settings = match load_config(&cli).and_then(Config::resolve) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    logging::init(&settings.log);
    let _root = info_span!("app", app = APP_NAME, version = env!("CARGO_PKG_VERSION")).entered();

    let sink: Box<dyn Deliver> = match (&settings.notify.hook_url, settings.notify.enabled) {
        (Some(url), true) => match Webhook::new(url.clone()) {
            Ok(webhook) => Box::new(webhook),
            Err(e) => {
                error!(error = %e, "exiting from fatal error");
                exit(1);
            }
        },
        _ => Box::new(Discard),
    };

    if let Err(e) = run(&settings, sink.as_ref()) {
        error!(error = %e, "exiting from fatal error");
        exit(1);
    }
}
