use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use appium_harness::driver::hierarchy;
use appium_harness::report::{self, ConsoleReporter, ReportSink};
use appium_harness::runner::{self, smoke::SmokeScenario, HarnessContext, Scenario};
use appium_harness::utils::config::{ConfigProvider, Settings};

#[derive(Parser)]
#[command(name = "appium-harness")]
#[command(version = "0.1.0")]
#[command(about = "Android end-to-end test harness on top of Appium", long_about = None)]
struct Cli {
    /// Settings file (.properties or .yaml); searched for when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override a setting, e.g. -D use.external.appium=true (repeatable)
    #[arg(short = 'D', value_name = "KEY=VALUE", global = true)]
    define: Vec<String>,

    /// Output directory for reports and attachments
    #[arg(short, long, default_value = "./output", global = true)]
    output: PathBuf,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a session, check the app and walk the restart path
    Smoke {
        /// Only run scenarios with one of these tags (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Print app state and current activity
    Status {
        /// Also summarize the current page source
        #[arg(long)]
        source: bool,
    },

    /// Print the resolved settings
    Config,

    /// Convert saved results to another format
    Report {
        /// Path to results.json
        results: PathBuf,

        /// Output format (junit, json, all)
        #[arg(short, long, default_value = "junit")]
        format: String,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn load_settings(config: Option<&Path>, overrides: &[String]) -> anyhow::Result<Settings> {
    let mut provider = match config {
        Some(path) => ConfigProvider::load(path)?,
        None => ConfigProvider::discover()?,
    };
    provider.apply_override_args(overrides)?;
    if let Some(source) = provider.source() {
        log::info!("Loaded settings from {}", source.display());
    }
    Settings::from_provider(&provider)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Smoke { tags } => {
            let settings = load_settings(cli.config.as_deref(), &cli.define)?;
            println!(
                "{} Running smoke check against {}",
                "▶".green().bold(),
                settings.app_package.cyan()
            );

            let reporter: Arc<dyn ReportSink> =
                Arc::new(ConsoleReporter::new(cli.verbose > 0).with_output_dir(cli.output.clone()));
            let mut ctx = HarnessContext::production(settings, reporter);
            let scenarios: Vec<Box<dyn Scenario>> = vec![Box::new(SmokeScenario)];

            let results = runner::run_suite(&mut ctx, "Smoke", &scenarios, &tags).await;
            report::write_reports(&results, &cli.output)?;

            if !results.all_passed() {
                anyhow::bail!(
                    "{} of {} scenario(s) failed",
                    results.summary.failed,
                    results.summary.total
                );
            }
            println!("\n{} All scenarios passed", "✅".green().bold());
        }

        Commands::Status { source } => {
            let settings = load_settings(cli.config.as_deref(), &cli.define)?;
            let package = settings.app_package.clone();
            let reporter: Arc<dyn ReportSink> = Arc::new(ConsoleReporter::new(cli.verbose > 0));
            let mut ctx = HarnessContext::production(settings, reporter);

            let result = print_status(&mut ctx, &package, source).await;
            ctx.quit_driver().await;
            if let Err(e) = ctx.stop_server().await {
                eprintln!("  {} Failed to stop Appium server: {:#}", "⚠️".yellow(), e);
            }
            result?;
        }

        Commands::Config => {
            let settings = load_settings(cli.config.as_deref(), &cli.define)?;
            println!("{}", "Resolved settings".bold());
            for (key, value) in settings.describe() {
                println!("  {:<28} {}", key.cyan(), value);
            }
        }

        Commands::Report { results, format } => {
            println!(
                "{} Generating {} report from: {}",
                "📊".to_string().blue(),
                format.cyan(),
                results.display()
            );
            report::generate_report(&results, &format, &cli.output)?;
        }
    }

    Ok(())
}

async fn print_status(ctx: &mut HarnessContext, package: &str, source: bool) -> anyhow::Result<()> {
    ctx.start_server().await?;
    ctx.create_driver().await?;
    let driver = ctx.driver()?;

    let state = driver.query_app_state(package).await?;
    let activity = driver.current_activity().await?;
    println!("  {:<18} {}", "Session".cyan(), driver.session_id());
    println!("  {:<18} {}", "App state".cyan(), state);
    println!("  {:<18} {}", "Current activity".cyan(), activity);

    if source {
        let xml = driver.page_source().await?;
        let nodes = hierarchy::parse_page_source(&xml)?;
        println!("  {:<18} {}", "Screen".cyan(), hierarchy::summarize(&nodes, 25));
    }
    Ok(())
}
