mod display;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use courtlot_browser::{LaunchOptions, WebDriverBrowser};
use courtlot_core::{LotterySetting, Progress};
use courtlot_dispatch::{ApplyOptions, ProgressFn, Tally};
use courtlot_host::Lottery;
use courtlot_site::{BrowserSessionFactory, DEFAULT_BASE_URL, SiteConfig};
use courtlot_store::{
    DEFAULT_PROFILE_ID, DataDir, FileLogs, Profile, default_root, import_members_csv, read_json,
};

/// Tennis-court lottery batch runner.
#[derive(Parser)]
#[command(name = "courtlot", version, about = "Apply for court lotteries for a roster of members")]
struct Cli {
    /// Data directory holding profiles, rosters, settings and logs
    #[arg(long, global = true, env = "COURTLOT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// WebDriver server endpoint
    #[arg(
        long,
        global = true,
        env = "COURTLOT_WEBDRIVER_URL",
        default_value = "http://localhost:9515"
    )]
    webdriver_url: String,

    /// Booking site entry page
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    site_url: String,

    /// Run browsers without a window
    #[arg(long, global = true)]
    headless: bool,

    /// Number of concurrent browser sessions (default depends on the command)
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// How many "next week" pages to search for a target date
    #[arg(long, global = true, default_value_t = ApplyOptions::default().max_week_pages)]
    max_week_pages: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Distribute the roster over the lottery targets and apply
    Apply {
        #[arg(long, default_value = DEFAULT_PROFILE_ID)]
        profile: String,
        /// Lottery setting JSON; defaults to the profile's saved setting
        #[arg(long)]
        setting: Option<PathBuf>,
    },

    /// Re-apply lottery numbers START..=END from the last lottery info CSV
    ApplyRange { start: u32, end: u32 },

    /// Write the lottery info CSV without applying
    Distribute {
        #[arg(long, default_value = DEFAULT_PROFILE_ID)]
        profile: String,
        #[arg(long)]
        setting: Option<PathBuf>,
    },

    /// Confirm won lottery results for every member
    Results {
        #[arg(long, default_value = DEFAULT_PROFILE_ID)]
        profile: String,
    },

    /// Read entries, results and reservations for every member
    Status {
        #[arg(long, default_value = DEFAULT_PROFILE_ID)]
        profile: String,
    },

    /// Manage profiles
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Manage rosters
    Members {
        #[command(subcommand)]
        command: MemberCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    List,
    Add { id: String, name: String },
    Delete { id: String },
}

#[derive(Subcommand)]
enum MemberCommands {
    /// Replace the profile's roster with an `ID,PW,名前` CSV
    Import {
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_PROFILE_ID)]
        profile: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    tracing::info!("courtlot v{}", env!("CARGO_PKG_VERSION"));

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run one command; `Ok(false)` means it finished with failed members.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let root = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => default_root()?,
    };
    let data = DataDir::open(&root).with_context(|| format!("opening {}", root.display()))?;

    match cli.command {
        Commands::Profiles { ref command } => profiles(&data, command),
        Commands::Members {
            command: MemberCommands::Import {
                ref file,
                ref profile,
            },
        } => {
            let members = import_members_csv(file)?;
            data.save_members(profile, &members)?;
            println!("Imported {} members into {profile}", members.len());
            Ok(true)
        }
        Commands::Apply {
            ref profile,
            ref setting,
        } => {
            let lottery = lottery(&cli, data);
            let setting = load_setting(&lottery, profile, setting.as_ref())?;
            let run = lottery
                .execute_lottery(profile, &setting, Some(progress()))
                .await?;
            display::print_apply(&run);
            Ok(run.succeeded())
        }
        Commands::ApplyRange { start, end } => {
            let lottery = lottery(&cli, data);
            let run = lottery.apply_range(start, end, Some(progress())).await?;
            display::print_apply(&run);
            Ok(run.succeeded())
        }
        Commands::Distribute {
            ref profile,
            ref setting,
        } => {
            let lottery = lottery(&cli, data);
            let setting = load_setting(&lottery, profile, setting.as_ref())?;
            let members = lottery.data().load_members(profile)?;
            let assignments = lottery.distribute_only(&members, &setting)?;
            display::print_distribution(&assignments);
            println!("Written to {}", lottery.data().lottery_info_path().display());
            Ok(true)
        }
        Commands::Results { ref profile } => {
            let lottery = lottery(&cli, data);
            let reports = lottery.confirm_results(profile, Some(progress())).await?;
            display::print_results(&reports);
            Ok(Tally::of(&reports).all_succeeded())
        }
        Commands::Status { ref profile } => {
            let lottery = lottery(&cli, data);
            let report = lottery.application_status(profile, Some(progress())).await?;
            display::print_status(&report);
            println!("Written to {}", lottery.data().status_path().display());
            Ok(report.login_failed.is_empty() && report.errors.is_empty())
        }
    }
}

fn lottery(cli: &Cli, data: DataDir) -> Lottery {
    let options = LaunchOptions {
        headless: cli.headless,
        ..LaunchOptions::default()
    };
    let config = SiteConfig {
        base_url: cli.site_url.clone(),
        ..SiteConfig::default()
    };
    let browser = WebDriverBrowser::new(cli.webdriver_url.clone(), options)
        .with_action_timeout(config.ui_timeout)
        .with_page_load_timeout(config.load_timeout);
    let sessions = BrowserSessionFactory::new(Arc::new(browser), config);
    let logs = FileLogs::new(data.logs_dir());
    Lottery::new(data, Arc::new(sessions), Arc::new(logs))
        .with_concurrency(cli.concurrency)
        .with_apply_options(ApplyOptions {
            max_week_pages: cli.max_week_pages,
        })
}

fn load_setting(
    lottery: &Lottery,
    profile: &str,
    path: Option<&PathBuf>,
) -> anyhow::Result<LotterySetting> {
    match path {
        Some(path) => read_json(path).with_context(|| format!("reading {}", path.display())),
        None => lottery.load_setting(profile),
    }
}

fn progress() -> ProgressFn {
    Arc::new(|p: Progress| {
        eprintln!("[{:>3}%] {}/{} {}", p.percent, p.current, p.total, p.message);
    })
}

fn profiles(data: &DataDir, command: &ProfileCommands) -> anyhow::Result<bool> {
    match command {
        ProfileCommands::List => {
            for profile in data.load_profiles()? {
                println!("{}\t{}", profile.id, profile.name);
            }
        }
        ProfileCommands::Add { id, name } => {
            let mut profiles = data.load_profiles()?;
            if profiles.iter().any(|p| &p.id == id) {
                anyhow::bail!("profile {id} already exists");
            }
            profiles.push(Profile::new(id.clone(), name.clone()));
            data.save_profiles(&profiles)?;
            println!("Added profile {id}");
        }
        ProfileCommands::Delete { id } => {
            if id == DEFAULT_PROFILE_ID {
                anyhow::bail!("the default profile cannot be deleted");
            }
            data.delete_profile(id)?;
            println!("Deleted profile {id}");
        }
    }
    Ok(true)
}
