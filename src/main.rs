mod agent;
mod config;
mod fix;
mod github;
mod history;
mod report;
mod response;
mod session;

use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use agent::{AgentClient, Credentials, Transport};
use fix::FixOutcome;
use github::GithubClient;
use history::History;

/// issue-medic: list GitHub issues and hand them to an AI fix agent,
/// rendering whatever structured or streamed response comes back.
#[derive(Parser, Debug)]
#[command(name = "issue-medic", version, about)]
struct Cli {
    /// Repository as owner/repo (default: config, then the origin remote)
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Agent endpoint URL (overrides .issue-medic.toml)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// How the agent delivers its response
    #[arg(long, global = true, value_enum)]
    transport: Option<Transport>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List open issues
    Issues,
    /// Show one issue
    Show { number: u64 },
    /// Send issues to the fix agent, one after another
    Fix {
        #[arg(required = true)]
        numbers: Vec<u64>,

        /// Write each response as markdown instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decode a saved agent payload offline
    Parse {
        file: PathBuf,

        /// Print the normalized response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the longest agent message and code blocks from a log file
    ExtractLog { file: PathBuf },
    /// Interactive session with response history
    Session,
    /// Store a GitHub token and repository in .issue-medic.toml
    Init {
        /// GitHub token (prompted for when omitted)
        #[arg(long)]
        token: Option<String>,
    },
    /// Print the effective configuration with the token masked
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Init { token } = &cli.command {
        let token = match token {
            Some(token) => token.clone(),
            None => prompt("GitHub token (empty keeps the current one)")?,
        };
        let repository = match &cli.repo {
            Some(repo) => repo.clone(),
            None => prompt("Repository as owner/repo (empty to detect from origin)")?,
        };
        if !repository.trim().is_empty() {
            github::remote::parse_slug(repository.trim())?;
        }
        let path = Path::new(config::CONFIG_FILE);
        let written = config::Config::init_at(path, &token, &repository)?;
        info!(path = %path.display(), "configuration written");
        println!("Wrote {}", path.display());
        println!("{}", toml::to_string_pretty(&written.redacted())?);
        return Ok(());
    }

    info!("loading configuration");
    let mut config = config::Config::load()?;
    if let Some(endpoint) = cli.endpoint {
        config.agent.endpoint = endpoint;
    }
    if let Some(transport) = cli.transport {
        config.agent.transport = transport;
    }
    debug!(endpoint = %config.agent.endpoint, transport = ?config.agent.transport, "agent settings");

    match cli.command {
        Command::Parse { file, json } => {
            let payload = read_payload(&file, config.agent.transport)?;
            let parsed = response::parse_payload(&payload);
            if json {
                println!("{}", serde_json::to_string_pretty(&parsed)?);
            } else {
                println!("{}", report::format_response(&parsed));
            }
        }
        Command::ExtractLog { file } => {
            let log = std::fs::read_to_string(&file)?;
            let content = response::log::largest_message_content(&log);
            if content.is_empty() {
                println!("No agent messages found.");
            } else {
                println!("{}", content.replace(response::log::BLOCK_SEPARATOR, "\n"));
            }
            for (i, block) in response::log::code_blocks(&log).iter().enumerate() {
                println!("\n--- code block {} ---\n{block}", i + 1);
            }
        }
        Command::Issues => {
            let repo = github::resolve_repository(cli.repo.as_deref(), &config).await?;
            let client = GithubClient::from_config(&config)?;
            info!(%repo, "fetching open issues");
            let issues = client.list_open_issues(&repo).await?;
            info!(count = issues.len(), "fetched issues");
            report::print_issues(&issues);
        }
        Command::Show { number } => {
            let repo = github::resolve_repository(cli.repo.as_deref(), &config).await?;
            let client = GithubClient::from_config(&config)?;
            let issue = client.get_issue(&repo, number).await?;
            println!("{}", report::format_issue(&issue));
        }
        Command::Fix { numbers, output } => {
            let repo = github::resolve_repository(cli.repo.as_deref(), &config).await?;
            let client = GithubClient::from_config(&config)?;
            let agent = AgentClient::new(&config.agent)?;
            let mut history = History::new();
            let progress = |message: &str| eprintln!("{message}");

            for number in &numbers {
                let _span = info_span!("fix", issue = number).entered();
                let issue = match client.get_issue(&repo, *number).await {
                    Ok(issue) => issue,
                    Err(err) => {
                        eprintln!("Issue #{number}: {err}");
                        continue;
                    }
                };
                let credentials = Credentials::for_repo(client.token(), &repo);
                match fix::fix_issue(&agent, credentials, &issue, &mut history, &progress).await {
                    FixOutcome::Unreachable(message) => eprintln!("{message}"),
                    FixOutcome::Completed(_) | FixOutcome::Failed(_) => {
                        let Some(record) = history.responses().first() else {
                            continue;
                        };
                        let path = output
                            .as_deref()
                            .map(|path| numbered_path(path, *number, numbers.len() > 1));
                        if let Err(err) = report::output(record, path.as_deref()) {
                            eprintln!("Issue #{number}: {err}");
                        }
                    }
                }
            }

            if !history.tool_usages().is_empty() {
                println!("\nTool usage:");
                report::print_tool_usages(history.tool_usages());
            }
        }
        Command::Session => {
            let repo = github::resolve_repository(cli.repo.as_deref(), &config).await?;
            let client = GithubClient::from_config(&config)?;
            let agent = AgentClient::new(&config.agent)?;
            session::Session::new(client, agent, repo).run().await?;
        }
        Command::Config => {
            let source = if Path::new(config::CONFIG_FILE).exists() {
                config::CONFIG_FILE
            } else {
                "defaults"
            };
            println!("# {source}, environment and flags");
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
        Command::Init { .. } => {}
    }

    Ok(())
}

/// Ask for one line on stdin.
fn prompt(label: &str) -> std::io::Result<String> {
    print!("{label}: ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Read a saved payload the way the configured transport would have
/// delivered it.
fn read_payload(
    path: &Path,
    transport: Transport,
) -> Result<response::RawPayload, std::io::Error> {
    let bytes = std::fs::read(path)?;
    Ok(match transport {
        Transport::Sse => {
            let mut decoder = agent::reader::SseDecoder::default();
            let mut events = decoder.push(&bytes);
            events.extend(decoder.finish());
            response::RawPayload::Events(events)
        }
        Transport::Json | Transport::Chunked => {
            response::RawPayload::Buffer(String::from_utf8_lossy(&bytes).into_owned())
        }
    })
}

/// `report.md` becomes `report-3.md` when several issues share one output path.
fn numbered_path(path: &Path, number: u64, several: bool) -> PathBuf {
    if !several {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "response".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{number}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{number}"),
    };
    path.with_file_name(name)
}
