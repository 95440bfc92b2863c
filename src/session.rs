//! Interactive loop that keeps one [`History`] alive across several fixes.

use colored::Colorize;
use std::io::Write as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::agent::{AgentClient, Credentials};
use crate::fix::{self, FixOutcome};
use crate::github::{GithubClient, Issue, RepoSlug};
use crate::history::History;
use crate::report;

const HELP: &str = "\
Commands:
  issues              list open issues
  fix <number>        send an issue to the agent
  responses           list recorded responses, newest first
  detail <index>      show a recorded response (1 = newest)
  tools               show tool usage per issue
  clear responses     forget recorded responses
  clear tools         forget tool usage
  help                show this help
  quit                leave the session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Issues,
    Fix(u64),
    Responses,
    Detail(usize),
    Tools,
    ClearResponses,
    ClearTools,
    Help,
    Quit,
}

impl SessionCommand {
    pub fn parse(line: &str) -> Result<SessionCommand, String> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default().to_lowercase();
        let argument = words.next();

        let parsed = match (command.as_str(), argument) {
            ("issues" | "ls", None) => SessionCommand::Issues,
            ("fix", Some(arg)) => {
                let number = arg.trim_start_matches('#');
                SessionCommand::Fix(
                    number
                        .parse()
                        .map_err(|_| format!("'{arg}' is not an issue number"))?,
                )
            }
            ("responses", None) => SessionCommand::Responses,
            ("detail" | "show", Some(arg)) => match arg.parse::<usize>() {
                Ok(index) if index > 0 => SessionCommand::Detail(index),
                _ => return Err(format!("'{arg}' is not a response index")),
            },
            ("tools", None) => SessionCommand::Tools,
            ("clear", Some("responses")) => SessionCommand::ClearResponses,
            ("clear", Some("tools")) => SessionCommand::ClearTools,
            ("help" | "?", None) => SessionCommand::Help,
            ("quit" | "exit", None) => SessionCommand::Quit,
            ("", _) => return Err("empty command".to_string()),
            _ => return Err(format!("unknown command '{}'. Type 'help'", line.trim())),
        };

        if words.next().is_some() {
            return Err(format!("too many arguments in '{}'", line.trim()));
        }
        Ok(parsed)
    }
}

pub struct Session {
    github: GithubClient,
    agent: AgentClient,
    repo: RepoSlug,
    history: History,
    issues: Vec<Issue>,
}

impl Session {
    pub fn new(github: GithubClient, agent: AgentClient, repo: RepoSlug) -> Self {
        Self {
            github,
            agent,
            repo,
            history: History::with_listener(|change| debug!(?change, "history changed")),
            issues: Vec::new(),
        }
    }

    pub async fn run(&mut self) -> std::io::Result<()> {
        println!("{} {} (agent: {})", "issue-medic".bold(), self.repo, self.agent.endpoint());
        println!("Type 'help' for commands.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{} ", "medic>".cyan());
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match SessionCommand::parse(&line) {
                Ok(SessionCommand::Quit) => break,
                Ok(command) => self.execute(command).await,
                Err(message) => eprintln!("{}", message.yellow()),
            }
        }
        Ok(())
    }

    async fn execute(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Issues => match self.github.list_open_issues(&self.repo).await {
                Ok(issues) => {
                    report::print_issues(&issues);
                    self.issues = issues;
                }
                Err(err) => eprintln!("{}", err.to_string().red()),
            },
            SessionCommand::Fix(number) => self.fix(number).await,
            SessionCommand::Responses => {
                if self.history.responses().is_empty() {
                    println!("No responses recorded.");
                }
                for (i, record) in self.history.responses().iter().enumerate() {
                    println!(
                        "{:>3}. #{} {} [{}] {}",
                        i + 1,
                        record.issue_number,
                        record.issue_title,
                        record.response.status,
                        record.received_at.format("%H:%M:%S")
                    );
                }
            }
            SessionCommand::Detail(index) => match self.history.responses().get(index - 1) {
                Some(record) => {
                    if let Err(err) = report::output(record, None) {
                        eprintln!("{}", err.to_string().red());
                    }
                }
                None => eprintln!("No response #{index}"),
            },
            SessionCommand::Tools => report::print_tool_usages(self.history.tool_usages()),
            SessionCommand::ClearResponses => self.history.clear_responses(),
            SessionCommand::ClearTools => self.history.clear_tool_usages(),
            SessionCommand::Help => println!("{HELP}"),
            SessionCommand::Quit => {}
        }
    }

    async fn fix(&mut self, number: u64) {
        let issue = match self.issues.iter().find(|issue| issue.number == number) {
            Some(issue) => issue.clone(),
            None => match self.github.get_issue(&self.repo, number).await {
                Ok(issue) => issue,
                Err(err) => {
                    eprintln!("{}", err.to_string().red());
                    return;
                }
            },
        };

        let credentials = Credentials::for_repo(self.github.token(), &self.repo);
        let progress = |message: &str| eprintln!("{}", message.dimmed());
        let outcome = fix::fix_issue(&self.agent, credentials, &issue, &mut self.history, &progress).await;

        match outcome {
            FixOutcome::Completed(response) | FixOutcome::Failed(response) => {
                println!("{}", report::format_response(&response));
                println!("(recorded as response 1, 'detail 1' for the full view)");
            }
            FixOutcome::Unreachable(message) => eprintln!("{}", message.red()),
        }
    }
}
