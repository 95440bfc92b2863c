use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::github::Issue;
use crate::history::{ResponseRecord, ToolUsage};
use crate::response::log::BLOCK_SEPARATOR;
use crate::response::{ParsedResponse, ResponseStatus, StepStatus, StepUpdate};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

fn status_glyph(status: ResponseStatus) -> &'static str {
    match status {
        ResponseStatus::Success => "✅",
        ResponseStatus::Error => "❌",
        ResponseStatus::Partial => "⚠️",
        ResponseStatus::Processing => "🔄",
    }
}

/// Render a response as markdown-ish text. Empty sections are left out.
pub fn format_response(response: &ParsedResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} **Status**: {}\n\n",
        status_glyph(response.status),
        response.status
    ));
    out.push_str(&format!("📋 **Summary**: {}\n\n", response.summary));

    if let Some(solution) = &response.solution {
        out.push_str(&format!("🔧 **Solution**:\n{solution}\n\n"));
    }
    if !response.files_modified.is_empty() {
        out.push_str("📁 **Files Modified**:\n");
        for file in &response.files_modified {
            out.push_str(&format!("  • {file}\n"));
        }
        out.push('\n');
    }
    if let Some(url) = &response.pull_request_url {
        out.push_str(&format!("🔗 **Pull Request**: [View PR]({url})\n\n"));
    }
    if let Some(branch) = &response.branch_name {
        out.push_str(&format!("🌿 **Branch**: {branch}\n\n"));
    }
    if !response.next_steps.is_empty() {
        out.push_str("📝 **Next Steps**:\n");
        for (i, step) in response.next_steps.iter().enumerate() {
            out.push_str(&format!("  {}. {step}\n", i + 1));
        }
        out.push('\n');
    }
    if !response.errors.is_empty() {
        out.push_str("❌ **Errors**:\n");
        for error in &response.errors {
            out.push_str(&format!("  • {error}\n"));
        }
    }

    out.trim_end().to_string()
}

pub fn format_step(step: &StepUpdate) -> String {
    let glyph = match step.status {
        StepStatus::Completed => "✅",
        StepStatus::Failed => "❌",
        StepStatus::InProgress => "🔄",
    };
    match &step.details {
        Some(details) => format!("{glyph} {}\n   {details}", step.step),
        None => format!("{glyph} {}", step.step),
    }
}

/// Summary plus numbered agent messages. The first message is the prompt
/// echoed back, so it is skipped along with empty ones; numbering keeps the
/// original positions.
pub fn format_agent_steps(summary: Option<&str>, messages: &[String]) -> String {
    let summary = summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("No summary available");
    let steps: Vec<(usize, &String)> = messages
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, message)| !message.trim().is_empty())
        .collect();

    let mut out = format!("**Summary**\n{summary}\n\n**Agent Messages ({} steps)**\n", steps.len());
    if steps.is_empty() {
        out.push_str("No detailed steps available");
    }
    for (i, message) in steps {
        out.push_str(&format!("\nStep {}\n{}\n", i + 1, message.trim()));
    }
    out.trim_end().to_string()
}

/// One line per issue for the `issues` listing.
pub fn format_issue_line(issue: &Issue) -> String {
    let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
    let mut line = format!("#{:<5} {}", issue.number, issue.title);
    if !labels.is_empty() {
        line.push_str(&format!(" [{}]", labels.join(", ")));
    }
    line
}

pub fn format_issue(issue: &Issue) -> String {
    let author = match issue.author() {
        "" => "unknown",
        login => login,
    };
    let mut out = format!("Issue #{}: \"{}\"\n", issue.number, issue.title);
    out.push_str(&format!(
        "Author: {} | State: {} | Created: {}\n",
        author,
        issue.state,
        issue.created_at.format("%Y-%m-%d")
    ));
    if !issue.labels.is_empty() {
        let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
        out.push_str(&format!("Labels: {}\n", labels.join(", ")));
    }
    out.push('\n');
    match issue.body.as_deref().map(str::trim) {
        Some(body) if !body.is_empty() => out.push_str(body),
        _ => out.push_str("No description provided."),
    }
    out
}

pub fn print_issues(issues: &[Issue]) {
    if issues.is_empty() {
        println!("No open issues.");
        return;
    }
    for issue in issues {
        println!("{}", format_issue_line(issue));
    }
}

pub fn print_tool_usages(usages: &[ToolUsage]) {
    if usages.is_empty() {
        println!("No tool usage recorded.");
        return;
    }
    for usage in usages {
        println!(
            "#{} {} ({} tools, {})",
            usage.issue_number,
            usage.issue_title.bold(),
            usage.tool_path.len(),
            usage.timestamp.format("%H:%M:%S")
        );
        for (i, tool) in usage.tool_path.iter().enumerate() {
            println!("  {}. {tool}", i + 1);
        }
    }
}

/// Output a recorded response to the terminal (default) or to a markdown file.
#[instrument(skip(record), fields(issue = record.issue_number, status = %record.response.status))]
pub fn output(record: &ResponseRecord, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing response to terminal");
            print_terminal_report(record);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing response to file");
            write_markdown_report(record, path)
        }
    }
}

fn print_terminal_report(record: &ResponseRecord) {
    let response = &record.response;
    println!();
    println!("Issue #{}: \"{}\"", record.issue_number, record.issue_title);
    println!(
        "Received: {} | Status: {}",
        record.received_at.format("%Y-%m-%d %H:%M:%S UTC"),
        colorize_status(response.status)
    );
    println!();

    // Final-output responses carry the raw message list; show it as the
    // summary/steps pair instead of the condensed solution.
    if response.agent_messages.is_empty() {
        println!("═══ Summary ═══");
        println!("{}", response.summary);
        println!();
        if let Some(solution) = &response.solution {
            println!("═══ Solution ═══");
            println!("{solution}");
            println!();
        }
    } else {
        println!("═══ Agent Steps ═══");
        println!("{}", format_agent_steps(Some(&response.summary), &response.agent_messages));
        println!();
    }

    if !response.steps.is_empty() {
        println!("═══ Progress ═══");
        for step in &response.steps {
            println!("{}", format_step(step));
        }
        println!();
    }

    if !response.files_modified.is_empty() {
        println!("═══ Files Modified ═══");
        for file in &response.files_modified {
            println!("  • {file}");
        }
        println!();
    }

    if let Some(url) = &response.pull_request_url {
        println!("Pull Request: {}", url.underline());
    }
    if let Some(branch) = &response.branch_name {
        println!("Branch: {}", branch.cyan());
    }

    if !response.next_steps.is_empty() {
        println!();
        println!("═══ Next Steps ═══");
        for (i, step) in response.next_steps.iter().enumerate() {
            println!("  {}. {step}", i + 1);
        }
    }

    if !response.errors.is_empty() {
        println!();
        println!("═══ {} ═══", "Errors".red().bold());
        for error in &response.errors {
            println!("  • {}", error.red());
        }
    }

    if let Some(output) = &response.agent_output {
        println!();
        println!("═══ Agent Output ═══");
        println!("{}", output.replace(BLOCK_SEPARATOR, "\n").dimmed());
    }
    println!();
}

fn write_markdown_report(record: &ResponseRecord, path: &Path) -> Result<(), ReportError> {
    let response = &record.response;
    let mut md = String::new();
    md.push_str(&format!("# Issue #{}: \"{}\"\n\n", record.issue_number, record.issue_title));
    md.push_str(&format!(
        "**Received:** {}\n\n",
        record.received_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format_response(response));
    md.push('\n');

    if !response.agent_messages.is_empty() {
        md.push_str("\n## Agent Steps\n\n");
        md.push_str(&format_agent_steps(Some(&response.summary), &response.agent_messages));
        md.push('\n');
    }

    if !response.steps.is_empty() {
        md.push_str("\n## Progress\n\n");
        for step in &response.steps {
            md.push_str(&format!("- {}\n", format_step(step).replace("\n   ", " - ")));
        }
    }

    if let Some(output) = &response.agent_output {
        md.push_str("\n## Agent Output\n\n");
        for block in output.split(BLOCK_SEPARATOR) {
            md.push_str(&format!("> {block}\n"));
        }
    }

    std::fs::write(path, md)?;
    Ok(())
}

fn colorize_status(status: ResponseStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        ResponseStatus::Success => label.green().bold(),
        ResponseStatus::Error => label.red().bold(),
        ResponseStatus::Partial => label.yellow().bold(),
        ResponseStatus::Processing => label.blue().bold(),
    }
}
