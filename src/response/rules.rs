//! Named extraction rules for agent output.
//!
//! Every field of a [`ParsedResponse`](super::ParsedResponse) that has to be
//! guessed from prose is produced by an ordered list of rules. Lists are
//! evaluated first-match-wins; the order is a heuristic, not a guarantee that
//! the best candidate is picked.

use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

const SUMMARY_MAX_CHARS: usize = 150;
const SOLUTION_MAX_CHARS: usize = 500;

/// A single extraction heuristic, identified by name for tracing and tests.
pub struct Rule<T> {
    pub name: &'static str,
    pub apply: fn(&str) -> Option<T>,
}

/// Run `rules` in order and return the first hit.
pub fn first_match<T>(rules: &[Rule<T>], text: &str) -> Option<T> {
    rules.iter().find_map(|rule| {
        let hit = (rule.apply)(text);
        if hit.is_some() {
            trace!(rule = rule.name, "extraction rule matched");
        }
        hit
    })
}

macro_rules! regex {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pattern).expect(concat!("invalid pattern ", stringify!($name))));
    };
}

regex!(
    FILE_PATH,
    r"(?i)(?:[\w.-]+/)*[\w-]+\.(?:jsx|tsx|json|java|yaml|html|cpp|css|xml|yml|sql|txt|py|js|ts|md|rs|go|h|c)\b"
);
regex!(VERSION_LIKE, r"^\d+(?:\.\d+)+$");
regex!(PR_URL, r"https://github\.com/[\w.-]+/[\w.-]+/pull/\d+\b");
regex!(NUMBERED_PREFIX, r"(?m)^\s*\d+\.\s*");
regex!(BOLD, r"\*\*(.*?)\*\*");
regex!(LIST_ITEM, r"^\s*(?:\d+\.|[-•*])\s+\S");

regex!(
    SUCCESS_FIXED,
    r"(?i).*(?:fixed|resolved|created|completed|successful).*(?:error|issue|problem|function|file)"
);
regex!(SUCCESS_PR, r"(?i).*(?:pull request|\bpr\b).*(?:created|submitted|opened)");
regex!(SUCCESS_DONE, r"(?i).*(?:has been|was).*(?:processed|fixed|updated|created)");
regex!(FINAL_ANSWER, r"(?i)final answer:\s*(.+)");
regex!(ACTION_TAKEN, r"(?i)(?:added|fixed|modified|updated|corrected).*\b(?:in|to|for)\b");
regex!(PROBLEM_SOLVED, r"(?i)(?:syntax|error|issue|problem).*(?:resolved|fixed|corrected)");

regex!(SOLUTION_LABEL, r"(?i)\b(?:solution|fix|resolution):\s*");
regex!(RESOLUTION_PHRASE, r"(?i)\b(?:to resolve|to fix|the fix)[^:\n]*:\s*");
regex!(STEPS_LABEL, r"(?i)\b(?:steps?|approach)[^:\n]*:\s*");
regex!(ACTION_BY, r"(?i)\b(?:corrected|fixed|modified|updated)\b[^\n]*?\b(?:by|to|with)\b\s*");

regex!(QUOTED_BRANCH, r#"(?i)['"`]([^'"`\s]*(?:fix|feature|bug|update|add)[^'"`\s]*)['"`]"#);
regex!(LABELED_BRANCH, r"(?i)\bbranch[:\s]+(\S+)");

regex!(
    EXCEPTION,
    r"(?i)\b\w*(?:SyntaxError|TypeError|ValueError|RuntimeError|FileNotFoundError|ImportError|NameError|AttributeError|KeyError|IndexError)[:\s]+[^\n]*"
);
regex!(HTTP_FAILURE, r"(?i)\b(?:404|500|403|401)\b[^\n]*?(?:error|not found|server error)");
regex!(FAILED_ON, r"(?i)(?:failed to|error|exception)[^\n]*?(?:file|function|syntax|compile)[^\n]*");
regex!(COMPILATION, r"(?i)compilation[^\n]*?(?:error|failed)");
regex!(ERROR_LABEL, r"(?i)(?:error|failed|exception):\s*");
regex!(
    FILES_LABEL,
    r"(?i)\b(?:files?\s+(?:modified|changed|updated)|modified\s+files?)\s*:\s*"
);

const CREDENTIAL_MARKERS: &[&str] = &["github_token", "ghp_", "api_key", "password", "chatcmpl-"];
const CODE_MARKERS: &[&str] = &["def ", "class ", "fn ", "function("];
const DUMP_MARKERS: &[&str] = &["AIMessage", "ToolMessage", "HumanMessage", "additional_kwargs"];
const SPECULATION: &[&str] = &[
    "wait, maybe",
    "hmm,",
    "alternatively,",
    "perhaps the",
    "i think",
    "maybe the",
    "message shows",
    "user's code",
];

/// Truncate to `max` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// End of a labeled section starting at `start`: a blank line, a newline
/// followed by a letter (the next heading), or end of text.
fn section_end(text: &str, start: usize) -> usize {
    let rest = &text[start..];
    let bytes = rest.as_bytes();
    for (i, window) in bytes.windows(2).enumerate() {
        if window[0] == b'\n' && (window[1] == b'\n' || window[1].is_ascii_alphabetic()) {
            return start + i;
        }
    }
    text.len()
}

/// End of a paragraph starting at `start`: the next blank line or end of text.
fn paragraph_end(text: &str, start: usize) -> usize {
    text[start..]
        .find("\n\n")
        .map_or(text.len(), |offset| start + offset)
}

fn non_empty_lines(content: &str) -> impl Iterator<Item = &str> {
    content.lines().map(str::trim).filter(|line| !line.is_empty())
}

fn tidy_solution(body: &str) -> String {
    let text = NUMBERED_PREFIX.replace_all(body.trim(), "• ");
    let text = BOLD.replace_all(&text, "$1");
    text.chars().take(SOLUTION_MAX_CHARS).collect()
}

// ---------------------------------------------------------------------------
// Summary (agent message content)

fn success_phrase(content: &str) -> Option<String> {
    for pattern in [&*SUCCESS_FIXED, &*SUCCESS_PR, &*SUCCESS_DONE, &*FINAL_ANSWER] {
        for line in non_empty_lines(content) {
            if let Some(caps) = pattern.captures(line) {
                let text = caps.get(1).map_or(line, |m| m.as_str()).trim();
                let len = text.chars().count();
                if len > 10 && len < 200 {
                    return Some(truncate_chars(text, SUMMARY_MAX_CHARS));
                }
            }
        }
    }
    None
}

fn completed_action(content: &str) -> Option<String> {
    for pattern in [&*ACTION_TAKEN, &*PROBLEM_SOLVED] {
        for line in non_empty_lines(content) {
            let len = line.chars().count();
            if pattern.is_match(line) && len > 20 && len < 200 {
                return Some(truncate_chars(line, SUMMARY_MAX_CHARS));
            }
        }
    }
    None
}

fn descriptive_line(content: &str) -> Option<String> {
    non_empty_lines(content)
        .find(|line| {
            let len = line.chars().count();
            len > 30
                && len < 200
                && !CREDENTIAL_MARKERS.iter().any(|m| line.contains(m))
                && !CODE_MARKERS.iter().any(|m| line.contains(m))
                && !DUMP_MARKERS.iter().any(|m| line.contains(m))
                && !line.starts_with(['{', '['])
                && !line.starts_with('•')
                && line.split(' ').count() > 3
        })
        .map(|line| truncate_chars(line, SUMMARY_MAX_CHARS))
}

pub const SUMMARY_RULES: &[Rule<String>] = &[
    Rule { name: "success_phrase", apply: success_phrase },
    Rule { name: "completed_action", apply: completed_action },
    Rule { name: "descriptive_line", apply: descriptive_line },
];

// ---------------------------------------------------------------------------
// Solution (agent message content)

fn labeled_solution(content: &str) -> Option<String> {
    let label = SOLUTION_LABEL.find(content)?;
    let body = &content[label.end()..section_end(content, label.end())];
    (body.trim().chars().count() > 15).then(|| tidy_solution(body))
}

fn paragraph_after(pattern: &Regex, content: &str) -> Option<String> {
    let label = pattern.find(content)?;
    let body = &content[label.end()..paragraph_end(content, label.end())];
    (body.trim().chars().count() > 15).then(|| tidy_solution(body))
}

fn resolution_phrase(content: &str) -> Option<String> {
    paragraph_after(&RESOLUTION_PHRASE, content)
}

fn steps_label(content: &str) -> Option<String> {
    paragraph_after(&STEPS_LABEL, content)
}

fn step_block(content: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.iter().position(|line| LIST_ITEM.is_match(line))?;
    let block: Vec<&str> = lines[start..]
        .iter()
        .take_while(|line| !line.trim().is_empty())
        .copied()
        .collect();
    let block = block.join("\n");
    (block.trim().chars().count() > 20).then(|| tidy_solution(&block))
}

fn action_description(content: &str) -> Option<String> {
    paragraph_after(&ACTION_BY, content)
}

pub const SOLUTION_RULES: &[Rule<String>] = &[
    Rule { name: "labeled_solution", apply: labeled_solution },
    Rule { name: "resolution_phrase", apply: resolution_phrase },
    Rule { name: "steps_label", apply: steps_label },
    Rule { name: "step_block", apply: step_block },
    Rule { name: "action_description", apply: action_description },
];

// ---------------------------------------------------------------------------
// Shared identifiers

fn is_plausible_file(candidate: &str) -> bool {
    candidate.chars().count() > 3
        && !VERSION_LIKE.is_match(candidate)
        && !candidate.contains("ghp_")
        && !candidate.starts_with("tool-")
}

/// Every distinct file path with a known source extension.
pub fn file_paths(content: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for m in FILE_PATH.find_iter(content) {
        let path = m.as_str();
        if is_plausible_file(path) && !files.iter().any(|f| f == path) {
            files.push(path.to_string());
        }
    }
    files
}

/// First `https://github.com/<owner>/<repo>/pull/<number>` link.
pub fn pull_request_url(content: &str) -> Option<String> {
    PR_URL.find(content).map(|m| m.as_str().to_string())
}

/// Quoted token that looks like a feature/fix branch.
pub fn quoted_branch(content: &str) -> Option<String> {
    QUOTED_BRANCH
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|name| {
            let len = name.chars().count();
            !matches!(*name, "for" | "main" | "master")
                && len > 2
                && len < 50
                && !FILE_PATH.find(name).is_some_and(|m| m.len() == name.len())
        })
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Errors (agent message content)

fn is_reportable_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    let len = error.chars().count();
    len > 5
        && len < 200
        && error.split_whitespace().count() < 20
        && !SPECULATION.iter().any(|phrase| lower.contains(phrase))
}

/// Known exception names, HTTP failures and "failed to ..." sentences,
/// minus the agent thinking out loud.
///
/// The patterns overlap, so a match that is part of a longer match from
/// the same content is dropped.
pub fn message_errors(content: &str) -> Vec<String> {
    let matches: Vec<String> = [&*EXCEPTION, &*HTTP_FAILURE, &*FAILED_ON, &*COMPILATION]
        .into_iter()
        .flat_map(|pattern| pattern.find_iter(content))
        .map(|m| m.as_str().trim().to_string())
        .filter(|error| is_reportable_error(error))
        .collect();

    let mut errors: Vec<String> = Vec::new();
    for (i, error) in matches.iter().enumerate() {
        let covered = matches
            .iter()
            .enumerate()
            .any(|(j, other)| j != i && other.len() > error.len() && other.contains(error.as_str()));
        if !covered && !errors.contains(error) {
            errors.push(error.clone());
        }
    }
    errors
}

// ---------------------------------------------------------------------------
// Free text

/// First non-empty line, capped for display.
pub fn first_line(text: &str) -> Option<String> {
    non_empty_lines(text)
        .next()
        .map(|line| truncate_chars(line, SUMMARY_MAX_CHARS))
}

/// Body of the first `solution:`, `fix:`, `resolution:` or `final answer:`
/// section, tried in that keyword order.
pub fn labeled_section(text: &str) -> Option<String> {
    static LABELS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        ["solution", "fix", "resolution", "final answer"]
            .iter()
            .map(|kw| Regex::new(&format!(r"(?i)\b{kw}\s*:\s*")).expect("keyword pattern is valid"))
            .collect()
    });
    LABELS.iter().find_map(|label| {
        let m = label.find(text)?;
        let body = text[m.end()..section_end(text, m.end())].trim();
        (!body.is_empty()).then(|| body.to_string())
    })
}

/// Files from a `files modified:` block, else every known-extension match.
pub fn listed_files(text: &str) -> Vec<String> {
    if let Some(label) = FILES_LABEL.find(text) {
        let body = &text[label.end()..section_end(text, label.end())];
        let files: Vec<String> = body
            .split([',', '\n'])
            .map(|f| f.trim().trim_start_matches(['-', '*', '•']).trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        if !files.is_empty() {
            return files;
        }
    }
    file_paths(text)
}

/// Token after the word `branch`.
pub fn labeled_branch(text: &str) -> Option<String> {
    let caps = LABELED_BRANCH.captures(text)?;
    let name = caps[1].trim_matches(|c: char| matches!(c, '\'' | '"' | '`' | '.' | ','));
    (!name.is_empty() && name != "for").then(|| name.to_string())
}

/// Bodies of `error:`, `failed:` and `exception:` segments.
pub fn labeled_errors(text: &str) -> Vec<String> {
    ERROR_LABEL
        .find_iter(text)
        .map(|m| text[m.end()..section_end(text, m.end())].trim().to_string())
        .filter(|error| !error.is_empty())
        .collect()
}
