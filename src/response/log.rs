use regex::Regex;
use std::sync::LazyLock;

/// Joins the quoted contents found in one message block.
pub const BLOCK_SEPARATOR: &str = "<br>";

const MARKER: &str = "aimessage";

static QUOTED_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"content=(?:'([^']*)'|"([^"]*)")"#).expect("content pattern is valid")
});

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```[ \t]*[a-zA-Z0-9]*[ \t]*\n?((?s).*?)```").expect("fence pattern is valid")
});

/// Pick the most informative agent message out of a verbose log.
///
/// Each line mentioning `AIMessage` starts a block that runs until the next
/// blank line. The `content='...'` / `content="..."` bodies of a block are
/// joined with [`BLOCK_SEPARATOR`]; the longest joined block is returned,
/// the earliest one on ties. Returns an empty string when the log has no
/// marker or no quoted content.
pub fn largest_message_content(log: &str) -> String {
    let lines: Vec<&str> = log.lines().collect();
    let mut best = String::new();

    for (start, line) in lines.iter().enumerate() {
        if !line.to_lowercase().contains(MARKER) {
            continue;
        }
        let block: Vec<&str> = std::iter::once(*line)
            .chain(
                lines[start + 1..]
                    .iter()
                    .take_while(|l| !l.trim().is_empty())
                    .copied(),
            )
            .collect();
        let block = block.join(" ");

        let contents: Vec<&str> = QUOTED_CONTENT
            .captures_iter(&block)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str())
            .collect();
        if contents.is_empty() {
            continue;
        }

        let joined = contents.join(BLOCK_SEPARATOR);
        if joined.chars().count() > best.chars().count() {
            best = joined;
        }
    }

    best
}

/// Bodies of fenced code blocks, trimmed, in order of appearance.
pub fn code_blocks(log: &str) -> Vec<String> {
    CODE_FENCE
        .captures_iter(log)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}
