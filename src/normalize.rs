//! Text normalisation: turn raw recognition output into paragraph-correct prose.
//!
//! Recognition engines reproduce the *layout* of the page, not its prose:
//! every wrapped line ends in a hard break, and gapless scripts pick up
//! spurious spaces between glyphs. Normalisation keeps exactly two kinds of
//! breaks and drops the rest:
//!
//! 1. Paragraph breaks: two (or more, rounded down to an even count) line
//!    feeds in a row.
//! 2. Sentence breaks: a single line feed right after a terminal mark from
//!    [`TERMINAL_MARKS`].
//!
//! Every other single line feed is a wrap artefact. In a gapless script it
//! is deleted together with all literal spaces; in a spaced script it becomes
//! a single space and the spaces are left alone.
//!
//! `normalize(normalize(t)) == normalize(t)`: the output contains no spaces
//! (gapless), no odd-length break runs, and no single break that is not
//! preceded by a terminal mark, so a second pass finds nothing to change.

use crate::config::Script;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Marks after which a single line break is kept: full stops, commas,
/// exclamation/question marks, closing brackets/quotes, ellipses, and their
/// ASCII counterparts.
pub const TERMINAL_MARKS: &[char] = &[
    '。', '、', '！', '？', '」', '』', '）', '】', '》', '〉', '”', '’', '…', '．', '，', '.', ',',
    '!', '?', ')', ']', '"', '\'',
];

/// Normalise one page of recognised text for the given script family.
pub fn normalize(input: &str, script: Script) -> String {
    let s = normalise_line_endings(input);
    let s = match script {
        Script::Gapless => s.replace(' ', ""),
        Script::Spaced => s,
    };
    let s = s.trim();
    join_wrapped_lines(s, script)
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// An optional preceding non-break char, then a run of breaks.
static RE_BREAK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"([^\n]?)(\n+)").unwrap());

fn join_wrapped_lines(input: &str, script: Script) -> String {
    RE_BREAK_RUN
        .replace_all(input, |caps: &Captures<'_>| {
            let before = &caps[1];
            let run = caps[2].len();
            if run >= 2 {
                // Pairs are paragraph breaks; an odd trailing break follows a
                // paragraph break, not a terminal mark, and is dropped.
                format!("{before}{}", "\n".repeat(run - run % 2))
            } else if before.chars().next().is_some_and(is_terminal_mark) {
                format!("{before}\n")
            } else {
                match script {
                    Script::Gapless => before.to_string(),
                    Script::Spaced => format!("{before} "),
                }
            }
        })
        .into_owned()
}

fn is_terminal_mark(c: char) -> bool {
    TERMINAL_MARKS.contains(&c)
}
