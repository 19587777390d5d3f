//! Best-effort repair of malformed JSON emitted by a language model.
//!
//! ## Strategy list
//!
//! Repair is an ordered list of named strategies, each a pure
//! `&str → Result<Value, String>`. The first strategy that yields a value
//! wins; adding a new repair is a single list insertion. Cheap strategies run
//! first so valid JSON never pays for the textual rewrites.
//!
//! | # | Name              | What it recovers                                   |
//! |---|-------------------|----------------------------------------------------|
//! | 1 | `as_is`           | already valid JSON                                 |
//! | 2 | `repaired`        | comments, single quotes, trailing commas, NaN      |
//! | 3 | `outer_object`    | narrative captured after the closing brace         |
//! | 4 | `balanced_object` | prose between two objects                          |
//! | 5 | `close_truncated` | reply cut off by the token limit                   |
//!
//! ## Rewrites never touch string contents
//!
//! Every textual rule runs only on the parts of the text that lie outside
//! string literals, so `"http://…"` keeps its `//` and a note reading
//! `"pH, NaN-free"` keeps its words. Comment stripping runs before single
//! quotes are converted and treats `'…'` in key or value position as a
//! literal too. Each rule is idempotent.

use crate::logger::RecoveryLog;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

type Strategy = fn(&str) -> Result<Value, String>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("as_is", parse),
    ("repaired", parse_repaired),
    ("outer_object", parse_outer_object),
    ("balanced_object", parse_balanced_object),
    ("close_truncated", parse_closed_truncated),
];

/// How many cut points `close_truncated` tries before giving up.
const MAX_TRUNCATION_CUTS: usize = 8;

/// Parse `candidate`, repairing it if needed.
///
/// Returns `None` when every strategy failed. Never panics. Failed attempts
/// are reported to `log` when one is supplied; logging does not influence the
/// outcome.
pub fn repair(candidate: &str, log: Option<&dyn RecoveryLog>) -> Option<Value> {
    let mut failures: Vec<String> = Vec::new();

    for (name, strategy) in STRATEGIES {
        match strategy(candidate) {
            Ok(value) => {
                if let Some(log) = log.filter(|_| !failures.is_empty()) {
                    log.log(&format!(
                        "repair: recovered JSON with '{}' after {} failed attempt(s)",
                        name,
                        failures.len()
                    ));
                }
                return Some(value);
            }
            Err(e) => {
                if let Some(log) = log {
                    log.warn(&format!("repair: strategy '{}' failed: {}", name, e));
                }
                failures.push(format!("{}: {}", name, e));
            }
        }
    }

    if let Some(log) = log {
        log.error("repair: JSON is unrecoverable", &failures);
    }
    None
}

/// Apply the full textual repair chain without parsing.
///
/// Order: comments, single quotes, trailing commas, non-JSON literals.
/// Comments go first so a comment between a trailing comma and its closing
/// bracket does not hide the comma.
pub fn apply_repairs(text: &str) -> String {
    let s = strip_comments(text);
    let s = convert_single_quotes(&s);
    let s = map_outside_strings(&s, strip_trailing_commas);
    map_outside_strings(&s, replace_non_json_literals)
}

// ── Strategies ───────────────────────────────────────────────────────────────

fn parse(text: &str) -> Result<Value, String> {
    serde_json::from_str(text).map_err(|e| e.to_string())
}

fn parse_repaired(text: &str) -> Result<Value, String> {
    parse(&apply_repairs(text))
}

fn parse_outer_object(text: &str) -> Result<Value, String> {
    let repaired = apply_repairs(text);
    let start = repaired.find('{').ok_or("no '{' in text")?;
    let end = repaired.rfind('}').ok_or("no '}' in text")?;
    if end <= start {
        return Err("no '{…}' span".into());
    }
    parse(&repaired[start..=end])
}

fn parse_balanced_object(text: &str) -> Result<Value, String> {
    let repaired = apply_repairs(text);
    let mut last_err = String::from("no balanced object");
    for (start, end) in balanced_objects(&repaired) {
        match parse(&repaired[start..=end]) {
            Ok(v) => return Ok(v),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

fn parse_closed_truncated(text: &str) -> Result<Value, String> {
    let repaired = apply_repairs(text);
    let start = repaired
        .find(['{', '['])
        .ok_or("no opening bracket in text")?;
    let body = repaired[start..].trim_end();

    let mut last_err = match parse(&close_open_containers(body)) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    for cut in cut_points(body).into_iter().take(MAX_TRUNCATION_CUTS) {
        match parse(&close_open_containers(&body[..cut])) {
            // Cutting everything away leaves nothing worth returning.
            Ok(v) if is_empty_container(&v) => last_err = "only an empty container left".into(),
            Ok(v) => return Ok(v),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

// ── Rewrite rules ────────────────────────────────────────────────────────────

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

static RE_NON_FINITE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[\[,:]\s*)-?(?:NaN|Infinity)\b").unwrap());

static RE_PY_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[\[,:]\s*)(None|True|False)\b").unwrap());

/// `'key'` / `'value'` → `"key"` / `"value"` for single-quoted tokens in
/// key or value position, escaping embedded double quotes.
fn convert_single_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '\'' if at_token_start(&out) => {
                out.push('"');
                while let Some(n) = chars.next() {
                    match n {
                        '\'' => {
                            out.push('"');
                            break;
                        }
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(e) => {
                                out.push('\\');
                                out.push(e);
                            }
                            None => {}
                        },
                        '"' => out.push_str("\\\""),
                        _ => out.push(n),
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// `true` when the next token would be a key or a value.
fn at_token_start(out: &str) -> bool {
    matches!(
        out.trim_end().chars().next_back(),
        None | Some('{' | '[' | ',' | ':')
    )
}

fn strip_trailing_commas(segment: &str) -> String {
    RE_TRAILING_COMMA.replace_all(segment, "$1").into_owned()
}

/// `NaN`, `Infinity`, `-Infinity` → `null`; Python `None`/`True`/`False` → JSON.
fn replace_non_json_literals(segment: &str) -> String {
    let s = RE_NON_FINITE.replace_all(segment, "${1}null");
    RE_PY_LITERAL
        .replace_all(&s, |caps: &Captures<'_>| {
            let lit = match &caps[2] {
                "None" => "null",
                "True" => "true",
                _ => "false",
            };
            format!("{}{}", &caps[1], lit)
        })
        .into_owned()
}

/// Remove `// …` line comments and `/* … */` block comments outside strings.
///
/// Single-quoted literals in key or value position count as strings here,
/// matching what [`convert_single_quotes`] later turns into JSON strings.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' => {
                quote = Some('"');
                out.push(c);
            }
            '\'' if at_token_start(&out) => {
                quote = Some('\'');
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.next_if(|&n| n != '\n').is_some() {}
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

// ── Scanning helpers ─────────────────────────────────────────────────────────

/// Apply `f` to every run of text outside double-quoted literals; string
/// literals (including an unterminated trailing one) are copied verbatim.
fn map_outside_strings(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut seg_start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                out.push_str(&text[seg_start..=i]);
                seg_start = i + 1;
            }
        } else if c == '"' {
            out.push_str(&f(&text[seg_start..i]));
            in_string = true;
            seg_start = i;
        }
    }

    if in_string {
        out.push_str(&text[seg_start..]);
    } else {
        out.push_str(&f(&text[seg_start..]));
    }
    out
}

/// Byte spans `(start, end_inclusive)` of every top-level `{…}` whose braces
/// balance, in order of appearance.
fn balanced_objects(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }
    spans
}

/// Close an unterminated string, drop a dangling `,` and complete a dangling
/// `:` with `null`, then append the closers of every open container.
fn close_open_containers(prefix: &str) -> String {
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in prefix.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }

    let mut out = prefix.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    loop {
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        if out.ends_with(',') {
            out.pop();
        } else {
            break;
        }
    }
    if out.ends_with(':') {
        out.push_str(" null");
    }

    out.extend(closers.iter().rev());
    out
}

/// Positions where a truncated document can be cut cleanly, most preferred
/// first: every `,` outside strings from the end backwards, then the points
/// just after each opening bracket, also from the end.
fn cut_points(text: &str) -> Vec<usize> {
    let mut commas = Vec::new();
    let mut openers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ',' => commas.push(i),
            '{' | '[' => openers.push(i + 1),
            _ => {}
        }
    }
    commas.into_iter().rev().chain(openers.into_iter().rev()).collect()
}

fn is_empty_container(v: &Value) -> bool {
    match v {
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}
