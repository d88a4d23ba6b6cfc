//! Editing of the disassembled intermediate form.
//!
//! A method runs from its `.method` header line to the `}` closing its body.
//! Excluded methods are dropped whole; `.export [N]` ordinals of the kept
//! methods are renumbered from 1.

use std::sync::OnceLock;

use isoplug_plugin_sdk::CapabilityKind;
use regex::Regex;

use super::{classify::Exclusions, SynthError};

/// A native export declared inside a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDecl {
    pub ordinal: u32,
    pub name: String,
    pub method: String,
}

/// Result of [`rewrite`].
#[derive(Debug, Clone, Default)]
pub struct Rewritten {
    pub text: String,
    /// Methods removed, in source order.
    pub removed: Vec<String>,
    /// Exports kept, in their new ordinal order.
    pub exports: Vec<String>,
}

fn export_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\s*)\.export\s*\[\s*(\d+)\s*\](?:\s+as\s+('[^']+'|\S+))?(.*)$")
            .expect("static pattern compiles")
    })
}

/// Capability kinds named by `.capability` directives, in order.
pub fn capabilities(source: &str) -> Vec<CapabilityKind> {
    source
        .lines()
        .filter_map(|line| line.trim().strip_prefix(".capability"))
        .filter_map(|rest| rest.trim().parse().ok())
        .collect()
}

/// Every export declaration, in file order.
pub fn exports(source: &str) -> Result<Vec<ExportDecl>, SynthError> {
    let mut out = Vec::new();
    for block in split(source)? {
        if let Block::Method { name, lines, .. } = block {
            for line in lines {
                if let Some(caps) = export_re().captures(line) {
                    out.push(ExportDecl {
                        ordinal: caps[2].parse().unwrap_or(0),
                        name: export_name(&caps, &name),
                        method: name.clone(),
                    });
                }
            }
        }
    }
    Ok(out)
}

/// Drops excluded methods and renumbers the remaining export ordinals.
pub fn rewrite(source: &str, excluded: &Exclusions) -> Result<Rewritten, SynthError> {
    let mut out = Rewritten::default();
    for block in split(source)? {
        match block {
            Block::Other(line) => push_line(&mut out.text, line),
            Block::Method { name, .. } if excluded.excludes(&name) => {
                tracing::debug!(method = %name, "excluding method");
                out.removed.push(name);
            }
            Block::Method { name, lines, .. } => {
                for line in lines {
                    match export_re().captures(line) {
                        Some(caps) => {
                            let export = export_name(&caps, &name);
                            out.exports.push(export.clone());
                            let rewritten = format!(
                                "{}.export [{}] as {}{}",
                                &caps[1],
                                out.exports.len(),
                                export,
                                &caps[4]
                            );
                            push_line(&mut out.text, &rewritten);
                        }
                        None => push_line(&mut out.text, line),
                    }
                }
            }
        }
    }
    Ok(out)
}

fn push_line(text: &mut String, line: &str) {
    text.push_str(line);
    text.push('\n');
}

fn export_name(caps: &regex::Captures<'_>, method: &str) -> String {
    caps.get(3)
        .map(|m| m.as_str().trim_matches('\'').to_string())
        .unwrap_or_else(|| method.to_string())
}

enum Block<'a> {
    Other(&'a str),
    Method {
        name: String,
        lines: Vec<&'a str>,
    },
}

/// Splits `source` into method blocks and the lines between them.
fn split(source: &str) -> Result<Vec<Block<'_>>, SynthError> {
    let mut blocks = Vec::new();
    let mut lines = source.lines().enumerate();
    while let Some((index, line)) = lines.next() {
        if !line.trim_start().starts_with(".method") {
            blocks.push(Block::Other(line));
            continue;
        }
        let start = index + 1;
        let mut method = vec![line];
        let mut name = method_name(line);
        let mut braces = BraceCounter::default();
        braces.feed(line);
        while !braces.closed() {
            let Some((_, next)) = lines.next() else {
                return Err(SynthError::Unbalanced {
                    method: name.unwrap_or_else(|| "<unknown>".into()),
                    line: start,
                });
            };
            if name.is_none() && !braces.opened() {
                name = method_name(next);
            }
            braces.feed(next);
            method.push(next);
        }
        blocks.push(Block::Method {
            name: name.unwrap_or_default(),
            lines: method,
        });
    }
    Ok(blocks)
}

/// Identifier in front of the first `(` that does not open a `marshal(...)`.
fn method_name(line: &str) -> Option<String> {
    let bytes = line.as_bytes();
    for (pos, _) in line.match_indices('(') {
        let mut start = pos;
        while start > 0 && is_name_byte(bytes[start - 1]) {
            start -= 1;
        }
        let name = line[start..pos].trim_matches('\'');
        if name.is_empty() || name == "marshal" {
            continue;
        }
        return Some(name.to_string());
    }
    None
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'\'' | b'@' | b'`')
}

/// Brace depth across lines, ignoring quoted literals and `//` comments.
#[derive(Default)]
struct BraceCounter {
    depth: usize,
    opened: bool,
    closed: bool,
}

impl BraceCounter {
    fn feed(&mut self, line: &str) {
        let mut quote: Option<char> = None;
        let mut chars = line.chars().peekable();
        while let Some(ch) = chars.next() {
            if self.closed {
                return;
            }
            match quote {
                Some(q) => {
                    if ch == '\\' {
                        chars.next();
                    } else if ch == q {
                        quote = None;
                    }
                }
                None => match ch {
                    '"' | '\'' => quote = Some(ch),
                    '/' if chars.peek() == Some(&'/') => return,
                    '{' => {
                        self.depth += 1;
                        self.opened = true;
                    }
                    '}' if self.depth > 0 => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            self.closed = true;
                        }
                    }
                    _ => {}
                },
            }
        }
    }

    fn opened(&self) -> bool {
        self.opened
    }

    fn closed(&self) -> bool {
        self.closed
    }
}
