//! Record formatting.
//!
//! Templates name record fields either in `{field:spec}` style, where spec is
//! `[[fill]align][width][.precision]`, or in `%(field)-8s` style.
//! Known fields: `asctime`, `levelname`, `levelno`, `name`, `message`,
//! `process`.

use std::fmt::{self, Write as _};

use chrono::format::{Item, StrftimeItems};

use crate::engine::Record;

/// Turns a record into one output line.
pub trait Format: Send + Sync {
    fn format(&self, record: &Record) -> String;
}

/// Default `asctime` rendering, e.g. `2024-05-01 12:00:00,123`.
pub const DEFAULT_DATEFMT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Template style of a formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Brace,
    Percent,
}

impl Style {
    pub fn parse(style: Option<&str>) -> Result<Self, String> {
        match style.unwrap_or("{") {
            "{" => Ok(Style::Brace),
            "%" => Ok(Style::Percent),
            other => Err(format!("unsupported style {:?}, expected '{{' or '%'", other)),
        }
    }

    fn default_template(&self) -> &'static str {
        match self {
            Style::Brace => "{message}",
            Style::Percent => "%(message)s",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    AscTime,
    LevelName,
    LevelNo,
    Name,
    Message,
    Process,
}

impl Field {
    fn parse(name: &str) -> Result<Self, String> {
        match name {
            "asctime" => Ok(Field::AscTime),
            "levelname" => Ok(Field::LevelName),
            "levelno" => Ok(Field::LevelNo),
            "name" => Ok(Field::Name),
            "message" => Ok(Field::Message),
            "process" => Ok(Field::Process),
            other => Err(format!("unknown record field {:?}", other)),
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Field::LevelNo | Field::Process)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Spec {
    fill: Option<char>,
    align: Option<Align>,
    width: Option<usize>,
    precision: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field { field: Field, spec: Spec },
}

/// Formatter driven by a compiled template.
#[derive(Debug, Clone)]
pub struct TemplateFormatter {
    segments: Vec<Segment>,
    datefmt: String,
    colored: bool,
}

impl TemplateFormatter {
    /// Compile a template. `None` falls back to the bare message.
    pub fn new(
        template: Option<&str>,
        style: Style,
        datefmt: Option<&str>,
        colored: bool,
    ) -> Result<Self, String> {
        let template = template.unwrap_or_else(|| style.default_template());
        let segments = match style {
            Style::Brace => parse_brace(template)?,
            Style::Percent => parse_percent(template)?,
        };
        let datefmt = datefmt.unwrap_or(DEFAULT_DATEFMT);
        if StrftimeItems::new(datefmt).any(|item| matches!(item, Item::Error)) {
            return Err(format!("invalid datefmt {:?}", datefmt));
        }
        Ok(Self {
            segments,
            datefmt: datefmt.to_string(),
            colored,
        })
    }

    /// `{message}` with no decoration; used when a handler names no formatter.
    pub fn bare() -> Self {
        Self {
            segments: vec![Segment::Field {
                field: Field::Message,
                spec: Spec::default(),
            }],
            datefmt: DEFAULT_DATEFMT.to_string(),
            colored: false,
        }
    }

    fn value(&self, field: Field, record: &Record) -> String {
        match field {
            Field::AscTime => {
                // Display of a bad strftime item fails instead of printing.
                let mut out = String::new();
                if write!(out, "{}", record.created.format(&self.datefmt)).is_err() {
                    out.clear();
                    let _ = write!(out, "{}", record.created.format(DEFAULT_DATEFMT));
                }
                out
            }
            Field::LevelName => record.level.to_string(),
            Field::LevelNo => record.level.as_number().to_string(),
            Field::Name => record.display_name().to_string(),
            Field::Message => record.message.clone(),
            Field::Process => std::process::id().to_string(),
        }
    }
}

impl Format for TemplateFormatter {
    fn format(&self, record: &Record) -> String {
        let mut line = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => line.push_str(text),
                Segment::Field { field, spec } => {
                    let rendered = apply_spec(&self.value(*field, record), spec, field.is_numeric());
                    if self.colored && *field == Field::LevelName {
                        line.push_str(level_color(record.level.as_number()));
                        line.push_str(&rendered);
                        line.push_str(RESET);
                    } else {
                        line.push_str(&rendered);
                    }
                }
            }
        }
        line
    }
}

/// One JSON object per record.
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter;

impl Format for JsonFormatter {
    fn format(&self, record: &Record) -> String {
        serde_json::json!({
            "time": record.created.to_rfc3339(),
            "level": record.level.to_string(),
            "logger": record.display_name(),
            "message": record.message,
        })
        .to_string()
    }
}

const RESET: &str = "\x1b[0m";

fn level_color(level: u32) -> &'static str {
    match level {
        0..=9 => "\x1b[2m",
        10..=19 => "\x1b[36m",
        20..=29 => "\x1b[32m",
        30..=39 => "\x1b[33m",
        40..=49 => "\x1b[31m",
        _ => "\x1b[1;31m",
    }
}

fn apply_spec(value: &str, spec: &Spec, numeric: bool) -> String {
    let truncated: String = match spec.precision {
        Some(precision) => value.chars().take(precision).collect(),
        None => value.to_string(),
    };
    let len = truncated.chars().count();
    let width = match spec.width {
        Some(width) if width > len => width,
        _ => return truncated,
    };

    let fill = spec.fill.unwrap_or(' ');
    let pad = width - len;
    let align = spec
        .align
        .unwrap_or(if numeric { Align::Right } else { Align::Left });
    let (left, right) = match align {
        Align::Left => (0, pad),
        Align::Right => (pad, 0),
        Align::Center => (pad / 2, pad - pad / 2),
    };

    let mut out = String::with_capacity(width);
    out.extend(std::iter::repeat(fill).take(left));
    out.push_str(&truncated);
    out.extend(std::iter::repeat(fill).take(right));
    out
}

fn parse_brace(template: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => inner.push(ch),
                        None => return Err(format!("unclosed '{{' in {:?}", template)),
                    }
                }
                let (name, spec) = match inner.split_once(':') {
                    Some((name, spec)) => (name, parse_brace_spec(spec)?),
                    None => (inner.as_str(), Spec::default()),
                };
                flush_literal(&mut segments, &mut literal);
                segments.push(Segment::Field {
                    field: Field::parse(name.trim())?,
                    spec,
                });
            }
            '}' => return Err(format!("single '}}' in {:?}", template)),
            other => literal.push(other),
        }
    }
    flush_literal(&mut segments, &mut literal);
    Ok(segments)
}

fn parse_brace_spec(spec: &str) -> Result<Spec, String> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;

    if chars.len() >= 2 {
        if let Some(align) = align_of(chars[1]) {
            out.fill = Some(chars[0]);
            out.align = Some(align);
            i = 2;
        }
    }
    if i == 0 {
        if let Some(align) = chars.first().copied().and_then(align_of) {
            out.align = Some(align);
            i = 1;
        }
    }

    let (width, next) = read_number(&chars, i);
    out.width = width;
    i = next;

    if chars.get(i) == Some(&'.') {
        let (precision, next) = read_number(&chars, i + 1);
        if precision.is_none() {
            return Err(format!("missing precision in format spec {:?}", spec));
        }
        out.precision = precision;
        i = next;
    }

    if matches!(chars.get(i), Some('s') | Some('d')) {
        i += 1;
    }
    if i != chars.len() {
        return Err(format!("unsupported format spec {:?}", spec));
    }
    Ok(out)
}

fn parse_percent(template: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            literal.push(chars[i]);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some('%') => {
                literal.push('%');
                i += 2;
            }
            Some('(') => {
                let close = chars[i + 2..]
                    .iter()
                    .position(|&c| c == ')')
                    .map(|p| p + i + 2)
                    .ok_or_else(|| format!("unclosed '%(' in {:?}", template))?;
                let name: String = chars[i + 2..close].iter().collect();
                i = close + 1;

                let mut spec = Spec::default();
                if chars.get(i) == Some(&'-') {
                    spec.align = Some(Align::Left);
                    i += 1;
                }
                let (width, next) = read_number(&chars, i);
                spec.width = width;
                i = next;
                if chars.get(i) == Some(&'.') {
                    let (precision, next) = read_number(&chars, i + 1);
                    spec.precision = precision;
                    i = next;
                }
                match chars.get(i) {
                    Some('s') | Some('d') | Some('r') => i += 1,
                    _ => return Err(format!("missing conversion after %({}) in {:?}", name, template)),
                }
                if spec.width.is_some() && spec.align.is_none() {
                    spec.align = Some(Align::Right);
                }

                flush_literal(&mut segments, &mut literal);
                segments.push(Segment::Field {
                    field: Field::parse(&name)?,
                    spec,
                });
            }
            _ => return Err(format!("stray '%' in {:?}", template)),
        }
    }
    flush_literal(&mut segments, &mut literal);
    Ok(segments)
}

fn align_of(c: char) -> Option<Align> {
    match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        _ => None,
    }
}

fn read_number(chars: &[char], start: usize) -> (Option<usize>, usize) {
    let mut end = start;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    if end == start {
        return (None, start);
    }
    let digits: String = chars[start..end].iter().collect();
    (digits.parse().ok(), end)
}

fn flush_literal(segments: &mut Vec<Segment>, literal: &mut String) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

impl fmt::Debug for dyn Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Format")
    }
}
