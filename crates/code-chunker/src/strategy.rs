use crate::ast_analyzer::{Unit, UnitKind};
use crate::config::ChunkerConfig;
use crate::types::{Chunk, ChunkKind};

/// A planned chunk: owned range plus where its leading overlap begins
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Piece {
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub part: Option<u32>,
    pub start: usize,
    pub end: usize,
    pub context_start: usize,
}

impl Piece {
    fn whole(kind: ChunkKind, name: Option<String>, start: usize, end: usize) -> Self {
        Self {
            kind,
            name,
            part: None,
            start,
            end,
            context_start: start,
        }
    }

    pub fn into_chunk(self, file_path: &str, content: &str) -> Chunk {
        let chunk = Chunk::new(
            file_path,
            self.kind,
            self.name,
            self.start,
            &content[self.start..self.end],
        );
        let chunk = match self.part {
            Some(part) => chunk.with_part(part),
            None => chunk,
        };
        if self.context_start < self.start {
            chunk.with_leading_context(&content[self.context_start..self.start])
        } else {
            chunk
        }
    }
}

/// Where oversized ranges prefer to break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Breaks {
    /// Lines at the block's statement indentation, then any line
    Statements,
    /// Any line start
    Lines,
}

/// Expand units into pieces that respect `max_chunk_bytes`
pub(crate) fn plan_units(units: Vec<Unit>, content: &str, config: &ChunkerConfig) -> Vec<Piece> {
    let mut pieces = Vec::new();
    for unit in units {
        let kind = match unit.kind {
            UnitKind::Imports => ChunkKind::Imports,
            UnitKind::Class => ChunkKind::Class,
            UnitKind::Function => ChunkKind::Function,
            UnitKind::Other => ChunkKind::Generic,
        };
        if unit.end - unit.start <= config.max_chunk_bytes {
            pieces.push(Piece::whole(kind, unit.name, unit.start, unit.end));
            continue;
        }
        match unit.kind {
            UnitKind::Class if !unit.members.is_empty() => {
                for (kind, name, start, end) in member_ranges(&unit, content) {
                    if end - start <= config.max_chunk_bytes {
                        pieces.push(Piece::whole(kind, name, start, end));
                    } else {
                        let part = ChunkKind::FunctionPart;
                        pieces.extend(split_unit(part, name, start, end, content, config));
                    }
                }
            }
            UnitKind::Class | UnitKind::Function => {
                pieces.extend(split_unit(
                    ChunkKind::FunctionPart,
                    unit.name,
                    unit.start,
                    unit.end,
                    content,
                    config,
                ));
            }
            UnitKind::Imports => {
                let ranges = split_ranges(
                    content,
                    unit.start,
                    unit.end,
                    config.max_chunk_bytes,
                    Breaks::Lines,
                );
                pieces.extend(number_parts(ChunkKind::Imports, None, ranges));
            }
            UnitKind::Other => pieces.extend(window(content, unit.start, unit.end, config)),
        }
    }
    pieces
}

/// Generic sliding-window pieces over `start..end`
pub(crate) fn window(
    content: &str,
    start: usize,
    end: usize,
    config: &ChunkerConfig,
) -> Vec<Piece> {
    let ranges = split_ranges(content, start, end, config.max_chunk_bytes, Breaks::Lines);
    let mut pieces: Vec<Piece> = ranges
        .into_iter()
        .map(|(s, e)| Piece::whole(ChunkKind::Generic, None, s, e))
        .collect();
    apply_overlap(&mut pieces, content, config.overlap_bytes);
    pieces
}

/// Split a class into its header and one range per member
fn member_ranges(unit: &Unit, content: &str) -> Vec<(ChunkKind, Option<String>, usize, usize)> {
    let mut bounds: Vec<(usize, Option<String>)> = Vec::new();
    let mut last = unit.start;
    for member in &unit.members {
        let at = line_start(content, member.start).max(unit.start);
        if at > last {
            bounds.push((at, member.name.clone()));
            last = at;
        }
    }

    let mut ranges = Vec::new();
    let header_end = bounds.first().map_or(unit.end, |(at, _)| *at);
    if header_end > unit.start {
        ranges.push((ChunkKind::Class, unit.name.clone(), unit.start, header_end));
    }
    for (idx, (at, name)) in bounds.iter().enumerate() {
        let end = bounds.get(idx + 1).map_or(unit.end, |(next, _)| *next);
        ranges.push((ChunkKind::Method, name.clone(), *at, end));
    }
    ranges
}

fn split_unit(
    kind: ChunkKind,
    name: Option<String>,
    start: usize,
    end: usize,
    content: &str,
    config: &ChunkerConfig,
) -> Vec<Piece> {
    let ranges = split_ranges(content, start, end, config.max_chunk_bytes, Breaks::Statements);
    let mut pieces = number_parts(kind, name, ranges);
    apply_overlap(&mut pieces, content, config.overlap_bytes);
    pieces
}

fn number_parts(kind: ChunkKind, name: Option<String>, ranges: Vec<(usize, usize)>) -> Vec<Piece> {
    ranges
        .into_iter()
        .zip(1u32..)
        .map(|((start, end), part)| Piece {
            kind,
            name: name.clone(),
            part: Some(part),
            start,
            end,
            context_start: start,
        })
        .collect()
}

/// Carry up to `overlap` trailing bytes of each piece into the next one
fn apply_overlap(pieces: &mut [Piece], content: &str, overlap: usize) {
    if overlap == 0 {
        return;
    }
    for idx in 1..pieces.len() {
        let prev_start = pieces[idx - 1].start;
        let start = pieces[idx].start;
        let mut from = start.saturating_sub(overlap).max(prev_start);
        while from < start && !content.is_char_boundary(from) {
            from += 1;
        }
        let at_line_start = from == 0 || content.as_bytes()[from - 1] == b'\n';
        if !at_line_start {
            if let Some(nl) = content[from..start].find('\n') {
                if from + nl + 1 < start {
                    from += nl + 1;
                }
            }
        }
        pieces[idx].context_start = from;
    }
}

/// Cut `start..end` into consecutive ranges no longer than `max` bytes
pub(crate) fn split_ranges(
    content: &str,
    start: usize,
    end: usize,
    max: usize,
    breaks: Breaks,
) -> Vec<(usize, usize)> {
    if start >= end {
        return Vec::new();
    }
    let lines = line_starts(content, start, end);
    let preferred = match breaks {
        Breaks::Statements => statement_starts(content, &lines, end),
        Breaks::Lines => Vec::new(),
    };

    let mut ranges = Vec::new();
    let mut cursor = start;
    while end - cursor > max {
        let limit = cursor + max;
        let cut = last_within(&preferred, cursor, limit)
            .or_else(|| last_within(&lines, cursor, limit))
            .unwrap_or_else(|| floor_char_boundary(content, limit, cursor));
        ranges.push((cursor, cut));
        cursor = cut;
    }
    ranges.push((cursor, end));
    ranges
}

fn last_within(sorted: &[usize], after: usize, limit: usize) -> Option<usize> {
    let idx = sorted.partition_point(|&at| at <= limit);
    sorted[..idx].last().copied().filter(|&at| at > after)
}

fn floor_char_boundary(content: &str, mut at: usize, floor: usize) -> usize {
    while at > floor + 1 && !content.is_char_boundary(at) {
        at -= 1;
    }
    if content.is_char_boundary(at) {
        return at;
    }
    // A single character wider than the limit: take it whole.
    let mut at = floor + 1;
    while !content.is_char_boundary(at) {
        at += 1;
    }
    at
}

/// Offsets of line starts strictly inside `start..end`
fn line_starts(content: &str, start: usize, end: usize) -> Vec<usize> {
    content.as_bytes()[start..end]
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'\n')
        .map(|(idx, _)| start + idx + 1)
        .filter(|&at| at < end)
        .collect()
}

/// Line starts whose indentation equals the shallowest indentation of the
/// block body (first line excluded)
fn statement_starts(content: &str, lines: &[usize], end: usize) -> Vec<usize> {
    let indents: Vec<(usize, Option<usize>)> = lines
        .iter()
        .map(|&at| (at, indentation(content, at, end)))
        .collect();
    let Some(base) = indents.iter().filter_map(|(_, indent)| *indent).min() else {
        return Vec::new();
    };
    indents
        .into_iter()
        .filter(|(_, indent)| *indent == Some(base))
        .map(|(at, _)| at)
        .collect()
}

/// Indentation width of the line at `at`, `None` for blank lines
fn indentation(content: &str, at: usize, end: usize) -> Option<usize> {
    let line_end = content[at..end].find('\n').map_or(end, |idx| at + idx);
    let line = &content[at..line_end];
    let trimmed = line.trim_start_matches([' ', '\t']);
    if trimmed.trim().is_empty() {
        None
    } else {
        Some(line.len() - trimmed.len())
    }
}

fn line_start(content: &str, at: usize) -> usize {
    content[..at].rfind('\n').map_or(0, |idx| idx + 1)
}
