use indexmap::IndexMap;
use tracing::debug;

use crate::{DelimitedError, Delimiter};

/// Number of bytes the delimiter is detected on.
pub const SAMPLE_SIZE: usize = 4096;

// A delimiter must appear the same number of times on at least this share of lines.
const MIN_CONSISTENCY: f64 = 0.9;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    delimiter: char,
    per_line: usize,
    consistency: f64,
}

/// Returns the leading part of `text` the delimiter is detected on.
///
/// The sample stops at a character boundary; when the text is longer than the
/// sample, the last (partial) line is left out.
pub fn sample(text: &str) -> &str {
    if text.len() <= SAMPLE_SIZE {
        return text;
    }
    let mut end = SAMPLE_SIZE;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let sample = text.get(..end).unwrap_or_default();
    match sample.rfind('\n') {
        Some(last_newline) if last_newline > 0 => sample.get(..last_newline).unwrap_or(sample),
        _ => sample,
    }
}

/// Detects the delimiter of a sample.
///
/// A character is a candidate when it is neither alphanumeric, a quote nor a
/// line break, and it appears (outside double quotes) the same non-zero number
/// of times on almost every line. Among candidates, supported delimiters win in the order of
/// [`Delimiter::ALL`]; otherwise the most consistent candidate is reported.
///
/// # Errors
///
/// - [`DelimitedError::UndetectedDelimiter`] when no character qualifies
/// - [`DelimitedError::UnsupportedDelimiter`] when the detected character is
///   not one of the supported delimiters
pub fn sniff(sample: &str) -> Result<Delimiter, DelimitedError> {
    let lines: Vec<&str> = sample
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();

    let mut counts: IndexMap<char, Vec<usize>> = IndexMap::new();
    for (index, line) in lines.iter().enumerate() {
        let mut quoted = false;
        for ch in line.chars() {
            if ch == '"' {
                quoted = !quoted;
            }
            if quoted || !is_candidate(ch) {
                continue;
            }
            let per_line = counts.entry(ch).or_insert_with(|| vec![0; lines.len()]);
            if let Some(count) = per_line.get_mut(index) {
                *count += 1;
            }
        }
    }

    let candidates: Vec<Candidate> = counts
        .into_iter()
        .filter_map(|(delimiter, per_line)| consistent(delimiter, &per_line))
        .collect();
    debug!(?candidates, "delimiter candidates");

    let detected = |delimiter: &Delimiter| {
        candidates
            .iter()
            .any(|candidate| candidate.delimiter == delimiter.as_char())
    };
    if let Some(delimiter) = Delimiter::ALL.into_iter().find(detected) {
        return Ok(delimiter);
    }

    let best = candidates
        .iter()
        .max_by(|left, right| {
            left.consistency
                .total_cmp(&right.consistency)
                .then(left.per_line.cmp(&right.per_line))
        })
        .ok_or(DelimitedError::UndetectedDelimiter)?;

    Err(DelimitedError::UnsupportedDelimiter {
        delimiter: best.delimiter,
    })
}

fn is_candidate(ch: char) -> bool {
    !(ch.is_alphanumeric() || matches!(ch, '"' | '\'' | '\r' | '\n'))
}

// The most frequent per-line count, kept when it is non-zero and frequent enough.
#[allow(clippy::cast_precision_loss)]
fn consistent(delimiter: char, per_line: &[usize]) -> Option<Candidate> {
    let mut frequencies: IndexMap<usize, usize> = IndexMap::new();
    for count in per_line {
        *frequencies.entry(*count).or_default() += 1;
    }
    let (per_line_count, lines) = frequencies
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .max_by_key(|(_, lines)| *lines)?;

    let consistency = lines as f64 / per_line.len() as f64;
    (consistency >= MIN_CONSISTENCY).then_some(Candidate {
        delimiter,
        per_line: per_line_count,
        consistency,
    })
}
