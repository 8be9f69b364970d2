//! Array subscript resolution: indices, slices, unions and wildcards
//!
//! A subscript such as `1`, `-1`, `2:5:2`, `*` or `0,2,-1` is parsed once at
//! compile time into a [`SliceSpec`] and resolved against a concrete sequence
//! length each time the query runs.

use smallvec::SmallVec;
use std::collections::HashSet;
use thiserror::Error;

/// Error produced when a subscript cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SliceError {
    #[error("malformed array index")]
    MalformedIndex,
    #[error("non-integer array index")]
    NonIntegerIndex,
    #[error("error in union member {index}: {source}")]
    UnionMember {
        index: usize,
        #[source]
        source: Box<SliceError>,
    },
}

impl SliceError {
    /// The underlying error, looking through union member wrappers
    pub fn root_cause(&self) -> &SliceError {
        match self {
            SliceError::UnionMember { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// One comma-separated member of a subscript
#[derive(Debug, Clone, PartialEq, Eq)]
enum Member {
    /// `*`
    Wildcard,
    /// `from[:to[:step]]`, one entry per colon segment (`None` when empty)
    Range(SmallVec<[Option<i64>; 3]>),
}

/// A parsed array subscript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceSpec {
    members: Vec<Member>,
}

impl SliceSpec {
    /// Parse subscript text (without the surrounding brackets)
    pub fn parse(subscript: &str) -> Result<Self, SliceError> {
        let union: Vec<&str> = subscript.split(',').collect();
        if union.len() == 1 {
            return Ok(Self {
                members: vec![parse_member(subscript)?],
            });
        }

        let members = union
            .iter()
            .enumerate()
            .map(|(index, member)| {
                parse_member(member).map_err(|e| SliceError::UnionMember {
                    index,
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { members })
    }

    /// Resolve against a sequence of `len` elements.
    ///
    /// Members are resolved independently and combined, keeping the first
    /// occurrence of each index. Indices outside `0..len` are dropped.
    pub fn resolve(&self, len: usize) -> Vec<usize> {
        let len = i64::try_from(len).unwrap_or(i64::MAX);

        if let [member] = self.members.as_slice() {
            let mut indices = Vec::new();
            resolve_member(member, len, &mut indices);
            return indices;
        }

        let mut seen = HashSet::new();
        let mut combined = Vec::new();
        let mut indices = Vec::new();
        for member in &self.members {
            indices.clear();
            resolve_member(member, len, &mut indices);
            for &i in &indices {
                if seen.insert(i) {
                    combined.push(i);
                }
            }
        }
        combined
    }
}

/// Parse `subscript` and resolve it against `len` in one go
pub fn resolve(subscript: &str, len: usize) -> Result<Vec<usize>, SliceError> {
    Ok(SliceSpec::parse(subscript)?.resolve(len))
}

fn parse_member(member: &str) -> Result<Member, SliceError> {
    if member == "*" {
        return Ok(Member::Wildcard);
    }

    let segments: Vec<&str> = member.split(':').collect();
    if segments.len() > 3 {
        return Err(SliceError::MalformedIndex);
    }

    let mut parts = SmallVec::new();
    for segment in segments {
        if segment.is_empty() {
            parts.push(None);
        } else {
            let n = segment
                .parse::<i64>()
                .map_err(|_| SliceError::NonIntegerIndex)?;
            parts.push(Some(n));
        }
    }
    Ok(Member::Range(parts))
}

fn resolve_member(member: &Member, len: i64, out: &mut Vec<usize>) {
    let parts = match member {
        Member::Wildcard => {
            walk(0, len, 1, len, out);
            return;
        }
        Member::Range(parts) => parts,
    };

    let first = parts.first().copied().flatten().unwrap_or(0);

    // A lone negative index walks backwards from its position.
    let (mut from, mut to, mut step) = if first < 0 {
        let from = len.saturating_add(first);
        (from, from.saturating_sub(1), -1)
    } else {
        (first, first.saturating_add(1), 1)
    };

    if let Some(end) = parts.get(1) {
        let end = end.unwrap_or(len);
        to = if end >= 0 { end } else { len.saturating_add(end) };
        if from < to {
            step = 1;
        }
    }

    if let Some(explicit) = parts.get(2) {
        step = explicit.unwrap_or(1);
    }

    if step < 0 && from <= to {
        (from, to) = (to.saturating_sub(1), from.saturating_sub(1));
    }

    walk(from, to, step, len, out);
}

/// Walk from `from` towards `to` (exclusive), keeping in-range indices only
fn walk(from: i64, to: i64, step: i64, len: i64, out: &mut Vec<usize>) {
    if step > 0 {
        let to = to.min(len);
        let mut i = from;
        if i < 0 {
            let skip = i.saturating_neg().saturating_add(step - 1) / step;
            i = i.saturating_add(skip.saturating_mul(step));
        }
        while i < to {
            if let Ok(index) = usize::try_from(i) {
                out.push(index);
            }
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else if step < 0 {
        let to = to.max(-1);
        let last = len - 1;
        let mut i = from;
        if i > last {
            let stride = step.saturating_neg();
            let skip = i.saturating_sub(last).saturating_add(stride - 1) / stride;
            i = i.saturating_sub(skip.saturating_mul(stride));
        }
        while i > to {
            if let Ok(index) = usize::try_from(i) {
                out.push(index);
            }
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
}
