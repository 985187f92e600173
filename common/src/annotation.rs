//! The textual protocol carried by annotation markers.
//!
//! Three dialects are distinguished by a fixed prefix:
//! - `assertion,<kind>[(<params>)][,<uid>]`: an assertion on a use site
//!   (variable declaration, assignment or a function's return value),
//! - `assertion.meta,<kind>,<uid>,...`: the assertion instances whose state a
//!   function expects from its callers,
//! - `assertion.funcall[,<uid>,...]`: the caller's states to route into the
//!   hidden parameters of the call just made.
//!
//! Decoding is total: anything that does not match one of them is
//! [`Annotation::Unrecognized`].

use core::fmt;

use const_format::concatcp;
use derive_more::{Display, From, Into};
use smallvec::SmallVec;

const PREFIX_BASE: &str = "assertion";
pub const ASSERTION_PREFIX: &str = concatcp!(PREFIX_BASE, ",");
pub const META_PREFIX: &str = concatcp!(PREFIX_BASE, ".meta,");
pub const FUNCALL_PREFIX: &str = concatcp!(PREFIX_BASE, ".funcall");

/// Identifies one assertion instance inside its enclosing function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
#[display("{_0}")]
pub struct Uid(pub u32);

impl core::str::FromStr for Uid {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Uid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionParam {
    Int(i64),
    Str(String),
}

impl fmt::Display for AssertionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionParam::Int(value) => write!(f, "{value}"),
            AssertionParam::Str(value) => write!(f, "\"{value}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionDescriptor {
    pub kind: String,
    pub uid: Uid,
    pub params: Vec<AssertionParam>,
}

impl fmt::Display for AssertionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ASSERTION_PREFIX, self.kind)?;
        if !self.params.is_empty() {
            write!(f, "(")?;
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{param}")?;
            }
            write!(f, ")")?;
        }
        write!(f, ",{}", self.uid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaBinding {
    pub uid: Uid,
    pub kind: String,
}

pub type UidList = SmallVec<[Uid; 2]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Assertion(AssertionDescriptor),
    MetaBinding(Vec<MetaBinding>),
    FuncallForwarding(UidList),
    Unrecognized,
}

impl Annotation {
    pub fn decode(text: &str) -> Annotation {
        let decoded = if let Some(rest) = text.strip_prefix(META_PREFIX) {
            decode_meta(rest).map(Annotation::MetaBinding)
        } else if let Some(rest) = text.strip_prefix(FUNCALL_PREFIX) {
            decode_funcall(rest).map(Annotation::FuncallForwarding)
        } else if let Some(rest) = text.strip_prefix(ASSERTION_PREFIX) {
            decode_assertion(rest).map(Annotation::Assertion)
        } else {
            None
        };
        decoded.unwrap_or(Annotation::Unrecognized)
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Annotation::Unrecognized)
    }
}

fn decode_meta(rest: &str) -> Option<Vec<MetaBinding>> {
    if rest.trim().is_empty() {
        return Some(Vec::new());
    }

    let items = rest.split(',').collect::<Vec<_>>();
    if items.len() % 2 != 0 {
        return None;
    }
    items
        .chunks_exact(2)
        .map(|pair| {
            let kind = valid_kind(pair[0])?;
            let uid = pair[1].parse().ok()?;
            Some(MetaBinding {
                uid,
                kind: kind.to_owned(),
            })
        })
        .collect()
}

fn decode_funcall(rest: &str) -> Option<UidList> {
    if rest.is_empty() {
        return Some(UidList::new());
    }
    let list = rest.strip_prefix(',')?;
    if list.trim().is_empty() {
        return Some(UidList::new());
    }
    list.split(',').map(|uid| uid.parse().ok()).collect()
}

fn decode_assertion(rest: &str) -> Option<AssertionDescriptor> {
    let kind_end = rest.find(['(', ',']).unwrap_or(rest.len());
    let kind = valid_kind(&rest[..kind_end])?.to_owned();
    let mut rest = &rest[kind_end..];

    let mut params = Vec::new();
    if rest.starts_with('(') {
        let close = matching_paren(rest)?;
        params = split_params(&rest[1..close])
            .into_iter()
            .map(decode_param)
            .collect();
        rest = &rest[close + 1..];
    }

    let uid = match rest {
        "" => Uid(0),
        _ => rest.strip_prefix(',')?.parse().ok()?,
    };

    Some(AssertionDescriptor { kind, uid, params })
}

fn valid_kind(kind: &str) -> Option<&str> {
    let kind = kind.trim();
    let is_ident = !kind.is_empty()
        && kind
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !kind.starts_with(|c: char| c.is_ascii_digit());
    is_ident.then_some(kind)
}

/// Index of the parenthesis closing the one at index 0.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits on commas that are neither nested in parentheses nor quoted.
fn split_params(text: &str) -> Vec<&str> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes && depth == 0 => {
                params.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&text[start..]);
    params
}

fn decode_param(param: &str) -> AssertionParam {
    let param = param.trim();
    match param.parse::<i64>() {
        Ok(value) => AssertionParam::Int(value),
        Err(_) => {
            let unquoted = param
                .strip_prefix('"')
                .and_then(|p| p.strip_suffix('"'))
                .unwrap_or(param);
            AssertionParam::Str(unquoted.to_owned())
        }
    }
}
