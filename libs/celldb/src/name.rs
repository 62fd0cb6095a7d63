//! Element names.
//!
//! A name is either a single signal name (`out`, `d[3]`) or a bus/array
//! name that expands to several single-bit subnames: `d[0:3]`, `a,b,c`,
//! `m[1:0][0:1]`. Names of the form `<prefix>@<number>` are temporary names
//! assigned automatically by editors; they never name a net.
//!
//! Names order by a locale-independent string+embedded-number comparison,
//! so `in2 < in10`.

use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arcstr::ArcStr;

use crate::error::{Error, Result};

/// The maximum number of subnames a single name may expand to.
pub const MAX_WIDTH: usize = 1 << 20;

/// A validated element name.
#[derive(Clone)]
pub struct Name(Arc<NameInner>);

struct NameInner {
    text: ArcStr,
    subnames: Box<[ArcStr]>,
    temp: bool,
}

/// Compares two names in string+embedded-number order.
///
/// Case is ignored first; ties are broken case-sensitively and finally by
/// raw bytes, so the order is total and consistent with string equality.
pub fn compare(a: &str, b: &str) -> Ordering {
    natord::compare_ignore_case(a, b)
        .then_with(|| natord::compare(a, b))
        .then_with(|| a.cmp(b))
}

impl Name {
    /// Parses and validates a name.
    pub fn parse(text: impl Into<ArcStr>) -> Result<Self> {
        let text = text.into();
        let invalid = |reason| Error::InvalidName {
            name: text.clone(),
            reason,
        };
        if text.is_empty() {
            return Err(invalid("empty name"));
        }
        if text.trim() != text.as_str() {
            return Err(invalid("leading or trailing whitespace"));
        }
        let mut subnames = Vec::new();
        for element in split_top_level(&text).map_err(invalid)? {
            expand_element(element, &mut subnames).map_err(invalid)?;
            if subnames.len() > MAX_WIDTH {
                return Err(invalid("bus too wide"));
            }
        }
        let temp = is_temp_text(&text);
        Ok(Self(Arc::new(NameInner {
            text,
            subnames: subnames.into_boxed_slice(),
            temp,
        })))
    }

    /// Creates the temporary name `<base>@<n>`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is not a plain identifier.
    pub fn temp(base: &str, n: u32) -> Self {
        assert!(
            !base.is_empty() && base.chars().all(|c| c.is_alphanumeric() || c == '_'),
            "temporary name base must be a plain identifier"
        );
        let text = arcstr::format!("{}@{}", base, n);
        Self(Arc::new(NameInner {
            subnames: Box::new([text.clone()]),
            text,
            temp: true,
        }))
    }

    /// The name as written.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0.text
    }

    /// The name as written.
    #[inline]
    pub fn text(&self) -> &ArcStr {
        &self.0.text
    }

    /// The number of single-bit subnames.
    #[inline]
    pub fn width(&self) -> usize {
        self.0.subnames.len()
    }

    /// Returns `true` if this name expands to more than one subname.
    #[inline]
    pub fn is_bus(&self) -> bool {
        self.width() > 1
    }

    /// Returns `true` for automatically assigned temporary names.
    #[inline]
    pub fn is_temp(&self) -> bool {
        self.0.temp
    }

    /// The `i`th subname.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.width()`.
    #[inline]
    pub fn subname(&self, i: usize) -> &ArcStr {
        &self.0.subnames[i]
    }

    /// Iterates over the single-bit subnames.
    #[inline]
    pub fn subnames(&self) -> impl Iterator<Item = &ArcStr> {
        self.0.subnames.iter()
    }
}

fn split_top_level(text: &str) -> std::result::Result<Vec<&str>, &'static str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1).ok_or("unbalanced brackets")?,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unbalanced brackets");
    }
    parts.push(&text[start..]);
    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err("empty array element");
    }
    Ok(parts)
}

fn expand_element(element: &str, out: &mut Vec<ArcStr>) -> std::result::Result<(), &'static str> {
    let element = element.trim();
    let (base, mut rest) = match element.find('[') {
        Some(i) => (&element[..i], &element[i..]),
        None => (element, ""),
    };
    if base.is_empty() {
        return Err("empty array element");
    }
    if base.contains(']') {
        return Err("unbalanced brackets");
    }
    let mut expanded = vec![String::from(base)];
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err("text after index");
        }
        let close = rest.find(']').ok_or("unbalanced brackets")?;
        let indices = parse_indices(&rest[1..close])?;
        if expanded.len().saturating_mul(indices.len()) > MAX_WIDTH {
            return Err("bus too wide");
        }
        expanded = expanded
            .iter()
            .flat_map(|prefix| indices.iter().map(move |i| format!("{}[{}]", prefix, i)))
            .collect();
        rest = &rest[close + 1..];
    }
    out.extend(expanded.into_iter().map(ArcStr::from));
    Ok(())
}

fn parse_indices(group: &str) -> std::result::Result<Vec<String>, &'static str> {
    let mut indices = Vec::new();
    for item in group.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err("empty array element");
        }
        match item.split_once(':') {
            Some((lo, hi)) => {
                let lo: i64 = lo.trim().parse().map_err(|_| "malformed index range")?;
                let hi: i64 = hi.trim().parse().map_err(|_| "malformed index range")?;
                if lo.abs_diff(hi) as usize >= MAX_WIDTH {
                    return Err("bus too wide");
                }
                if lo <= hi {
                    indices.extend((lo..=hi).map(|i| i.to_string()));
                } else {
                    indices.extend((hi..=lo).rev().map(|i| i.to_string()));
                }
            }
            None => indices.push(item.to_string()),
        }
    }
    Ok(indices)
}

fn is_temp_text(text: &str) -> bool {
    match text.rsplit_once('@') {
        Some((prefix, number)) => {
            !prefix.is_empty()
                && prefix.chars().all(|c| c.is_alphanumeric() || c == '_')
                && !number.is_empty()
                && number.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.text == other.0.text
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.text.hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self.as_str(), other.as_str())
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0.text.as_str())
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.text)
    }
}

impl TryFrom<&str> for Name {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(ArcStr::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn subnames(name: &str) -> Vec<String> {
        Name::parse(ArcStr::from(name))
            .unwrap()
            .subnames()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn expands_ranges_and_lists() {
        assert_eq!(subnames("d[0:2]"), vec!["d[0]", "d[1]", "d[2]"]);
        assert_eq!(subnames("d[2:1]"), vec!["d[2]", "d[1]"]);
        assert_eq!(subnames("a,b[1]"), vec!["a", "b[1]"]);
        assert_eq!(subnames("m[0:1][3]"), vec!["m[0][3]", "m[1][3]"]);
        assert_eq!(subnames("x[0,2]"), vec!["x[0]", "x[2]"]);
    }

    #[test]
    fn single_bit_names() {
        let name = Name::try_from("out").unwrap();
        assert_eq!(name.width(), 1);
        assert!(!name.is_bus());
        assert_eq!(name.subname(0).as_str(), "out");
        assert!(!Name::try_from("d[3]").unwrap().is_bus());
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["", "a,,b", "a[]", "[1]", "a[1:]", "a[0", "a]", " a", "a[1]x", "a[0,]"] {
            assert!(Name::try_from(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn temporary_names() {
        assert!(Name::try_from("net@12").unwrap().is_temp());
        assert!(Name::temp("pin", 3).is_temp());
        assert_eq!(Name::temp("pin", 3).as_str(), "pin@3");
        assert!(!Name::try_from("net@").unwrap().is_temp());
        assert!(!Name::try_from("clk").unwrap().is_temp());
    }

    #[test]
    fn embedded_numbers_order_numerically() {
        let mut names: Vec<Name> = ["in10", "in2", "In3", "in1"]
            .into_iter()
            .map(|s| Name::try_from(s).unwrap())
            .collect();
        names.sort();
        let sorted: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(sorted, vec!["in1", "in2", "In3", "in10"]);
        assert_eq!(compare("A", "a"), Ordering::Less);
        assert_ne!(compare("A", "a"), Ordering::Equal);
    }
}
