//! LDAP search filter strings: assembly, escaping, parsing, and in-memory
//! entry matching.
//!
//! The resource mapper emits filter strings; the configured search filter
//! has to be re-applied against single entries (reads hide entries the
//! filter excludes), so the gateway also parses the RFC 4515 subset it
//! emits: `and`, `or`, `not`, equality, substring, presence, and the
//! ordered comparisons.

use super::Entry;

/// Escape an assertion value for embedding in a filter string.
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// A parsed LDAP search filter.
#[derive(Debug, Clone, PartialEq)]
pub enum LdapFilter {
    /// `(&(...)...)`
    And(Vec<LdapFilter>),
    /// `(|(...)...)`
    Or(Vec<LdapFilter>),
    /// `(!(...))`
    Not(Box<LdapFilter>),
    /// `(attr=value)`
    Equality(String, String),
    /// `(attr=initial*any*final)`
    Substring {
        /// Attribute type
        attribute: String,
        /// Leading fragment, if anchored at the start
        initial: Option<String>,
        /// Unanchored middle fragments
        any: Vec<String>,
        /// Trailing fragment, if anchored at the end
        final_part: Option<String>,
    },
    /// `(attr=*)`
    Present(String),
    /// `(attr>=value)`
    GreaterOrEqual(String, String),
    /// `(attr<=value)`
    LessOrEqual(String, String),
}

impl LdapFilter {
    /// Parse a filter string.
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut parser = Parser {
            chars: input.trim().char_indices().collect(),
            pos: 0,
            input,
        };
        let filter = parser.parse_filter()?;
        if parser.pos != parser.chars.len() {
            return Err(format!("trailing input in filter '{input}'"));
        }
        Ok(filter)
    }

    /// Evaluate this filter against an entry.
    ///
    /// Attribute matching follows `caseIgnoreMatch`: values compare
    /// case-insensitively, which is what the directory does for the
    /// attribute types the gateway maps.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            LdapFilter::And(children) => children.iter().all(|c| c.matches(entry)),
            LdapFilter::Or(children) => children.iter().any(|c| c.matches(entry)),
            LdapFilter::Not(child) => !child.matches(entry),
            LdapFilter::Present(attribute) => entry.has_attribute(attribute),
            LdapFilter::Equality(attribute, wanted) => entry
                .string_values(attribute)
                .iter()
                .any(|v| v.eq_ignore_ascii_case(wanted)),
            LdapFilter::Substring {
                attribute,
                initial,
                any,
                final_part,
            } => entry
                .string_values(attribute)
                .iter()
                .any(|v| substring_matches(v, initial.as_deref(), any, final_part.as_deref())),
            LdapFilter::GreaterOrEqual(attribute, wanted) => entry
                .string_values(attribute)
                .iter()
                .any(|v| ordered(v, wanted).is_ge()),
            LdapFilter::LessOrEqual(attribute, wanted) => entry
                .string_values(attribute)
                .iter()
                .any(|v| ordered(v, wanted).is_le()),
        }
    }
}

/// Numeric when both sides parse as integers, otherwise case-folded
/// lexicographic. Generalized-time values order correctly either way.
fn ordered(actual: &str, wanted: &str) -> std::cmp::Ordering {
    match (actual.parse::<i64>(), wanted.parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => actual.to_lowercase().cmp(&wanted.to_lowercase()),
    }
}

fn substring_matches(
    value: &str,
    initial: Option<&str>,
    any: &[String],
    final_part: Option<&str>,
) -> bool {
    let value = value.to_lowercase();
    let mut rest = value.as_str();
    if let Some(initial) = initial {
        let initial = initial.to_lowercase();
        if !rest.starts_with(&initial) {
            return false;
        }
        rest = &rest[initial.len()..];
    }
    for fragment in any {
        let fragment = fragment.to_lowercase();
        match rest.find(&fragment) {
            Some(idx) => rest = &rest[idx + fragment.len()..],
            None => return false,
        }
    }
    if let Some(final_part) = final_part {
        let final_part = final_part.to_lowercase();
        return rest.ends_with(&final_part);
    }
    true
}

impl std::fmt::Display for LdapFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LdapFilter::And(children) => {
                write!(f, "(&")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            LdapFilter::Or(children) => {
                write!(f, "(|")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            LdapFilter::Not(child) => write!(f, "(!{child})"),
            LdapFilter::Equality(attribute, value) => {
                write!(f, "({attribute}={})", escape_value(value))
            }
            LdapFilter::Substring {
                attribute,
                initial,
                any,
                final_part,
            } => {
                write!(f, "({attribute}=")?;
                if let Some(initial) = initial {
                    write!(f, "{}", escape_value(initial))?;
                }
                write!(f, "*")?;
                for fragment in any {
                    write!(f, "{}*", escape_value(fragment))?;
                }
                if let Some(final_part) = final_part {
                    write!(f, "{}", escape_value(final_part))?;
                }
                write!(f, ")")
            }
            LdapFilter::Present(attribute) => write!(f, "({attribute}=*)"),
            LdapFilter::GreaterOrEqual(attribute, value) => {
                write!(f, "({attribute}>={})", escape_value(value))
            }
            LdapFilter::LessOrEqual(attribute, value) => {
                write!(f, "({attribute}<={})", escape_value(value))
            }
        }
    }
}

struct Parser<'a> {
    chars: Vec<(usize, char)>,
    pos: usize,
    input: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn expect(&mut self, wanted: char) -> Result<(), String> {
        match self.next() {
            Some(c) if c == wanted => Ok(()),
            _ => Err(format!("expected '{wanted}' in filter '{}'", self.input)),
        }
    }

    fn parse_filter(&mut self) -> Result<LdapFilter, String> {
        self.expect('(')?;
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                LdapFilter::And(self.parse_children()?)
            }
            Some('|') => {
                self.pos += 1;
                LdapFilter::Or(self.parse_children()?)
            }
            Some('!') => {
                self.pos += 1;
                let child = self.parse_filter()?;
                LdapFilter::Not(Box::new(child))
            }
            Some(_) => self.parse_comparison()?,
            None => return Err(format!("truncated filter '{}'", self.input)),
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_children(&mut self) -> Result<Vec<LdapFilter>, String> {
        let mut children = Vec::new();
        while self.peek() == Some('(') {
            children.push(self.parse_filter()?);
        }
        if children.is_empty() {
            return Err(format!("empty filter set in '{}'", self.input));
        }
        Ok(children)
    }

    fn parse_comparison(&mut self) -> Result<LdapFilter, String> {
        let mut attribute = String::new();
        loop {
            match self.peek() {
                Some('=') | Some('>') | Some('<') => break,
                Some(')') | None => {
                    return Err(format!("missing comparator in filter '{}'", self.input));
                }
                Some(c) => {
                    attribute.push(c);
                    self.pos += 1;
                }
            }
        }
        if attribute.is_empty() {
            return Err(format!("empty attribute type in filter '{}'", self.input));
        }
        match self.next() {
            Some('>') => {
                self.expect('=')?;
                let value = self.parse_value()?;
                Ok(LdapFilter::GreaterOrEqual(attribute, unescape(&value)?))
            }
            Some('<') => {
                self.expect('=')?;
                let value = self.parse_value()?;
                Ok(LdapFilter::LessOrEqual(attribute, unescape(&value)?))
            }
            Some('=') => {
                let raw = self.parse_value()?;
                if raw == "*" {
                    return Ok(LdapFilter::Present(attribute));
                }
                if raw.contains('*') {
                    let mut parts = raw.split('*');
                    let initial = parts.next().map(String::from).filter(|p| !p.is_empty());
                    let mut middle: Vec<String> = parts.map(String::from).collect();
                    let final_part = middle.pop().filter(|p| !p.is_empty());
                    let mut any = Vec::new();
                    for fragment in middle.into_iter().filter(|p| !p.is_empty()) {
                        any.push(unescape(&fragment)?);
                    }
                    return Ok(LdapFilter::Substring {
                        attribute,
                        initial: initial.map(|p| unescape(&p)).transpose()?,
                        any,
                        final_part: final_part.map(|p| unescape(&p)).transpose()?,
                    });
                }
                Ok(LdapFilter::Equality(attribute, unescape(&raw)?))
            }
            _ => Err(format!("missing comparator in filter '{}'", self.input)),
        }
    }

    fn parse_value(&mut self) -> Result<String, String> {
        let mut value = String::new();
        while let Some(c) = self.peek() {
            if c == ')' {
                break;
            }
            value.push(c);
            self.pos += 1;
        }
        Ok(value)
    }
}

fn unescape(value: &str) -> Result<String, String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let hi = chars.next();
            let lo = chars.next();
            let (Some(hi), Some(lo)) = (hi, lo) else {
                return Err(format!("truncated escape in value '{value}'"));
            };
            let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16)
                .map_err(|_| format!("invalid escape in value '{value}'"))?;
            out.push(byte as char);
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Entry {
        let mut entry = Entry::new("uid=bjensen,ou=People,dc=example,dc=com");
        entry.add_str_value("objectClass", "inetOrgPerson");
        entry.add_str_value("uid", "bjensen");
        entry.add_str_value("mail", "bjensen@Example.com");
        entry.add_str_value("createTimestamp", "20200101000000.000Z");
        entry
    }

    #[test]
    fn display_round_trips_through_parse() {
        for text in [
            "(objectClass=inetOrgPerson)",
            "(&(uid=bjensen)(mail=*example*))",
            "(|(cn=a)(cn=b))",
            "(!(uid=root))",
            "(mail=bjensen*)",
            "(createTimestamp>=20200101000000.000Z)",
            "(uid=*)",
        ] {
            let filter = LdapFilter::parse(text).unwrap();
            assert_eq!(filter.to_string(), text);
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        let entry = person();
        assert!(LdapFilter::parse("(UID=BJENSEN)").unwrap().matches(&entry));
        assert!(LdapFilter::parse("(mail=*example.COM)").unwrap().matches(&entry));
        assert!(!LdapFilter::parse("(uid=other)").unwrap().matches(&entry));
    }

    #[test]
    fn boolean_combinators_compose() {
        let entry = person();
        assert!(
            LdapFilter::parse("(&(objectClass=inetOrgPerson)(uid=bjensen))")
                .unwrap()
                .matches(&entry)
        );
        assert!(
            LdapFilter::parse("(|(uid=nobody)(mail=bjensen*))")
                .unwrap()
                .matches(&entry)
        );
        assert!(!LdapFilter::parse("(!(uid=bjensen))").unwrap().matches(&entry));
    }

    #[test]
    fn ordered_comparisons_cover_generalized_time() {
        let entry = person();
        assert!(
            LdapFilter::parse("(createTimestamp>=20190101000000.000Z)")
                .unwrap()
                .matches(&entry)
        );
        assert!(
            !LdapFilter::parse("(createTimestamp<=20190101000000.000Z)")
                .unwrap()
                .matches(&entry)
        );
    }

    #[test]
    fn escaped_values_round_trip() {
        let escaped = escape_value(r"a*b(c)d\e");
        assert_eq!(escaped, r"a\2ab\28c\29d\5ce");
        let filter = LdapFilter::parse(&format!("(cn={escaped})")).unwrap();
        assert_eq!(filter, LdapFilter::Equality("cn".into(), r"a*b(c)d\e".into()));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        for bad in ["", "(", "(uid=bjensen", "(&)", "(=x)", "uid=x", "(uid~x)"] {
            assert!(LdapFilter::parse(bad).is_err(), "expected error for {bad:?}");
        }
    }
}
