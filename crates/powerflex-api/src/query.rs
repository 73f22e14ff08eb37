// Filter and field-projection encoding
//
// The gateway accepts a `filter` query parameter in a small prefix
// grammar and a `fields` parameter listing the attributes to return:
//
//   filter := clause | and(clause,clause,...)
//   clause := eq,<field>,<value> | or(eq,<field>,<value>,...)
//
// Values escape `\`, `,`, `(` and `)` with a backslash. Fields and values
// are emitted in sorted order so the fragment depends only on the mapping.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::Error;

const ESCAPE: char = '\\';
const RESERVED: [char; 4] = [ESCAPE, ',', '(', ')'];

/// Field → acceptable values. OR within a field, AND across fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    fields: BTreeMap<String, BTreeSet<String>>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`, replacing earlier constraints on it.
    pub fn eq(mut self, field: impl Into<String>, value: impl Display) -> Self {
        self.fields
            .insert(field.into(), BTreeSet::from([value.to_string()]));
        self
    }

    /// Require `field` to equal any of `values`.
    pub fn any_of<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        self.fields.insert(
            field.into(),
            values.into_iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Accepted values for `field`, if constrained.
    pub fn values(&self, field: &str) -> Option<&BTreeSet<String>> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Ordered list of fields to return. Empty means all fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldProjection(Vec<String>);

impl FieldProjection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    /// Project onto every field.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for FieldProjection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

// ── Encoding ────────────────────────────────────────────────────────

fn check_field_name(field: &str) -> Result<(), Error> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_option(format!(
            "invalid filter field name {field:?}"
        )))
    }
}

fn escape_value(field: &str, value: &str, out: &mut String) -> Result<(), Error> {
    for c in value.chars() {
        if c.is_control() {
            return Err(Error::invalid_option(format!(
                "filter value for {field:?} contains an unescapable control character"
            )));
        }
        if RESERVED.contains(&c) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    Ok(())
}

fn encode_clause(field: &str, values: &BTreeSet<String>, out: &mut String) -> Result<(), Error> {
    check_field_name(field)?;
    if values.is_empty() {
        return Err(Error::invalid_option(format!(
            "filter field {field:?} has no acceptable values"
        )));
    }

    let grouped = values.len() > 1;
    if grouped {
        out.push_str("or(");
    }
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str("eq,");
        out.push_str(field);
        out.push(',');
        escape_value(field, value, out)?;
    }
    if grouped {
        out.push(')');
    }
    Ok(())
}

/// Encode a filter into the gateway's `filter` query fragment.
///
/// Returns `None` for an empty filter so the parameter can be omitted.
pub fn encode_filter(spec: &FilterSpec) -> Result<Option<String>, Error> {
    if spec.is_empty() {
        return Ok(None);
    }

    let mut out = String::new();
    let grouped = spec.len() > 1;
    if grouped {
        out.push_str("and(");
    }
    for (i, (field, values)) in spec.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        encode_clause(field, values, &mut out)?;
    }
    if grouped {
        out.push(')');
    }
    Ok(Some(out))
}

/// Encode a projection into the gateway's `fields` query value.
///
/// Returns `None` for an empty projection (all fields).
pub fn encode_fields(projection: &FieldProjection) -> Result<Option<String>, Error> {
    if projection.is_empty() {
        return Ok(None);
    }
    for field in projection.as_slice() {
        if field.is_empty() || field.contains(',') || field.chars().any(char::is_whitespace) {
            return Err(Error::invalid_option(format!(
                "invalid projected field name {field:?}"
            )));
        }
    }
    Ok(Some(projection.as_slice().join(",")))
}

// ── Decoding ────────────────────────────────────────────────────────

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl Parser<'_> {
    /// Read up to the next unescaped delimiter, unescaping as we go.
    fn word(&mut self) -> Result<String, Error> {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                ',' | '(' | ')' => break,
                ESCAPE => {
                    self.chars.next();
                    let escaped = self
                        .chars
                        .next()
                        .ok_or_else(|| Error::invalid_option("dangling escape in filter"))?;
                    word.push(escaped);
                }
                _ => {
                    self.chars.next();
                    word.push(c);
                }
            }
        }
        Ok(word)
    }

    fn expect(&mut self, wanted: char) -> Result<(), Error> {
        match self.chars.next() {
            Some(c) if c == wanted => Ok(()),
            other => Err(malformed(format!("expected {wanted:?}, found {other:?}"))),
        }
    }

    /// The rest of `eq,<field>,<value>` once the `eq` head is read.
    fn eq_body(&mut self) -> Result<(String, String), Error> {
        self.expect(',')?;
        let field = self.word()?;
        check_field_name(&field)?;
        self.expect(',')?;
        let value = self.word()?;
        Ok((field, value))
    }

    /// Comma-separated members of a parenthesised group.
    fn group<T>(
        &mut self,
        mut member: impl FnMut(&mut Self) -> Result<T, Error>,
    ) -> Result<Vec<T>, Error> {
        self.expect('(')?;
        let mut members = Vec::new();
        loop {
            members.push(member(self)?);
            match self.chars.next() {
                Some(',') => {}
                Some(')') => return Ok(members),
                other => return Err(malformed(format!("unexpected {other:?} in group"))),
            }
        }
    }

    /// `eq,f,v` or `or(eq,f,v,eq,f,w,...)` over a single field.
    fn clause(&mut self, head: &str) -> Result<(String, BTreeSet<String>), Error> {
        match head {
            "eq" => {
                let (field, value) = self.eq_body()?;
                Ok((field, BTreeSet::from([value])))
            }
            "or" => {
                let pairs = self.group(|p| match p.word()?.as_str() {
                    "eq" => p.eq_body(),
                    other => Err(malformed(format!("expected eq inside or(), found {other:?}"))),
                })?;
                let mut pairs = pairs.into_iter();
                let (field, first) = pairs
                    .next()
                    .ok_or_else(|| malformed("empty or() group"))?;
                let mut values = BTreeSet::from([first]);
                for (other, value) in pairs {
                    if other != field {
                        return Err(malformed(format!(
                            "or() mixes fields {field:?} and {other:?}"
                        )));
                    }
                    if !values.insert(value) {
                        return Err(malformed(format!("or() repeats a value of {field:?}")));
                    }
                }
                if values.len() < 2 {
                    return Err(malformed("or() needs at least two values"));
                }
                Ok((field, values))
            }
            other => Err(malformed(format!("unknown operator {other:?}"))),
        }
    }

    /// A single clause, or `and(...)` of clauses over distinct fields.
    fn filter(&mut self) -> Result<FilterSpec, Error> {
        let mut spec = FilterSpec::new();
        let head = self.word()?;
        if head == "and" {
            let clauses = self.group(|p| {
                let head = p.word()?;
                p.clause(&head)
            })?;
            if clauses.len() < 2 {
                return Err(malformed("and() needs at least two fields"));
            }
            for (field, values) in clauses {
                if spec.fields.contains_key(&field) {
                    return Err(malformed(format!("and() repeats field {field:?}")));
                }
                spec.fields.insert(field, values);
            }
        } else {
            let (field, values) = self.clause(&head)?;
            spec.fields.insert(field, values);
        }
        Ok(spec)
    }
}

fn malformed(detail: impl Display) -> Error {
    Error::invalid_option(format!("malformed filter: {detail}"))
}

/// Parse a `filter` fragment back into its field → value-set mapping.
///
/// Only fragments `encode_filter` can produce are accepted.
pub fn decode_filter(fragment: &str) -> Result<FilterSpec, Error> {
    if fragment.is_empty() {
        return Ok(FilterSpec::new());
    }
    let mut parser = Parser {
        chars: fragment.chars().peekable(),
    };
    let spec = parser.filter()?;
    match parser.chars.next() {
        None => Ok(spec),
        Some(c) => Err(malformed(format!("trailing {c:?}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn device_filter() -> FilterSpec {
        FilterSpec::new()
            .eq("mediaType", "SSD")
            .any_of("name", ["/dev/sdd", "/dev/sde"])
    }

    #[test]
    fn single_field_single_value() {
        let spec = FilterSpec::new().eq("name", "vol-1");
        assert_eq!(encode_filter(&spec).unwrap().as_deref(), Some("eq,name,vol-1"));
    }

    #[test]
    fn or_within_and_across() {
        let encoded = encode_filter(&device_filter()).unwrap().unwrap();
        insta::assert_snapshot!(
            encoded,
            @"and(eq,mediaType,SSD,or(eq,name,/dev/sdd,eq,name,/dev/sde))"
        );
    }

    #[test]
    fn insertion_order_does_not_leak() {
        let a = FilterSpec::new()
            .any_of("name", ["/dev/sde", "/dev/sdd"])
            .eq("mediaType", "SSD");
        assert_eq!(
            encode_filter(&a).unwrap(),
            encode_filter(&device_filter()).unwrap()
        );
    }

    #[test]
    fn reserved_characters_are_escaped_and_decoded() {
        let spec = FilterSpec::new()
            .any_of("name", ["a,b", "f(x)", r"back\slash", ""])
            .eq("sizeInKb", 8_388_608)
            .eq("isObfuscated", false);
        let encoded = encode_filter(&spec).unwrap().unwrap();
        assert!(encoded.contains(r"eq,name,a\,b"));
        assert!(encoded.contains(r"eq,name,f\(x\)"));
        assert!(encoded.contains(r"eq,name,back\\slash"));
        assert!(encoded.contains("eq,sizeInKb,8388608"));
        assert!(encoded.contains("eq,isObfuscated,false"));
        assert_eq!(decode_filter(&encoded).unwrap(), spec);
    }

    #[test]
    fn decoding_reconstructs_many_fields() {
        let spec = FilterSpec::new()
            .eq("protectionDomainId", "pd-1")
            .any_of("mediaType", ["HDD", "SSD"])
            .any_of("id", ["a", "b", "c"])
            .eq("name", "sp)1");
        let encoded = encode_filter(&spec).unwrap().unwrap();
        let decoded = decode_filter(&encoded).unwrap();
        assert_eq!(decoded, spec);
        assert_eq!(decoded.values("id").map(BTreeSet::len), Some(3));
    }

    #[test]
    fn empty_filter_is_omitted() {
        assert_eq!(encode_filter(&FilterSpec::new()).unwrap(), None);
        assert_eq!(decode_filter("").unwrap(), FilterSpec::new());
    }

    #[test]
    fn invalid_input_is_rejected() {
        let bad_field = FilterSpec::new().eq("name,id", "x");
        assert!(matches!(
            encode_filter(&bad_field),
            Err(Error::InvalidOption { .. })
        ));

        let control = FilterSpec::new().eq("name", "line\nbreak");
        assert!(matches!(
            encode_filter(&control),
            Err(Error::InvalidOption { .. })
        ));

        let no_values = FilterSpec::new().any_of("name", Vec::<String>::new());
        assert!(matches!(
            encode_filter(&no_values),
            Err(Error::InvalidOption { .. })
        ));
    }

    #[test]
    fn malformed_fragments_do_not_decode() {
        for fragment in ["eq,name", "ne,name,x", "and(eq,name,x", "eq,name,x)", r"eq,name,x\"] {
            assert!(decode_filter(fragment).is_err(), "{fragment} decoded");
        }
    }

    #[test]
    fn decoder_only_accepts_encoder_output() {
        for fragment in [
            "or(eq,a,1,eq,b,2)",
            "or(eq,a,1)",
            "or(eq,a,1,eq,a,1)",
            "and(eq,a,1)",
            "and(eq,a,1,eq,a,2)",
            "and(eq,a,1,and(eq,b,2,eq,c,3))",
            "or(eq,a,1,or(eq,a,2,eq,a,3))",
            "or(and(eq,a,1,eq,b,2),eq,a,3)",
        ] {
            assert!(
                matches!(decode_filter(fragment), Err(Error::InvalidOption { .. })),
                "{fragment} decoded"
            );
        }
        assert_eq!(
            decode_filter("and(eq,a,1,or(eq,b,2,eq,b,3))").unwrap(),
            FilterSpec::new().eq("a", 1).any_of("b", [2, 3])
        );
    }

    #[test]
    fn fields_keep_order() {
        let projection = FieldProjection::new(["name", "id", "mediaType"]);
        assert_eq!(
            encode_fields(&projection).unwrap().as_deref(),
            Some("name,id,mediaType")
        );
        assert_eq!(
            encode_fields(&projection).unwrap(),
            encode_fields(&projection.clone()).unwrap()
        );
        assert_eq!(encode_fields(&FieldProjection::all()).unwrap(), None);
    }

    #[test]
    fn bad_projection_is_rejected() {
        let projection: FieldProjection = ["id", "a,b"].into_iter().collect();
        assert!(matches!(
            encode_fields(&projection),
            Err(Error::InvalidOption { .. })
        ));
    }
}
