//! Tag resolution: turning scalar text and explicit tags into values.
//!
//! Plain scalars without a tag are typed by an ordered table of
//! (predicate, constructor) rules: null, bool, integer, float, date. The
//! first rule whose predicate accepts the text builds the value; text no
//! rule accepts is a string. Quoted and block scalars are always strings.

use std::borrow::Cow;

use base64::prelude::*;
use chrono::NaiveDate;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::error::{ParseContext, Result, TagError};
use crate::lexer::ScalarStyle;
use crate::scanner::Mark;
use crate::value::{Tag, TaggedValue, Value};

type Predicate = fn(&str) -> bool;
type Constructor = fn(&str) -> Option<Value>;

/// Implicit typing rules, in priority order.
const IMPLICIT_RULES: &[(Predicate, Constructor)] = &[
    (is_null, construct_null),
    (is_bool, construct_bool),
    (is_integer, construct_integer),
    (is_float, construct_float),
    (is_date, construct_date),
];

/// Type a plain, untagged scalar.
pub fn resolve_plain(text: &str) -> Value {
    IMPLICIT_RULES
        .iter()
        .find(|(accepts, _)| accepts(text))
        .and_then(|(_, construct)| construct(text))
        .unwrap_or_else(|| Value::String(text.to_string()))
}

/// Resolve a scalar from its text, style, and optional explicit tag.
pub fn resolve_scalar(
    text: &str,
    style: ScalarStyle,
    tag: Option<&Tag>,
    ctx: &ParseContext,
    mark: Mark,
) -> Result<Value> {
    let Some(tag) = tag else {
        return Ok(match style {
            ScalarStyle::Plain => resolve_plain(text),
            _ => Value::String(text.to_string()),
        });
    };

    match core_name(tag).as_deref() {
        // The non-specific tag `!` forces a string.
        Some("") | Some("str") => Ok(Value::String(text.to_string())),
        Some("binary") => {
            let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            if let Err(e) = BASE64_STANDARD.decode(clean.as_bytes()) {
                return Err(TagError::InvalidBase64 {
                    tag: tag.to_string(),
                    reason: e.to_string(),
                    location: ctx.location(mark),
                }
                .into());
            }
            Ok(tagged(tag, Value::String(text.to_string())))
        }
        Some("timestamp") => construct_date(text).ok_or_else(|| {
            TagError::InvalidTimestamp {
                text: text.to_string(),
                location: ctx.location(mark),
            }
            .into()
        }),
        Some("null") => convert(tag, text, is_null, construct_null, ctx, mark),
        Some("bool") => convert(tag, text, is_bool, construct_bool, ctx, mark),
        Some("int") => convert(tag, text, is_integer, construct_integer, ctx, mark),
        Some("float") => {
            if is_integer(text) {
                convert(tag, text, is_integer, integer_as_float, ctx, mark)
            } else {
                convert(tag, text, is_float, construct_float, ctx, mark)
            }
        }
        Some("seq" | "map") => Err(TagError::WrongKind {
            tag: tag.to_string(),
            kind: "scalar",
            location: ctx.location(mark),
        }
        .into()),
        _ => Ok(tagged(tag, Value::String(text.to_string()))),
    }
}

/// Apply an explicit tag to a parsed sequence or mapping.
pub fn resolve_collection(
    tag: Option<&Tag>,
    value: Value,
    ctx: &ParseContext,
    mark: Mark,
) -> Result<Value> {
    let Some(tag) = tag else {
        return Ok(value);
    };
    let fits = match core_name(tag).as_deref() {
        Some("") => true,
        Some("seq") => matches!(value, Value::Sequence(_)),
        Some("map") => matches!(value, Value::Mapping(_)),
        Some("str" | "binary" | "timestamp" | "null" | "bool" | "int" | "float") => false,
        _ => return Ok(tagged(tag, value)),
    };
    if fits {
        Ok(value)
    } else {
        Err(TagError::WrongKind {
            tag: tag.to_string(),
            kind: value.kind(),
            location: ctx.location(mark),
        }
        .into())
    }
}

/// Name of a tag the resolver specializes, or `None` for application tags.
///
/// `!!x`, `!<tag:yaml.org,2002:x>` and the local `!binary`/`!timestamp`
/// forms all reduce to `x`.
fn core_name(tag: &Tag) -> Option<Cow<'_, str>> {
    let name = tag.as_str();
    if name.is_empty() {
        return Some(Cow::Borrowed(""));
    }
    if let Some(rest) = name.strip_prefix('!') {
        return Some(Cow::Borrowed(rest));
    }
    if let Some(rest) = name
        .strip_prefix("<tag:yaml.org,2002:")
        .and_then(|s| s.strip_suffix('>'))
    {
        return Some(Cow::Owned(rest.to_string()));
    }
    match name {
        "binary" | "timestamp" => Some(Cow::Borrowed(name)),
        _ => None,
    }
}

fn tagged(tag: &Tag, value: Value) -> Value {
    Value::Tagged(Box::new(TaggedValue {
        tag: tag.clone(),
        value,
    }))
}

fn convert(
    tag: &Tag,
    text: &str,
    accepts: Predicate,
    construct: Constructor,
    ctx: &ParseContext,
    mark: Mark,
) -> Result<Value> {
    if accepts(text) {
        if let Some(value) = construct(text) {
            return Ok(value);
        }
    }
    Err(TagError::InvalidValue {
        tag: tag.to_string(),
        text: text.to_string(),
        location: ctx.location(mark),
    }
    .into())
}

fn is_null(s: &str) -> bool {
    matches!(s, "" | "~" | "null" | "Null" | "NULL")
}

fn construct_null(_: &str) -> Option<Value> {
    Some(Value::Null)
}

fn is_bool(s: &str) -> bool {
    matches!(s, "true" | "True" | "TRUE" | "false" | "False" | "FALSE")
}

fn construct_bool(s: &str) -> Option<Value> {
    Some(Value::Bool(matches!(s, "true" | "True" | "TRUE")))
}

fn is_integer(s: &str) -> bool {
    if let Some(hex) = s.strip_prefix("0x") {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    if let Some(oct) = s.strip_prefix("0o") {
        return !oct.is_empty() && oct.chars().all(|c| ('0'..='7').contains(&c));
    }
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn construct_integer(s: &str) -> Option<Value> {
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(oct) = s.strip_prefix("0o") {
        (oct, 8)
    } else {
        (s.strip_prefix('+').unwrap_or(s), 10)
    };
    BigInt::parse_bytes(digits.as_bytes(), radix).map(Value::Integer)
}

fn integer_as_float(s: &str) -> Option<Value> {
    let n = construct_integer(s)?;
    n.as_integer()?.to_f64().map(Value::Float)
}

fn is_float(s: &str) -> bool {
    if is_special_float(s).is_some() {
        return true;
    }
    let s = s.strip_prefix(['-', '+']).unwrap_or(s);

    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(e_pos) => (&s[..e_pos], Some(&s[e_pos + 1..])),
        None => (s, None),
    };

    if let Some(exp) = exponent {
        let exp = exp.strip_prefix(['-', '+']).unwrap_or(exp);
        if exp.is_empty() || !exp.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }

    let (before, after) = match mantissa.split_once('.') {
        Some(parts) => parts,
        // An exponent makes a float even without a decimal point (1e10).
        None if exponent.is_some() => (mantissa, ""),
        None => return false,
    };
    (!before.is_empty() || !after.is_empty())
        && before.chars().all(|c| c.is_ascii_digit())
        && after.chars().all(|c| c.is_ascii_digit())
}

fn is_special_float(s: &str) -> Option<f64> {
    match s {
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => Some(f64::INFINITY),
        "-.inf" | "-.Inf" | "-.INF" => Some(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => Some(f64::NAN),
        _ => None,
    }
}

fn construct_float(s: &str) -> Option<Value> {
    if let Some(f) = is_special_float(s) {
        return Some(Value::Float(f));
    }
    s.parse::<f64>().ok().map(Value::Float)
}

/// `YYYY-MM-DD`, digits only, fixed width.
fn is_date(s: &str) -> bool {
    construct_date(s).is_some()
}

fn construct_date(s: &str) -> Option<Value> {
    let b = s.as_bytes();
    let shape = b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit());
    if !shape {
        return None;
    }
    let year = s[0..4].parse().ok()?;
    let month = s[5..7].parse().ok()?;
    let day = s[8..10].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(Value::Date)
}
