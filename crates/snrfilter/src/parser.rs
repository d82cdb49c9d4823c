//! Query token parser using nom
//!
//! Token grammar:
//! ```text
//! token    := field '=' value            (search target)
//!           | field '=' value '..' value (filter range)
//!           | ("tol" | "tolerance") '=' float
//!           | "mode" '=' ("exact" | "fuzzy")
//! field    := "pre" | "main" | "post" | "snr"      (any case)
//! value    := ["-"] digits | ["-"] "0x" hex   for pre/main/post
//!           | float ["e" exponent]          for snr
//! ```
//!
//! Nothing here returns an error to the caller: malformed input simply yields
//! `None`, meaning no constraint could be extracted.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{alpha1, char, digit0, digit1, hex_digit0, hex_digit1, one_of, space0},
    combinator::{all_consuming, map, map_opt, map_res, opt, recognize},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

use crate::criteria::{Field, FilterCriteria, Range, SearchMode, SearchParams};

/// A fully parsed field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// pre/main/post value
    Int(i32),
    /// SNR value
    Float(f64),
}

/// Base an integer literal was typed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radix {
    /// Plain decimal
    Decimal,
    /// `0x`-prefixed hexadecimal
    Hex,
}

/// A `field=<partial literal>` token as typed so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialToken {
    /// Field being typed
    pub field: Field,
    /// Literal typed so far, lowercased, possibly empty
    pub prefix: String,
    /// Base of the literal
    pub radix: Radix,
}

fn field(input: &str) -> IResult<&str, Field> {
    map_opt(alpha1, Field::from_name)(input)
}

fn equals(input: &str) -> IResult<&str, char> {
    delimited(space0, char('='), space0)(input)
}

fn hex_int(input: &str) -> IResult<&str, i64> {
    map_res(
        pair(opt(char('-')), preceded(tag_no_case("0x"), hex_digit1)),
        |(sign, digits): (Option<char>, &str)| {
            i64::from_str_radix(digits, 16).map(|v| if sign.is_some() { -v } else { v })
        },
    )(input)
}

fn dec_int(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse::<i64>)(input)
}

fn int_value(input: &str) -> IResult<&str, i32> {
    map_res(alt((hex_int, dec_int)), i32::try_from)(input)
}

fn float_value(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((
            opt(alt((char('-'), char('+')))),
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit1)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        str::parse::<f64>,
    )(input)
}

fn value_for(field: Field, input: &str) -> IResult<&str, FieldValue> {
    if field.is_integer() {
        map(int_value, FieldValue::Int)(input)
    } else {
        map(float_value, FieldValue::Float)(input)
    }
}

fn assignment(input: &str) -> IResult<&str, (Field, FieldValue)> {
    let (rest, field) = terminated(preceded(space0, field), equals)(input)?;
    let (rest, value) = terminated(|i| value_for(field, i), space0)(rest)?;
    Ok((rest, (field, value)))
}

fn range_assignment(input: &str) -> IResult<&str, (Field, FieldValue, FieldValue)> {
    let (rest, field) = terminated(preceded(space0, field), equals)(input)?;
    let value = |i| value_for(field, i);
    let (rest, (min, max)) = terminated(separated_pair(value, tag(".."), value), space0)(rest)?;
    Ok((rest, (field, min, max)))
}

fn tolerance(input: &str) -> IResult<&str, f64> {
    preceded(
        pair(alt((tag_no_case("tolerance"), tag_no_case("tol"))), equals),
        float_value,
    )(input)
}

fn mode(input: &str) -> IResult<&str, SearchMode> {
    preceded(
        pair(tag_no_case("mode"), equals),
        alt((
            map(tag_no_case("exact"), |_| SearchMode::Exact),
            map(tag_no_case("fuzzy"), |_| SearchMode::Fuzzy),
        )),
    )(input)
}

fn partial_int(input: &str) -> IResult<&str, (&str, Radix)> {
    alt((
        map(
            recognize(tuple((opt(char('-')), tag_no_case("0x"), hex_digit0))),
            |s| (s, Radix::Hex),
        ),
        map(recognize(pair(opt(char('-')), digit0)), |s| (s, Radix::Decimal)),
    ))(input)
}

fn partial_float(input: &str) -> IResult<&str, (&str, Radix)> {
    map(
        recognize(tuple((
            opt(char('-')),
            digit0,
            opt(pair(char('.'), digit0)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit0))),
        ))),
        |s| (s, Radix::Decimal),
    )(input)
}

/// Parse a decimal or `0x` hex integer, optionally negative
///
/// Surrounding whitespace is ignored. Values outside `i32` yield `None`.
pub fn parse_int(input: &str) -> Option<i32> {
    all_consuming(int_value)(input.trim()).ok().map(|(_, v)| v)
}

/// Parse a complete `field=value` token
///
/// Integers accept decimal or `0x` hex; SNR accepts decimal floats with an
/// optional exponent.
pub fn parse_assignment(input: &str) -> Option<(Field, FieldValue)> {
    all_consuming(assignment)(input).ok().map(|(_, parsed)| parsed)
}

/// Parse a `field=<partial literal>` token while it is still being typed
///
/// Returns `None` when the field is unknown, `=` is missing, or the literal
/// can no longer become a valid value for the field.
pub fn parse_partial(input: &str) -> Option<PartialToken> {
    let (rest, field) = terminated(preceded(space0, field), equals)(input).ok()?;
    let rest = rest.trim_end();
    let literal = if field.is_integer() {
        all_consuming(partial_int)(rest)
    } else {
        all_consuming(partial_float)(rest)
    };
    let (_, (prefix, radix)) = literal.ok()?;
    Some(PartialToken {
        field,
        prefix: prefix.to_ascii_lowercase(),
        radix,
    })
}

/// Build search parameters from whitespace-separated tokens
///
/// Recognizes `field=value`, `tol=<float>` and `mode=exact|fuzzy`. Tokens
/// override the matching fields of `base`. Any malformed token makes the
/// whole query unparseable.
pub fn parse_query(input: &str, base: SearchParams) -> Option<SearchParams> {
    let mut params = base;
    for token in input.split_whitespace() {
        if let Ok((_, tol)) = all_consuming(tolerance)(token) {
            params.tolerance = tol;
        } else if let Ok((_, m)) = all_consuming(mode)(token) {
            params.mode = m;
        } else {
            match parse_assignment(token)? {
                (Field::Pre, FieldValue::Int(v)) => params.pre_value = Some(v),
                (Field::Main, FieldValue::Int(v)) => params.main_value = Some(v),
                (Field::Post, FieldValue::Int(v)) => params.post_value = Some(v),
                (Field::Snr, FieldValue::Float(v)) => params.snr_value = Some(v),
                _ => return None,
            }
        }
    }
    Some(params)
}

/// Build filter criteria from whitespace-separated `field=min..max` tokens
///
/// A single value `field=v` is shorthand for `field=v..v`. Bounds are not
/// validated here; `min > max` is reported when the filter is applied.
pub fn parse_filter(input: &str) -> Option<FilterCriteria> {
    let mut criteria = FilterCriteria::new();
    for token in input.split_whitespace() {
        let (field, min, max) = match all_consuming(range_assignment)(token) {
            Ok((_, parsed)) => parsed,
            Err(_) => {
                let (field, value) = parse_assignment(token)?;
                (field, value, value)
            }
        };
        match (field, min, max) {
            (Field::Pre, FieldValue::Int(a), FieldValue::Int(b)) => {
                criteria.pre_range = Some(Range::new(a, b))
            }
            (Field::Main, FieldValue::Int(a), FieldValue::Int(b)) => {
                criteria.main_range = Some(Range::new(a, b))
            }
            (Field::Post, FieldValue::Int(a), FieldValue::Int(b)) => {
                criteria.post_range = Some(Range::new(a, b))
            }
            (Field::Snr, FieldValue::Float(a), FieldValue::Float(b)) => {
                criteria.snr_range = Some(Range::new(a, b))
            }
            _ => return None,
        }
    }
    Some(criteria)
}
