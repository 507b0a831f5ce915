//! Exact decimal comparison and arithmetic over the textual `N` representation
//! (spec §4.3: "Numbers compare by decimal value, parsed losslessly, not via
//! f64, to avoid precision loss on large integers").
//!
//! A decimal is split into a sign and two digit strings (integer part,
//! fractional part) rather than parsed into any binary float, so a balance
//! like `"10000000000000001"` never gets rounded onto its neighbor the way it
//! would going through `f64`. Comparison and addition/subtraction are done
//! digit by digit, the same way you'd do it by hand.

use std::cmp::Ordering;

/// A parsed decimal: `sign` is `true` for negative, `int_digits` and
/// `frac_digits` hold one digit (`0`-`9`) per byte, most significant first,
/// with no leading zero in `int_digits` beyond a single `"0"` and no
/// trailing zero in `frac_digits`.
struct Decimal {
    negative: bool,
    int_digits: Vec<u8>,
    frac_digits: Vec<u8>,
}

fn digit(c: u8) -> Option<u8> {
    if c.is_ascii_digit() { Some(c - b'0') } else { None }
}

/// Parses decimal text such as `"42"`, `"-3.14"`, `"0.50"`. Rejects anything
/// with an exponent or other non-digit content; `N` values are never written
/// with scientific notation by this crate, so a parse failure here means the
/// text did not originate from `format`.
fn parse(text: &str) -> Option<Decimal> {
    let bytes = text.as_bytes();
    let (negative, rest) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        _ => (false, bytes),
    };
    if rest.is_empty() {
        return None;
    }
    let dot = rest.iter().position(|&b| b == b'.');
    let (int_part, frac_part) = match dot {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, &rest[..0]),
    };
    if int_part.is_empty() || (dot.is_some() && frac_part.is_empty()) {
        return None;
    }
    let mut int_digits = int_part.iter().map(|&b| digit(b)).collect::<Option<Vec<u8>>>()?;
    let mut frac_digits = frac_part.iter().map(|&b| digit(b)).collect::<Option<Vec<u8>>>()?;

    let first_nonzero = int_digits.iter().position(|&d| d != 0).unwrap_or(int_digits.len());
    int_digits.drain(..first_nonzero);
    if int_digits.is_empty() {
        int_digits.push(0);
    }
    while frac_digits.last() == Some(&0) {
        frac_digits.pop();
    }

    let is_zero = int_digits == [0] && frac_digits.is_empty();
    Some(Decimal { negative: negative && !is_zero, int_digits, frac_digits })
}

/// Compares magnitude only (ignores sign), aligning fractional length first.
fn compare_magnitude(a: &Decimal, b: &Decimal) -> Ordering {
    match a.int_digits.len().cmp(&b.int_digits.len()) {
        Ordering::Equal => {}
        other => return other,
    }
    match a.int_digits.cmp(&b.int_digits) {
        Ordering::Equal => {}
        other => return other,
    }
    let len = a.frac_digits.len().max(b.frac_digits.len());
    for i in 0..len {
        let da = a.frac_digits.get(i).copied().unwrap_or(0);
        let db = b.frac_digits.get(i).copied().unwrap_or(0);
        match da.cmp(&db) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Exact three-way comparison of two decimal-text numbers. Returns `None` if
/// either side fails to parse as a plain decimal.
#[must_use]
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    let a = parse(a)?;
    let b = parse(b)?;
    match (a.negative, b.negative) {
        (false, false) => Some(compare_magnitude(&a, &b)),
        (true, true) => Some(compare_magnitude(&a, &b).reverse()),
        (false, true) => Some(Ordering::Greater),
        (true, false) => Some(Ordering::Less),
    }
}

/// Adds two digit strings of equal length, most significant digit first,
/// returning `(carry_out, sum_digits)`.
fn add_digits(a: &[u8], b: &[u8]) -> (u8, Vec<u8>) {
    let mut carry = 0u8;
    let mut out = vec![0u8; a.len()];
    for i in (0..a.len()).rev() {
        let total = a[i] + b[i] + carry;
        out[i] = total % 10;
        carry = total / 10;
    }
    (carry, out)
}

/// Subtracts `b` from `a` (equal length, `a >= b` required), most significant
/// digit first.
fn sub_digits(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut borrow = 0i8;
    let mut out = vec![0u8; a.len()];
    for i in (0..a.len()).rev() {
        let mut d = a[i] as i8 - b[i] as i8 - borrow;
        if d < 0 {
            d += 10;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = d as u8;
    }
    out
}

fn pad_left(digits: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len - digits.len()];
    out.extend_from_slice(digits);
    out
}

fn pad_right(digits: &[u8], len: usize) -> Vec<u8> {
    let mut out = digits.to_vec();
    out.resize(len, 0);
    out
}

/// Aligns `a` and `b` onto a common fractional width and a common integer
/// width, returning the flattened (integer ++ fraction) digit arrays and the
/// fractional width so the result can be split back apart after arithmetic.
fn align(a: &Decimal, b: &Decimal) -> (Vec<u8>, Vec<u8>, usize) {
    let frac_len = a.frac_digits.len().max(b.frac_digits.len());
    let int_len = a.int_digits.len().max(b.int_digits.len());
    let mut a_flat = pad_left(&a.int_digits, int_len);
    a_flat.extend(pad_right(&a.frac_digits, frac_len));
    let mut b_flat = pad_left(&b.int_digits, int_len);
    b_flat.extend(pad_right(&b.frac_digits, frac_len));
    (a_flat, b_flat, frac_len)
}

fn split_and_format(mut digits: Vec<u8>, frac_len: usize, negative: bool) -> String {
    let frac_digits = digits.split_off(digits.len() - frac_len);
    let mut int_digits = digits;
    let first_nonzero = int_digits.iter().position(|&d| d != 0).unwrap_or(int_digits.len());
    int_digits.drain(..first_nonzero);
    if int_digits.is_empty() {
        int_digits.push(0);
    }
    let mut frac_digits = frac_digits;
    while frac_digits.last() == Some(&0) {
        frac_digits.pop();
    }
    let is_zero = int_digits == [0] && frac_digits.is_empty();

    let mut out = String::new();
    if negative && !is_zero {
        out.push('-');
    }
    for d in &int_digits {
        out.push((b'0' + d) as char);
    }
    if !frac_digits.is_empty() {
        out.push('.');
        for d in &frac_digits {
            out.push((b'0' + d) as char);
        }
    }
    out
}

/// `a + b`, exact, formatted back to canonical decimal text with no leading
/// zeros, no trailing fractional zeros, and never scientific notation.
#[must_use]
pub fn add(a: &str, b: &str) -> Option<String> {
    let da = parse(a)?;
    let db = parse(b)?;
    let (a_flat, b_flat, frac_len) = align(&da, &db);
    Some(match (da.negative, db.negative) {
        (false, false) => {
            let (carry, mut sum) = add_digits(&a_flat, &b_flat);
            if carry > 0 {
                sum.insert(0, carry);
            }
            split_and_format(sum, frac_len, false)
        }
        (true, true) => {
            let (carry, mut sum) = add_digits(&a_flat, &b_flat);
            if carry > 0 {
                sum.insert(0, carry);
            }
            split_and_format(sum, frac_len, true)
        }
        (false, true) => sub_signed(&a_flat, &b_flat, frac_len),
        (true, false) => sub_signed(&b_flat, &a_flat, frac_len),
    })
}

/// `a - b`, exact, via `a + (-b)`.
#[must_use]
pub fn sub(a: &str, b: &str) -> Option<String> {
    let negated_b = match b.strip_prefix('-') {
        Some(rest) => rest.to_string(),
        None if b.starts_with(|c: char| c.is_ascii_digit()) => format!("-{b}"),
        None => b.to_string(),
    };
    add(a, &negated_b)
}

/// `minuend - subtrahend` for two non-negative, equal-length flat digit
/// arrays, producing a signed result (used once both operands' true signs
/// have been resolved to an effective subtraction of magnitudes).
fn sub_signed(minuend_flat: &[u8], subtrahend_flat: &[u8], frac_len: usize) -> String {
    if minuend_flat >= subtrahend_flat {
        split_and_format(sub_digits(minuend_flat, subtrahend_flat), frac_len, false)
    } else {
        split_and_format(sub_digits(subtrahend_flat, minuend_flat), frac_len, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_integers_that_collapse_under_f64_compare_distinct() {
        assert_eq!(compare("10000000000000001", "10000000000000002"), Some(Ordering::Less));
        assert_ne!(compare("10000000000000001", "10000000000000002"), Some(Ordering::Equal));
    }

    #[test]
    fn compare_handles_sign_and_fraction() {
        assert_eq!(compare("-1.5", "1.5"), Some(Ordering::Less));
        assert_eq!(compare("2.50", "2.5"), Some(Ordering::Equal));
        assert_eq!(compare("-2.50", "-2.5"), Some(Ordering::Equal));
        assert_eq!(compare("0", "-0"), Some(Ordering::Equal));
    }

    #[test]
    fn add_preserves_precision_past_f64_mantissa() {
        assert_eq!(add("9007199254740993", "1").as_deref(), Some("9007199254740994"));
    }

    #[test]
    fn add_never_emits_scientific_notation() {
        assert_eq!(add("5000000000000000", "5000000000000000").as_deref(), Some("10000000000000000"));
    }

    #[test]
    fn sub_handles_borrow_and_sign_flip() {
        assert_eq!(sub("3", "10").as_deref(), Some("-7"));
        assert_eq!(sub("1.5", "0.75").as_deref(), Some("0.75"));
        assert_eq!(sub("-1.5", "-1.5").as_deref(), Some("0"));
    }

    #[test]
    fn add_with_mixed_signs_matches_subtraction() {
        assert_eq!(add("-5", "8").as_deref(), Some("3"));
        assert_eq!(add("5", "-8").as_deref(), Some("-3"));
    }
}
