//! Weighted average aggregation.
//!
//! # Responsibility
//! - Turn `(value, weight)` pairs into one rounded average.
//! - Keep "no data" distinguishable from "exactly zero".
//!
//! # Invariants
//! - Pure and stateless: no I/O, no shared state.
//! - Rounding happens once, here, with round-half-to-even on two decimals.
//! - Inclusion filtering and weight validation belong to callers.

use serde::{Deserialize, Serialize};

/// Number of decimal digits kept on every average.
pub const AVERAGE_DECIMALS: usize = 2;

/// Rounded aggregate of a set of graded children.
///
/// An empty input yields `value == 0.0` with `defined == false`. Both render
/// as zero, but alerting logic can tell "no grades yet" from "failing".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Average {
    value: f64,
    defined: bool,
}

impl Average {
    /// Result for an empty (or fully excluded) input.
    pub const UNDEFINED: Self = Self {
        value: 0.0,
        defined: false,
    };

    /// Rebuilds an average from its persisted parts.
    ///
    /// Used by read paths only; the value is trusted to be already rounded.
    pub(crate) fn from_stored(value: f64, defined: bool) -> Self {
        if defined {
            Self {
                value,
                defined: true,
            }
        } else {
            Self::UNDEFINED
        }
    }

    /// Rounded average value. `0.0` when undefined.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Whether at least one input contributed.
    pub fn is_defined(&self) -> bool {
        self.defined
    }

    /// Whether no input contributed.
    pub fn is_undefined(&self) -> bool {
        !self.defined
    }

    /// Whether the average renders as zero, either because it is exactly
    /// zero or because nothing contributed.
    pub fn is_zero_or_undefined(&self) -> bool {
        !self.defined || self.value == 0.0
    }
}

impl Default for Average {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

/// Computes `Σ(value·weight) / Σweight`, rounded half-to-even on two decimals.
///
/// Pairs must already be filtered to the contributing records. A zero total
/// weight yields [`Average::UNDEFINED`], and so does a quotient that is not
/// finite because the sums overflowed.
pub fn weighted_average<I>(pairs: I) -> Average
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (weighted_sum, weight_sum) = pairs
        .into_iter()
        .fold((0.0_f64, 0.0_f64), |(sum, weights), (value, weight)| {
            (sum + value * weight, weights + weight)
        });

    if weight_sum == 0.0 {
        return Average::UNDEFINED;
    }
    let quotient = weighted_sum / weight_sum;
    if !quotient.is_finite() {
        return Average::UNDEFINED;
    }

    Average {
        value: round_half_even(quotient, AVERAGE_DECIMALS),
        defined: true,
    }
}

/// Computes the plain mean of `values`, each counting with weight 1.
pub fn unweighted_average<I>(values: I) -> Average
where
    I: IntoIterator<Item = f64>,
{
    weighted_average(values.into_iter().map(|value| (value, 1.0)))
}

/// Rounds `value` to `decimals` digits with ties going to the even digit.
///
/// Operates on the shortest decimal representation of `value`, so `2.675`
/// (stored as `2.67499999…`) is treated as the tie it reads as.
pub fn round_half_even(value: f64, decimals: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let repr = value.abs().to_string();
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    if frac_part.len() <= decimals {
        return value;
    }

    let frac_bytes = frac_part.as_bytes();
    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_bytes[..decimals].iter().copied())
        .map(|byte| byte - b'0')
        .collect();

    let dropped = frac_bytes[decimals] - b'0';
    let tail_nonzero = frac_bytes[decimals + 1..].iter().any(|byte| *byte != b'0');
    let last_is_odd = digits.last().is_some_and(|digit| digit % 2 == 1);
    let round_up = dropped > 5 || (dropped == 5 && (tail_nonzero || last_is_odd));
    if round_up {
        increment_digits(&mut digits);
    }

    let split = digits.len() - decimals;
    let mut text = String::with_capacity(digits.len() + 1);
    text.extend(digits[..split].iter().map(|digit| char::from(b'0' + digit)));
    if decimals > 0 {
        text.push('.');
        text.extend(digits[split..].iter().map(|digit| char::from(b'0' + digit)));
    }

    let magnitude = text.parse::<f64>().unwrap_or(value.abs());
    if magnitude == 0.0 {
        0.0
    } else {
        magnitude.copysign(value)
    }
}

fn increment_digits(digits: &mut Vec<u8>) {
    for digit in digits.iter_mut().rev() {
        if *digit == 9 {
            *digit = 0;
        } else {
            *digit += 1;
            return;
        }
    }
    digits.insert(0, 1);
}

#[cfg(test)]
mod tests {
    use super::{round_half_even, unweighted_average, weighted_average, Average};

    #[test]
    fn weighted_average_matches_module_scenario() {
        let average = weighted_average([(5.0, 1.0), (3.0, 2.0)]);
        assert!(average.is_defined());
        assert_eq!(average.value(), 3.67);
    }

    #[test]
    fn empty_input_is_zero_and_flagged() {
        let average = weighted_average(std::iter::empty());
        assert_eq!(average, Average::UNDEFINED);
        assert_eq!(average.value(), 0.0);
        assert!(average.is_zero_or_undefined());
        assert!(average.is_undefined());
    }

    #[test]
    fn overflowing_sums_yield_undefined_instead_of_nan() {
        let average = weighted_average([(1e308, 1e308), (1e308, 1e308)]);
        assert_eq!(average, Average::UNDEFINED);
        assert!(!average.value().is_nan());
    }

    #[test]
    fn exact_zero_is_defined_but_renders_as_zero() {
        let average = unweighted_average([0.0, 0.0]);
        assert!(average.is_defined());
        assert!(average.is_zero_or_undefined());
    }

    #[test]
    fn ties_round_to_even_digit() {
        assert_eq!(round_half_even(2.675, 2), 2.68);
        assert_eq!(round_half_even(2.665, 2), 2.66);
        assert_eq!(round_half_even(0.125, 2), 0.12);
        assert_eq!(round_half_even(0.135, 2), 0.14);
        assert_eq!(round_half_even(4.5, 0), 4.0);
        assert_eq!(round_half_even(5.5, 0), 6.0);
    }

    #[test]
    fn non_ties_round_to_nearest() {
        assert_eq!(round_half_even(3.6666666666666665, 2), 3.67);
        assert_eq!(round_half_even(4.1251, 2), 4.13);
        assert_eq!(round_half_even(4.124, 2), 4.12);
    }

    #[test]
    fn carry_propagates_into_integer_part() {
        assert_eq!(round_half_even(9.999, 2), 10.0);
        assert_eq!(round_half_even(0.996, 2), 1.0);
    }

    #[test]
    fn sign_is_preserved_and_negative_zero_collapses() {
        assert_eq!(round_half_even(-2.675, 2), -2.68);
        let collapsed = round_half_even(-0.001, 2);
        assert_eq!(collapsed, 0.0);
        assert!(collapsed.is_sign_positive());
    }

    #[test]
    fn short_values_are_returned_unchanged() {
        assert_eq!(round_half_even(5.0, 2), 5.0);
        assert_eq!(round_half_even(4.5, 2), 4.5);
        assert!(round_half_even(f64::NAN, 2).is_nan());
    }
}
