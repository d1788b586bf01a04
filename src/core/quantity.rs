//! Exact resource quantities and resource lists.
//!
//! Quantities are stored as signed milli-units so `500m` cpu, `3` cpu and
//! `2Gi` memory all compare and add without floating point. The accepted
//! grammar is the cluster one: an optional sign, a decimal number and an
//! optional suffix out of `m`, `k M G T P E` (powers of 1000) or
//! `Ki Mi Gi Ti Pi Ei` (powers of 1024). Fractions below one milli-unit are
//! rounded up.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SchedulerError;

/// Mapping from resource name (`cpu`, `memory`, ...) to quantity.
pub type ResourceList = BTreeMap<String, Quantity>;

/// An exact, signed resource quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    milli: i128,
}

impl Quantity {
    /// The zero quantity.
    pub const ZERO: Self = Self { milli: 0 };

    /// Quantity of `units` whole units.
    #[must_use]
    pub const fn new(units: i64) -> Self {
        Self {
            milli: units as i128 * 1000,
        }
    }

    /// Quantity of `milli` thousandths of a unit.
    #[must_use]
    pub const fn from_milli(milli: i128) -> Self {
        Self { milli }
    }

    /// Value in milli-units.
    #[must_use]
    pub const fn milli_value(&self) -> i128 {
        self.milli
    }

    /// Value in whole units, rounded up.
    #[must_use]
    pub const fn value(&self) -> i128 {
        let whole = self.milli / 1000;
        if self.milli % 1000 > 0 {
            whole + 1
        } else {
            whole
        }
    }

    /// -1, 0 or 1 depending on the sign.
    #[must_use]
    pub const fn signum(&self) -> i32 {
        if self.milli > 0 {
            1
        } else if self.milli < 0 {
            -1
        } else {
            0
        }
    }

    /// Sum of both quantities, or `None` when it does not fit.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.milli.checked_add(rhs.milli) {
            Some(milli) => Some(Self { milli }),
            None => None,
        }
    }

    /// Whether the quantity is exactly zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.milli == 0
    }
}

fn suffix_multiplier(suffix: &str) -> Option<(i128, i128)> {
    // (numerator, denominator) applied to the base unit
    let m = match suffix {
        "" => (1, 1),
        "m" => (1, 1000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (1 << 10, 1),
        "Mi" => (1 << 20, 1),
        "Gi" => (1 << 30, 1),
        "Ti" => (1 << 40, 1),
        "Pi" => (1 << 50, 1),
        "Ei" => (1 << 60, 1),
        _ => return None,
    };
    Some(m)
}

impl FromStr for Quantity {
    type Err = SchedulerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || SchedulerError::InvalidQuantity(raw.to_string());
        let trimmed = raw.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            Some(_) => (false, trimmed),
            None => return Err(invalid()),
        };
        let split = body
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(body.len());
        let (number, suffix) = body.split_at(split);
        let (num, den) = suffix_multiplier(suffix).ok_or_else(invalid)?;

        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if frac_part.len() > 18 {
            return Err(invalid());
        }
        let int_val: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let frac_val: i128 = if frac_part.is_empty() {
            0
        } else {
            frac_part.parse().map_err(|_| invalid())?
        };
        let frac_scale = 10_i128.pow(u32::try_from(frac_part.len()).map_err(|_| invalid())?);

        // exact value = (int + frac/frac_scale) * num / den, expressed in milli
        let numerator = int_val
            .checked_mul(frac_scale)
            .and_then(|v| v.checked_add(frac_val))
            .and_then(|v| v.checked_mul(num))
            .and_then(|v| v.checked_mul(1000))
            .ok_or_else(invalid)?;
        let denominator = frac_scale * den;
        let mut milli = numerator / denominator;
        if numerator % denominator != 0 {
            milli += 1;
        }
        Ok(Self {
            milli: if negative { -milli } else { milli },
        })
    }
}

impl TryFrom<String> for Quantity {
    type Error = SchedulerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quantity> for String {
    fn from(q: Quantity) -> Self {
        q.to_string()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milli % 1000 == 0 {
            write!(f, "{}", self.milli / 1000)
        } else {
            write!(f, "{}m", self.milli)
        }
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            milli: self.milli.saturating_add(rhs.milli),
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        self.milli = self.milli.saturating_add(rhs.milli);
    }
}

impl Sub for Quantity {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            milli: self.milli.saturating_sub(rhs.milli),
        }
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Self) {
        self.milli = self.milli.saturating_sub(rhs.milli);
    }
}

impl Neg for Quantity {
    type Output = Self;

    fn neg(self) -> Self {
        Self { milli: -self.milli }
    }
}

/// Add every entry of `request` into `total`.
pub fn add_resources(total: &mut ResourceList, request: &ResourceList) {
    for (name, quantity) in request {
        *total.entry(name.clone()).or_default() += *quantity;
    }
}

/// Subtract every entry of `request` from `total`.
///
/// Entries that drop to zero or below are removed, entries missing from
/// `total` are skipped.
pub fn sub_resources(total: &mut ResourceList, request: &ResourceList) {
    for (name, quantity) in request {
        let Some(current) = total.get_mut(name) else {
            continue;
        };
        *current -= *quantity;
        if current.signum() <= 0 {
            total.remove(name);
        }
    }
}

/// Build a resource list from `(name, quantity)` string pairs.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidQuantity`] on the first unparsable quantity.
pub fn resource_list<'a, I>(pairs: I) -> Result<ResourceList, SchedulerError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(name, raw)| Ok((name.to_string(), raw.parse()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(raw: &str) -> Quantity {
        raw.parse().unwrap()
    }

    #[test]
    fn test_parse_plain_and_milli() {
        assert_eq!(q("4").milli_value(), 4000);
        assert_eq!(q("500m").milli_value(), 500);
        assert_eq!(q("0.5").milli_value(), 500);
        assert_eq!(q("1.5").milli_value(), 1500);
        assert_eq!(q("-2").milli_value(), -2000);
    }

    #[test]
    fn test_parse_binary_and_decimal_suffixes() {
        assert_eq!(q("1Ki").value(), 1024);
        assert_eq!(q("2Gi").value(), 2 * (1 << 30));
        assert_eq!(q("3k").value(), 3000);
        assert_eq!(q("1.5Mi").value(), 1_572_864);
        assert_eq!(q("1G"), Quantity::new(1_000_000_000));
    }

    #[test]
    fn test_sub_milli_fraction_rounds_up() {
        assert_eq!(q("0.0001").milli_value(), 1);
        assert_eq!(q("1.5m").milli_value(), 2);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("".parse::<Quantity>().is_err());
        assert!("abc".parse::<Quantity>().is_err());
        assert!("4X".parse::<Quantity>().is_err());
        assert!("1.2.3".parse::<Quantity>().is_err());
        assert!(".".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(q("4").to_string(), "4");
        assert_eq!(q("250m").to_string(), "250m");
        assert_eq!(q("1Ki").to_string(), "1024");
    }

    #[test]
    fn test_arithmetic_and_ordering() {
        let sum = q("3") + q("2");
        assert!(sum > q("4"));
        assert_eq!(sum - q("5"), Quantity::ZERO);
        assert_eq!((-q("1")).signum(), -1);
        assert_eq!(q("1").value(), 1);
        assert_eq!(q("1001m").value(), 2);
    }

    #[test]
    fn test_checked_add_reports_overflow() {
        let max = Quantity::from_milli(i128::MAX);
        assert_eq!(max.checked_add(q("1m")), None);
        assert_eq!(max + q("1m"), max);
        assert_eq!(q("1").checked_add(q("500m")), Some(q("1500m")));
    }

    #[test]
    fn test_serde_as_string() {
        let list = resource_list([("cpu", "250m"), ("memory", "1Gi")]).unwrap();
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"{"cpu":"250m","memory":"1073741824"}"#);
        let back: ResourceList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
        assert!(serde_json::from_str::<Quantity>(r#""nope""#).is_err());
    }

    #[test]
    fn test_add_and_sub_resources() {
        let mut total = ResourceList::new();
        let req = resource_list([("cpu", "2"), ("memory", "1Gi")]).unwrap();
        add_resources(&mut total, &req);
        add_resources(&mut total, &req);
        assert_eq!(total["cpu"], q("4"));

        sub_resources(&mut total, &req);
        assert_eq!(total["cpu"], q("2"));
        sub_resources(&mut total, &req);
        assert!(total.is_empty());

        // never goes negative, missing entries are skipped
        sub_resources(&mut total, &req);
        assert!(total.is_empty());
    }
}
