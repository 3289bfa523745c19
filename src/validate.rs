//! Request validation.
//!
//! Every ledger mutation takes one of the checked inputs below, so invalid
//! data is rejected before a transaction is opened.

use serde_json::Value;

/// Why a request was rejected as invalid input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    #[error("The donor name is required.")]
    MissingDonorName,
    #[error("The amount must be a whole number.")]
    NonNumericAmount,
    #[error("The amount must be at least {min}.")]
    AmountTooLow { min: i64 },
    #[error("The amount must be at most {max}.")]
    AmountTooHigh { max: i64 },
    #[error("The amount must be greater than zero.")]
    NonPositiveAmount,
    #[error("The title is required.")]
    MissingTitle,
    #[error("The target amount must be greater than zero.")]
    NonPositiveTarget,
    #[error("Malformed request: {0}")]
    Malformed(String),
}

impl InvalidReason {
    /// Stable code for logs and error responses.
    pub fn code(&self) -> &'static str {
        match self {
            InvalidReason::MissingDonorName => "missing_donor_name",
            InvalidReason::NonNumericAmount => "non_numeric_amount",
            InvalidReason::AmountTooLow { .. } => "amount_too_low",
            InvalidReason::AmountTooHigh { .. } => "amount_too_high",
            InvalidReason::NonPositiveAmount => "non_positive_amount",
            InvalidReason::MissingTitle => "missing_title",
            InvalidReason::NonPositiveTarget => "non_positive_target",
            InvalidReason::Malformed(_) => "malformed",
        }
    }
}

/// Largest amount a single donation or target may carry.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000_000;

fn at_most_max(amount: i64) -> Result<i64, InvalidReason> {
    if amount > MAX_AMOUNT {
        Err(InvalidReason::AmountTooHigh { max: MAX_AMOUNT })
    } else {
        Ok(amount)
    }
}

/// Parse an amount sent as a json number or a numeric string.
/// Fractional, infinite and NaN values are rejected.
pub fn parse_amount(value: &Value) -> Result<i64, InvalidReason> {
    let float = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => return Ok(i),
            None => n.as_f64(),
        },
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => return Ok(i),
                Err(_) => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    };
    match float {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(InvalidReason::NonNumericAmount),
    }
}

fn donor_name(name: &str) -> Result<String, InvalidReason> {
    let name = name.trim();
    if name.is_empty() {
        Err(InvalidReason::MissingDonorName)
    } else {
        Ok(name.to_owned())
    }
}

fn donor_email(email: &str) -> Option<String> {
    let email = email.trim();
    (!email.is_empty()).then(|| email.to_owned())
}

/// A donation that passed validation and can be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDonation {
    pub(crate) donor_name: String,
    pub(crate) donor_email: Option<String>,
    pub(crate) amount: i64,
}

impl NewDonation {
    pub fn new(
        donor_name: &str,
        donor_email: Option<&str>,
        amount: &Value,
        min_amount: i64,
    ) -> Result<Self, InvalidReason> {
        let donor_name = self::donor_name(donor_name)?;
        let amount = parse_amount(amount)?;
        if amount < min_amount {
            return Err(InvalidReason::AmountTooLow { min: min_amount });
        }
        let amount = at_most_max(amount)?;
        Ok(Self {
            donor_name,
            donor_email: donor_email.and_then(self::donor_email),
            amount,
        })
    }

    pub fn donor_name(&self) -> &str {
        &self.donor_name
    }

    pub fn donor_email(&self) -> Option<&str> {
        self.donor_email.as_deref()
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }
}

/// New values for an existing donation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationRevision {
    pub(crate) donor_name: String,
    /// `None` keeps the stored email, `Some(None)` clears it.
    pub(crate) donor_email: Option<Option<String>>,
    pub(crate) amount: i64,
}

impl DonationRevision {
    pub fn new(
        donor_name: &str,
        donor_email: Option<&str>,
        amount: &Value,
    ) -> Result<Self, InvalidReason> {
        let donor_name = self::donor_name(donor_name)?;
        let amount = parse_amount(amount)?;
        if amount <= 0 {
            return Err(InvalidReason::NonPositiveAmount);
        }
        let amount = at_most_max(amount)?;
        Ok(Self {
            donor_name,
            donor_email: donor_email.map(self::donor_email),
            amount,
        })
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }
}

/// A fundraising event ready to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) target_amount: i64,
    pub(crate) created_by: String,
}

impl NewEvent {
    pub fn new(
        title: &str,
        description: &str,
        target_amount: &Value,
        created_by: String,
    ) -> Result<Self, InvalidReason> {
        let title = title.trim();
        if title.is_empty() {
            return Err(InvalidReason::MissingTitle);
        }
        let target_amount = parse_amount(target_amount)?;
        if target_amount <= 0 {
            return Err(InvalidReason::NonPositiveTarget);
        }
        let target_amount = at_most_max(target_amount)?;
        Ok(Self {
            title: title.to_owned(),
            description: description.trim().to_owned(),
            target_amount,
            created_by,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn target_amount(&self) -> i64 {
        self.target_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amount() {
        assert_eq!(parse_amount(&json!(1000)), Ok(1000));
        assert_eq!(parse_amount(&json!(2500.0)), Ok(2500));
        assert_eq!(parse_amount(&json!(" 5000 ")), Ok(5000));
        assert_eq!(parse_amount(&json!("1e3")), Ok(1000));
        assert_eq!(parse_amount(&json!(-20)), Ok(-20));
        assert_eq!(
            parse_amount(&json!(10.5)),
            Err(InvalidReason::NonNumericAmount)
        );
        assert_eq!(
            parse_amount(&json!("abc")),
            Err(InvalidReason::NonNumericAmount)
        );
        assert_eq!(
            parse_amount(&json!("NaN")),
            Err(InvalidReason::NonNumericAmount)
        );
        assert_eq!(
            parse_amount(&json!(null)),
            Err(InvalidReason::NonNumericAmount)
        );
        assert_eq!(
            parse_amount(&json!(true)),
            Err(InvalidReason::NonNumericAmount)
        );
        assert_eq!(
            parse_amount(&json!(u64::MAX)),
            Err(InvalidReason::NonNumericAmount)
        );
    }

    #[test]
    fn new_donation() {
        let d = NewDonation::new("  Budi ", Some(" budi@mail.id "), &json!(1000), 1000).unwrap();
        assert_eq!(d.donor_name(), "Budi");
        assert_eq!(d.donor_email(), Some("budi@mail.id"));
        assert_eq!(d.amount(), 1000);

        let d = NewDonation::new("Budi", Some("  "), &json!("2000"), 1000).unwrap();
        assert_eq!(d.donor_email(), None);

        assert_eq!(
            NewDonation::new("Budi", None, &json!(999), 1000),
            Err(InvalidReason::AmountTooLow { min: 1000 })
        );
        assert_eq!(
            NewDonation::new("Budi", None, &json!(0), 1000),
            Err(InvalidReason::AmountTooLow { min: 1000 })
        );
        assert_eq!(
            NewDonation::new("   ", None, &json!(5000), 1000),
            Err(InvalidReason::MissingDonorName)
        );
        assert_eq!(
            NewDonation::new("Budi", None, &json!("lots"), 1000),
            Err(InvalidReason::NonNumericAmount)
        );
        // name is checked first
        assert_eq!(
            NewDonation::new("", None, &json!("lots"), 1000)
                .unwrap_err()
                .code(),
            "missing_donor_name"
        );

        assert_eq!(
            NewDonation::new("Budi", None, &json!(MAX_AMOUNT), 1000).map(|d| d.amount()),
            Ok(MAX_AMOUNT)
        );
        assert_eq!(
            NewDonation::new("Budi", None, &json!(i64::MAX - 10), 1000),
            Err(InvalidReason::AmountTooHigh { max: MAX_AMOUNT })
        );
    }

    #[test]
    fn revision() {
        let r = DonationRevision::new("Sari", None, &json!(1)).unwrap();
        assert_eq!(r.amount(), 1);
        assert_eq!(r.donor_email, None);

        let r = DonationRevision::new("Sari", Some(""), &json!(100)).unwrap();
        assert_eq!(r.donor_email, Some(None));

        let r = DonationRevision::new("Sari", Some("sari@mail.id"), &json!(100)).unwrap();
        assert_eq!(r.donor_email, Some(Some("sari@mail.id".to_owned())));

        assert_eq!(
            DonationRevision::new("Sari", None, &json!(0)),
            Err(InvalidReason::NonPositiveAmount)
        );
        assert_eq!(
            DonationRevision::new("Sari", None, &json!(-5)),
            Err(InvalidReason::NonPositiveAmount)
        );
        assert_eq!(
            DonationRevision::new("", None, &json!(10)),
            Err(InvalidReason::MissingDonorName)
        );
        assert_eq!(
            DonationRevision::new("Sari", None, &json!(MAX_AMOUNT + 1))
                .unwrap_err()
                .code(),
            "amount_too_high"
        );
    }

    #[test]
    fn new_event() {
        let e = NewEvent::new(" Bakti Sosial ", "", &json!(2_000_000), "org".to_owned()).unwrap();
        assert_eq!(e.title(), "Bakti Sosial");
        assert_eq!(e.target_amount(), 2_000_000);
        assert_eq!(
            NewEvent::new("", "", &json!(10), "org".to_owned()),
            Err(InvalidReason::MissingTitle)
        );
        assert_eq!(
            NewEvent::new("Title", "", &json!(0), "org".to_owned()),
            Err(InvalidReason::NonPositiveTarget)
        );
        assert_eq!(
            NewEvent::new("Title", "", &json!(i64::MAX), "org".to_owned()),
            Err(InvalidReason::AmountTooHigh { max: MAX_AMOUNT })
        );
    }
}
