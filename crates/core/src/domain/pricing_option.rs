//! Pricing options published on products.
//!
//! The wire shape carries `is_fixed` plus optional `rate` / `floor` /
//! `median` fields. It is converted into [`PriceTerms`] on the way in, so an
//! option with both a fixed rate and an auction floor (or neither) cannot be
//! constructed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PricingOptionId(pub String);

impl std::fmt::Display for PricingOptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO 4217 currency code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, InvalidPricingOption> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|ch| ch.is_ascii_uppercase()) {
            Ok(Self(code.to_string()))
        } else {
            Err(InvalidPricingOption(format!("`{code}` is not a three-letter ISO 4217 code")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = InvalidPricingOption;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingModel {
    Cpm,
    Cpc,
    Cpv,
    Cpp,
    Cpcv,
    FlatRate,
}

impl PricingModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpm => "cpm",
            Self::Cpc => "cpc",
            Self::Cpv => "cpv",
            Self::Cpp => "cpp",
            Self::Cpcv => "cpcv",
            Self::FlatRate => "flat_rate",
        }
    }

    /// How many delivery units one rate unit buys. CPM and CPP are quoted per
    /// thousand; flat rate has no unit.
    pub fn units_per_rate(&self) -> Option<Decimal> {
        match self {
            Self::Cpm | Self::Cpp => Some(Decimal::from(1_000)),
            Self::Cpc | Self::Cpv | Self::Cpcv => Some(Decimal::ONE),
            Self::FlatRate => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PriceTerms {
    Fixed { rate: Decimal },
    Auction { floor: Decimal, median: Decimal },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PricingOptionRecord", into = "PricingOptionRecord")]
pub struct PricingOption {
    pub id: PricingOptionId,
    pub model: PricingModel,
    pub currency: Currency,
    pub terms: PriceTerms,
    pub min_spend: Option<Decimal>,
}

impl PricingOption {
    pub fn is_fixed(&self) -> bool {
        matches!(self.terms, PriceTerms::Fixed { .. })
    }

    pub fn fixed_rate(&self) -> Option<Decimal> {
        match self.terms {
            PriceTerms::Fixed { rate } => Some(rate),
            PriceTerms::Auction { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid pricing option: {0}")]
pub struct InvalidPricingOption(pub String);

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PricingOptionRecord {
    pricing_option_id: String,
    pricing_model: PricingModel,
    currency: Currency,
    is_fixed: bool,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    rate: Option<Decimal>,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    floor: Option<Decimal>,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    median: Option<Decimal>,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    min_spend: Option<Decimal>,
}

impl TryFrom<PricingOptionRecord> for PricingOption {
    type Error = InvalidPricingOption;

    fn try_from(record: PricingOptionRecord) -> Result<Self, Self::Error> {
        let id = record.pricing_option_id.trim().to_string();
        if id.is_empty() {
            return Err(InvalidPricingOption("pricing_option_id must not be empty".to_string()));
        }

        let terms = match (record.is_fixed, record.rate, record.floor, record.median) {
            (true, Some(rate), None, None) => {
                if rate < Decimal::ZERO {
                    return Err(InvalidPricingOption(format!("`{id}` has a negative rate")));
                }
                PriceTerms::Fixed { rate }
            }
            (false, None, Some(floor), Some(median)) => {
                if floor < Decimal::ZERO || median < floor {
                    return Err(InvalidPricingOption(format!(
                        "`{id}` requires 0 <= floor <= median"
                    )));
                }
                PriceTerms::Auction { floor, median }
            }
            (true, _, _, _) => {
                return Err(InvalidPricingOption(format!(
                    "`{id}` is fixed and must carry `rate` without `floor`/`median`"
                )))
            }
            (false, _, _, _) => {
                return Err(InvalidPricingOption(format!(
                    "`{id}` is auction-priced and must carry `floor` and `median` without `rate`"
                )))
            }
        };

        if let Some(min_spend) = record.min_spend {
            if min_spend < Decimal::ZERO {
                return Err(InvalidPricingOption(format!("`{id}` has a negative min_spend")));
            }
        }

        Ok(Self {
            id: PricingOptionId(id),
            model: record.pricing_model,
            currency: record.currency,
            terms,
            min_spend: record.min_spend,
        })
    }
}

impl From<PricingOption> for PricingOptionRecord {
    fn from(option: PricingOption) -> Self {
        let (is_fixed, rate, floor, median) = match option.terms {
            PriceTerms::Fixed { rate } => (true, Some(rate), None, None),
            PriceTerms::Auction { floor, median } => (false, None, Some(floor), Some(median)),
        };
        Self {
            pricing_option_id: option.id.0,
            pricing_model: option.model,
            currency: option.currency,
            is_fixed,
            rate,
            floor,
            median,
            min_spend: option.min_spend,
        }
    }
}
