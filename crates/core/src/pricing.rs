//! Budget resolution against a tenant's published pricing options.
//!
//! Wire budgets arrive as raw JSON so that shape errors can be told apart from
//! range errors: anything other than a bare non-negative number is
//! [`PricingError::MalformedBudgetShape`]. The currency of every allocation is
//! taken from the pricing option and never from the caller.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::pricing_option::{Currency, PricingModel, PricingOption, PricingOptionId};
use crate::domain::product::{Product, ProductId};
use crate::domain::tenant::BudgetPolicy;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub product_id: ProductId,
    pub pricing_option_id: PricingOptionId,
    pub pricing_model: PricingModel,
    pub currency: Currency,
    #[serde(with = "rust_decimal::serde::float")]
    pub budget: Decimal,
    /// Delivery units the budget buys at a fixed rate. Absent for auction and
    /// flat-rate options.
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_units: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBudget {
    pub currency: Currency,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_budget: Decimal,
    pub allocations: Vec<BudgetAllocation>,
}

/// One package as chosen by the buyer, before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSelection {
    pub product_id: ProductId,
    pub pricing_option_id: PricingOptionId,
    pub budget: Value,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("pricing option `{pricing_option_id}` is not offered on product `{product_id}`")]
    UnknownPricingOption { product_id: ProductId, pricing_option_id: PricingOptionId },
    #[error(
        "budget {budget} {currency} for `{pricing_option_id}` is below the minimum spend of {min_spend}"
    )]
    BudgetBelowMinimumSpend {
        pricing_option_id: PricingOptionId,
        budget: Decimal,
        min_spend: Decimal,
        currency: Currency,
    },
    #[error("`{field}` must be a bare non-negative number: {reason}")]
    MalformedBudgetShape { field: String, reason: String },
    #[error("packages mix currencies {expected} and {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },
    #[error("total budget {total} does not satisfy {policy:?} over package budgets summing to {package_sum}")]
    TotalBudgetMismatch { policy: BudgetPolicy, total: Decimal, package_sum: Decimal },
    #[error("a media buy needs at least one package")]
    NoPackages,
}

fn out_of_range(field: &str) -> PricingError {
    PricingError::MalformedBudgetShape {
        field: field.to_string(),
        reason: "number is out of range".to_string(),
    }
}

/// Parse a wire budget field. Only JSON numbers are accepted.
pub fn parse_budget(field: &str, value: &Value) -> Result<Decimal, PricingError> {
    let malformed = |reason: &str| PricingError::MalformedBudgetShape {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    let number = match value {
        Value::Number(number) => number,
        Value::Object(_) => {
            return Err(malformed("got an object; currency and pacing belong elsewhere"))
        }
        Value::String(_) => return Err(malformed("got a string")),
        Value::Array(_) => return Err(malformed("got an array")),
        Value::Bool(_) => return Err(malformed("got a boolean")),
        Value::Null => return Err(malformed("got null")),
    };

    let text = number.to_string();
    let amount = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| out_of_range(field))?;

    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(malformed("budget is negative"));
    }
    Ok(amount)
}

pub fn find_option<'a>(
    catalog: &'a [Product],
    product_id: &ProductId,
    pricing_option_id: &PricingOptionId,
) -> Result<&'a PricingOption, PricingError> {
    catalog
        .iter()
        .find(|product| &product.product_id == product_id)
        .and_then(|product| product.pricing_option(pricing_option_id))
        .ok_or_else(|| PricingError::UnknownPricingOption {
            product_id: product_id.clone(),
            pricing_option_id: pricing_option_id.clone(),
        })
}

/// Resolve one package budget against the tenant catalog.
pub fn resolve(
    catalog: &[Product],
    product_id: &ProductId,
    pricing_option_id: &PricingOptionId,
    requested_budget: &Value,
) -> Result<BudgetAllocation, PricingError> {
    let option = find_option(catalog, product_id, pricing_option_id)?;
    let budget = parse_budget("budget", requested_budget)?;

    if let Some(min_spend) = option.min_spend {
        if budget < min_spend {
            return Err(PricingError::BudgetBelowMinimumSpend {
                pricing_option_id: option.id.clone(),
                budget,
                min_spend,
                currency: option.currency.clone(),
            });
        }
    }

    Ok(BudgetAllocation {
        product_id: product_id.clone(),
        pricing_option_id: option.id.clone(),
        pricing_model: option.model,
        currency: option.currency.clone(),
        budget,
        estimated_units: estimated_units(option, budget)?,
    })
}

/// Resolve every package of a buy plus its total budget. When `total_budget`
/// is absent the package sum is used.
pub fn resolve_buy(
    catalog: &[Product],
    policy: BudgetPolicy,
    total_budget: Option<&Value>,
    packages: &[PackageSelection],
) -> Result<ResolvedBudget, PricingError> {
    if packages.is_empty() {
        return Err(PricingError::NoPackages);
    }

    let allocations = packages
        .iter()
        .map(|package| {
            resolve(catalog, &package.product_id, &package.pricing_option_id, &package.budget)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let currency = allocations[0].currency.clone();
    if let Some(other) = allocations.iter().find(|allocation| allocation.currency != currency) {
        return Err(PricingError::CurrencyMismatch {
            expected: currency,
            found: other.currency.clone(),
        });
    }

    let package_sum = sum_budgets("packages", allocations.iter().map(|allocation| allocation.budget))?;
    let total = match total_budget {
        Some(value) => parse_budget("total_budget", value)?,
        None => package_sum,
    };
    check_total(policy, total, package_sum)?;

    Ok(ResolvedBudget { currency, total_budget: total, allocations })
}

pub fn check_total(
    policy: BudgetPolicy,
    total: Decimal,
    package_sum: Decimal,
) -> Result<(), PricingError> {
    let satisfied = match policy {
        BudgetPolicy::ExactSum => total == package_sum,
        BudgetPolicy::UpperBound => package_sum <= total,
    };
    if satisfied {
        Ok(())
    } else {
        Err(PricingError::TotalBudgetMismatch { policy, total, package_sum })
    }
}

/// Sum of package budgets. A sum past the decimal range is reported against
/// `field` rather than wrapping or panicking.
pub fn sum_budgets<I>(field: &str, budgets: I) -> Result<Decimal, PricingError>
where
    I: IntoIterator<Item = Decimal>,
{
    budgets
        .into_iter()
        .try_fold(Decimal::ZERO, |sum, budget| sum.checked_add(budget))
        .ok_or_else(|| out_of_range(field))
}

pub fn estimated_units(option: &PricingOption, budget: Decimal) -> Result<Option<Decimal>, PricingError> {
    let (Some(rate), Some(units_per_rate)) = (option.fixed_rate(), option.model.units_per_rate()) else {
        return Ok(None);
    };
    if rate.is_zero() {
        return Ok(None);
    }
    budget
        .checked_div(rate)
        .and_then(|per_rate| per_rate.checked_mul(units_per_rate))
        .map(|units| Some(units.floor()))
        .ok_or_else(|| out_of_range("budget"))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{
        parse_budget, resolve, resolve_buy, sum_budgets, PackageSelection, PricingError,
    };
    use crate::domain::pricing_option::{
        Currency, PriceTerms, PricingModel, PricingOption, PricingOptionId,
    };
    use crate::domain::product::{DeliveryType, Product, ProductId};
    use crate::domain::tenant::{BudgetPolicy, TenantId};

    fn option(id: &str, currency: &str, terms: PriceTerms, min_spend: Option<i64>) -> PricingOption {
        PricingOption {
            id: PricingOptionId(id.to_string()),
            model: PricingModel::Cpm,
            currency: Currency::parse(currency).expect("currency"),
            terms,
            min_spend: min_spend.map(Decimal::from),
        }
    }

    fn catalog() -> Vec<Product> {
        vec![Product {
            product_id: ProductId("homepage_takeover".to_string()),
            tenant_id: TenantId("tenant_a".to_string()),
            name: "Homepage takeover".to_string(),
            description: "Above-the-fold display".to_string(),
            delivery_type: DeliveryType::Guaranteed,
            format_ids: vec!["display_300x250".to_string()],
            pricing_options: vec![
                option("cpm_usd_fixed", "USD", PriceTerms::Fixed { rate: Decimal::from(10) }, Some(1000)),
                option(
                    "cpm_eur_auction",
                    "EUR",
                    PriceTerms::Auction { floor: Decimal::from(2), median: Decimal::from(4) },
                    None,
                ),
            ],
        }]
    }

    fn selection(option_id: &str, budget: serde_json::Value) -> PackageSelection {
        PackageSelection {
            product_id: ProductId("homepage_takeover".to_string()),
            pricing_option_id: PricingOptionId(option_id.to_string()),
            budget,
        }
    }

    #[test]
    fn allocation_currency_comes_from_the_option() {
        let allocation = resolve(
            &catalog(),
            &ProductId("homepage_takeover".to_string()),
            &PricingOptionId("cpm_usd_fixed".to_string()),
            &json!(2500),
        )
        .expect("resolve");

        assert_eq!(allocation.currency.as_str(), "USD");
        assert_eq!(allocation.budget, Decimal::from(2500));
        assert_eq!(allocation.estimated_units, Some(Decimal::from(250_000)));
    }

    #[test]
    fn structured_budget_is_malformed() {
        let error = resolve(
            &catalog(),
            &ProductId("homepage_takeover".to_string()),
            &PricingOptionId("cpm_usd_fixed".to_string()),
            &json!({"total": 2500, "currency": "USD", "pacing": "even"}),
        )
        .expect_err("object budget");

        assert!(matches!(error, PricingError::MalformedBudgetShape { .. }));
    }

    #[test]
    fn non_number_budgets_are_malformed() {
        for value in [json!("2500"), json!([2500]), json!(null), json!(true), json!(-1)] {
            assert!(matches!(
                parse_budget("budget", &value),
                Err(PricingError::MalformedBudgetShape { .. })
            ));
        }
        assert_eq!(parse_budget("budget", &json!(0)), Ok(Decimal::ZERO));
        assert_eq!(parse_budget("budget", &json!(12.75)), Ok(Decimal::new(1275, 2)));
    }

    #[test]
    fn budgets_past_the_decimal_range_are_rejected() {
        let error = resolve(
            &catalog(),
            &ProductId("homepage_takeover".to_string()),
            &PricingOptionId("cpm_usd_fixed".to_string()),
            &json!(1e28),
        )
        .expect_err("unit estimate overflows");
        assert!(matches!(
            error,
            PricingError::MalformedBudgetShape { ref reason, .. } if reason == "number is out of range"
        ));

        let near_max = Decimal::MAX - Decimal::ONE;
        assert!(matches!(
            sum_budgets("packages", [near_max, near_max]),
            Err(PricingError::MalformedBudgetShape { ref field, .. }) if field == "packages"
        ));
        assert_eq!(sum_budgets("packages", [Decimal::ONE, Decimal::TWO]), Ok(Decimal::from(3)));

        let auction = resolve_buy(
            &catalog(),
            BudgetPolicy::UpperBound,
            None,
            &[selection("cpm_eur_auction", json!(7e28)), selection("cpm_eur_auction", json!(7e28))],
        )
        .expect_err("package sum overflows");
        assert!(matches!(auction, PricingError::MalformedBudgetShape { .. }));
    }

    #[test]
    fn budget_below_minimum_spend_is_rejected() {
        let error = resolve(
            &catalog(),
            &ProductId("homepage_takeover".to_string()),
            &PricingOptionId("cpm_usd_fixed".to_string()),
            &json!(999.99),
        )
        .expect_err("below minimum");

        assert!(matches!(error, PricingError::BudgetBelowMinimumSpend { .. }));
    }

    #[test]
    fn auction_option_has_no_unit_estimate() {
        let allocation = resolve(
            &catalog(),
            &ProductId("homepage_takeover".to_string()),
            &PricingOptionId("cpm_eur_auction".to_string()),
            &json!(50),
        )
        .expect("resolve");

        assert_eq!(allocation.currency.as_str(), "EUR");
        assert_eq!(allocation.estimated_units, None);
    }

    #[test]
    fn unknown_option_or_product_is_rejected() {
        let unknown_option = resolve(
            &catalog(),
            &ProductId("homepage_takeover".to_string()),
            &PricingOptionId("cpc_usd".to_string()),
            &json!(100),
        );
        let unknown_product = resolve(
            &catalog(),
            &ProductId("podcast".to_string()),
            &PricingOptionId("cpm_usd_fixed".to_string()),
            &json!(100),
        );

        assert!(matches!(unknown_option, Err(PricingError::UnknownPricingOption { .. })));
        assert!(matches!(unknown_product, Err(PricingError::UnknownPricingOption { .. })));
    }

    #[test]
    fn mixed_currencies_are_rejected() {
        let error = resolve_buy(
            &catalog(),
            BudgetPolicy::UpperBound,
            None,
            &[selection("cpm_usd_fixed", json!(1500)), selection("cpm_eur_auction", json!(100))],
        )
        .expect_err("mixed currencies");

        assert!(matches!(error, PricingError::CurrencyMismatch { .. }));
    }

    #[test]
    fn total_budget_follows_tenant_policy() {
        let packages = [selection("cpm_usd_fixed", json!(1500)), selection("cpm_usd_fixed", json!(1000))];

        let exact = resolve_buy(&catalog(), BudgetPolicy::ExactSum, Some(&json!(2500)), &packages)
            .expect("exact sum");
        assert_eq!(exact.total_budget, Decimal::from(2500));
        assert_eq!(exact.allocations.len(), 2);

        let over = resolve_buy(&catalog(), BudgetPolicy::ExactSum, Some(&json!(3000)), &packages);
        assert!(matches!(over, Err(PricingError::TotalBudgetMismatch { .. })));

        let bounded = resolve_buy(&catalog(), BudgetPolicy::UpperBound, Some(&json!(3000)), &packages)
            .expect("upper bound");
        assert_eq!(bounded.total_budget, Decimal::from(3000));

        let defaulted =
            resolve_buy(&catalog(), BudgetPolicy::ExactSum, None, &packages).expect("defaulted");
        assert_eq!(defaulted.total_budget, Decimal::from(2500));
    }

    #[test]
    fn total_budget_shape_is_checked_too() {
        let error = resolve_buy(
            &catalog(),
            BudgetPolicy::ExactSum,
            Some(&json!({"amount": 2500, "currency": "USD"})),
            &[selection("cpm_usd_fixed", json!(2500))],
        )
        .expect_err("object total");

        assert!(matches!(
            error,
            PricingError::MalformedBudgetShape { ref field, .. } if field == "total_budget"
        ));
    }

    #[test]
    fn empty_buy_is_rejected() {
        assert_eq!(
            resolve_buy(&catalog(), BudgetPolicy::ExactSum, None, &[]),
            Err(PricingError::NoPackages)
        );
    }
}
