//! Price and tax arithmetic for converted orders.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tax state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxState {
    #[serde(rename = "gross")]
    Gross,
    #[serde(rename = "net")]
    Net,
    #[serde(rename = "tax-free")]
    Free,
}

impl TaxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gross => "gross",
            Self::Net => "net",
            Self::Free => "tax-free",
        }
    }

    /// Gross unless the `net` flag is set; `tax_free` wins over both.
    pub fn from_flags(net: bool, tax_free: bool) -> Self {
        if tax_free {
            Self::Free
        } else if net {
            Self::Net
        } else {
            Self::Gross
        }
    }
}

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRule {
    pub tax_rate: f64,
    /// Share of the price this rule applies to.
    pub percentage: f64,
}

impl TaxRule {
    pub fn new(tax_rate: f64) -> Self {
        Self {
            tax_rate,
            percentage: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedTax {
    pub tax: f64,
    pub tax_rate: f64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedPrice {
    pub unit_price: f64,
    pub total_price: f64,
    pub calculated_taxes: Vec<CalculatedTax>,
    pub tax_rules: Vec<TaxRule>,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityPriceDefinition {
    pub price: f64,
    pub tax_rules: Vec<TaxRule>,
    pub precision: u32,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartPrice {
    pub net_price: f64,
    pub total_price: f64,
    pub position_price: f64,
    pub calculated_taxes: Vec<CalculatedTax>,
    pub tax_rules: Vec<TaxRule>,
    pub tax_status: TaxState,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Round half away from zero to `precision` decimals.
pub fn round(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Taxes contained in a gross `price`, one entry per rule.
pub fn calculate_gross_taxes(price: f64, precision: u32, rules: &[TaxRule]) -> Vec<CalculatedTax> {
    rules
        .iter()
        .map(|rule| {
            let gross = price * rule.percentage / 100.0;
            let net = gross / ((100.0 + rule.tax_rate) / 100.0);
            CalculatedTax {
                tax: round(net * rule.tax_rate / 100.0, precision),
                tax_rate: rule.tax_rate,
                price: gross,
            }
        })
        .collect()
}

/// Taxes on top of a net `price`, one entry per rule.
pub fn calculate_net_taxes(price: f64, precision: u32, rules: &[TaxRule]) -> Vec<CalculatedTax> {
    rules
        .iter()
        .map(|rule| {
            let net = price * rule.percentage / 100.0;
            CalculatedTax {
                tax: round(net * rule.tax_rate / 100.0, precision),
                tax_rate: rule.tax_rate,
                price: net,
            }
        })
        .collect()
}

/// Taxes for `price` under the given state. Tax-free prices carry none.
pub fn calculate_taxes(state: TaxState, price: f64, precision: u32, rules: &[TaxRule]) -> Vec<CalculatedTax> {
    match state {
        TaxState::Gross => calculate_gross_taxes(price, precision, rules),
        TaxState::Net => calculate_net_taxes(price, precision, rules),
        TaxState::Free => Vec::new(),
    }
}

/// One rule per distinct tax rate, in first-seen order.
pub fn tax_rules_from_rates(rates: impl IntoIterator<Item = f64>) -> Vec<TaxRule> {
    let mut rules: Vec<TaxRule> = Vec::new();
    for rate in rates {
        if !rules.iter().any(|r| r.tax_rate == rate) {
            rules.push(TaxRule::new(rate));
        }
    }
    rules
}
