//! Marketplace sell-price model.
//!
//! Derives a sell price from the dropship purchase price (`pvd`, excl. VAT)
//! and the advised retail price (`price`, incl. VAT), such that after VAT,
//! marketplace fees and shipping the sale still clears both the minimum
//! profit and the minimum margin. The result is rounded up to a whole euro
//! minus one cent, and clamped to the configured price band.

use feedbuilder_shared::{FilterConfig, PricingConfig};

/// Guards the divisions when fees and VAT eat the whole price.
const MIN_DENOMINATOR: f64 = 1e-9;

/// Derived columns, in output order.
pub const PRICE_COLUMNS: [&str; 8] = [
    "sell_price",
    "profit_eur",
    "margin_pct",
    "ok",
    "avp_inc",
    "avp_excl",
    "diff_vs_avp",
    "ge_avp",
];

/// Pricing parameters as fractions.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingModel {
    vat: f64,
    fee_pct: f64,
    fee_fixed: f64,
    ship: f64,
    min_price: f64,
    max_price: f64,
    min_profit: f64,
    min_margin: f64,
}

/// Pricing outcome for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub sell_price: f64,
    pub profit_eur: f64,
    /// Fraction, 0.1578 = 15.78 %.
    pub margin_pct: f64,
    /// Clears minimum profit, minimum margin and the price band.
    pub ok: bool,
    pub avp_inc: f64,
    pub avp_excl: f64,
    pub diff_vs_avp: f64,
    pub ge_avp: bool,
}

impl PricingModel {
    /// The price band comes from the filter settings.
    pub fn new(pricing: &PricingConfig, filters: &FilterConfig) -> Self {
        Self {
            vat: pricing.vat_pct / 100.0,
            fee_pct: pricing.fee_pct / 100.0,
            fee_fixed: pricing.fee_fixed,
            ship: pricing.ship_cost_eur,
            min_price: filters.min_price,
            max_price: filters.max_price,
            min_profit: pricing.min_profit_eur,
            min_margin: pricing.min_margin_pct / 100.0,
        }
    }

    /// Quote a product bought at `pvd` with advised retail price `avp_inc`.
    pub fn quote(&self, pvd: f64, avp_inc: f64) -> PriceQuote {
        let costs = self.fee_fixed + self.ship + pvd;
        let net_share = 1.0 - self.vat - self.fee_pct;

        let floor_for_profit = (self.min_profit + costs) / net_share.max(MIN_DENOMINATOR);
        let floor_for_margin = costs / (net_share - self.min_margin).max(MIN_DENOMINATOR);

        let base = self
            .min_price
            .max(floor_for_profit)
            .max(floor_for_margin)
            .max(avp_inc);

        let sell = (base.ceil() - 0.01).min(self.max_price);
        let profit = sell * net_share - costs;
        let margin = if sell > 0.0 { profit / sell } else { 0.0 };

        let ok = profit >= self.min_profit
            && margin >= self.min_margin
            && sell >= self.min_price
            && sell <= self.max_price;

        let (avp_excl, diff_vs_avp, ge_avp) = if avp_inc != 0.0 {
            (avp_inc / (1.0 + self.vat), sell / avp_inc - 1.0, sell >= avp_inc)
        } else {
            (0.0, 0.0, true)
        };

        PriceQuote {
            sell_price: round_to(sell, 2),
            profit_eur: round_to(profit, 2),
            margin_pct: round_to(margin, 4),
            ok,
            avp_inc: round_to(avp_inc, 2),
            avp_excl: round_to(avp_excl, 2),
            diff_vs_avp: round_to(diff_vs_avp, 4),
            ge_avp,
        }
    }
}

impl PriceQuote {
    /// Cell values matching [`PRICE_COLUMNS`].
    pub fn cells(&self) -> [String; 8] {
        [
            format!("{:.2}", self.sell_price),
            format!("{:.2}", self.profit_eur),
            format!("{:.4}", self.margin_pct),
            flag(self.ok),
            format!("{:.2}", self.avp_inc),
            format!("{:.2}", self.avp_excl),
            format!("{:.4}", self.diff_vs_avp),
            flag(self.ge_avp),
        ]
    }
}

fn flag(value: bool) -> String {
    if value { "TRUE" } else { "FALSE" }.to_string()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
