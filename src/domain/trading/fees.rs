//! Per-market cost model (§4.6): commission and directional slippage, plus
//! the exec-price and commission-amount helpers that apply them.

use crate::domain::market::Market;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostParams {
    /// Fraction of gross base-currency trade amount charged as commission.
    pub commission: Decimal,
    /// Fraction of price applied as directional slippage.
    pub slippage: Decimal,
}

/// `{domestic: (1.5 bp, 20 bp), global: (3 bp, 10 bp)}` (§4.6). A benchmark
/// instrument costs nothing to trade — it exists only to mark the parallel
/// benchmark portfolio (§4.8), never to be traded for real P&L.
pub fn cost_params_for(market: Market) -> CostParams {
    match market {
        Market::DomesticRegular | Market::DomesticAts => CostParams {
            commission: dec!(0.00015),
            slippage: dec!(0.0020),
        },
        Market::GlobalEtf => CostParams {
            commission: dec!(0.0003),
            slippage: dec!(0.0010),
        },
        Market::Benchmark => CostParams {
            commission: Decimal::ZERO,
            slippage: Decimal::ZERO,
        },
    }
}

/// Buy execution price: `price * (1 + slippage)`.
pub fn buy_exec_price(market_price: Decimal, costs: CostParams) -> Decimal {
    market_price * (Decimal::ONE + costs.slippage)
}

/// Sell execution price: `price * (1 - slippage)`.
pub fn sell_exec_price(market_price: Decimal, costs: CostParams) -> Decimal {
    market_price * (Decimal::ONE - costs.slippage)
}

/// Commission charged on the gross base-currency amount after FX
/// conversion.
pub fn commission_amount(gross_base_ccy_amount: Decimal, costs: CostParams) -> Decimal {
    gross_base_ccy_amount.abs() * costs.commission
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domestic_costs_are_1_5_and_20_bp() {
        let c = cost_params_for(Market::DomesticRegular);
        assert_eq!(c.commission, dec!(0.00015));
        assert_eq!(c.slippage, dec!(0.0020));
    }

    #[test]
    fn global_costs_are_3_and_10_bp() {
        let c = cost_params_for(Market::GlobalEtf);
        assert_eq!(c.commission, dec!(0.0003));
        assert_eq!(c.slippage, dec!(0.0010));
    }

    #[test]
    fn buy_exec_is_above_and_sell_exec_is_below_market_price() {
        let c = cost_params_for(Market::DomesticRegular);
        let price = dec!(1000);
        assert!(buy_exec_price(price, c) > price);
        assert!(sell_exec_price(price, c) < price);
    }
}
