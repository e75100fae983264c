//! Portfolio, position, trade-record and equity-point value types (§3).

use crate::domain::market::Market;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `(cash_base_ccy, { symbol -> shares_fractional })`. Invariants enforced
/// by [`super::portfolio::PortfolioManager`], not by this struct itself:
/// `cash >= 0` after every trade, `shares >= 0`, a position with
/// `shares <= 0` is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: Decimal,
    pub positions: HashMap<String, Position>,
}

impl Portfolio {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: initial_cash,
            positions: HashMap::new(),
        }
    }

    pub fn shares_of(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.shares)
            .unwrap_or(Decimal::ZERO)
    }

    /// Removes the position entirely when its share count is not positive
    /// (§3: "A position with shares <= 0 is removed").
    pub fn set_shares(&mut self, symbol: &str, shares: Decimal) {
        if shares <= Decimal::ZERO {
            self.positions.remove(symbol);
        } else {
            self.positions
                .entry(symbol.to_string())
                .and_modify(|p| p.shares = shares)
                .or_insert(Position {
                    symbol: symbol.to_string(),
                    shares,
                });
        }
    }

    /// Marks every held position at `prices`/`fx` and sums with cash. Any
    /// instrument with no entry in `prices` is treated as worth zero for
    /// that call (only used transiently mid-execution, where the caller
    /// already filtered to priced instruments).
    pub fn total_value(
        &self,
        prices: &HashMap<String, Decimal>,
        fx: &HashMap<String, Decimal>,
    ) -> Decimal {
        let mut total = self.cash;
        for (symbol, position) in &self.positions {
            if let Some(price) = prices.get(symbol) {
                let rate = fx.get(symbol).copied().unwrap_or(Decimal::ONE);
                total += position.shares * *price * rate;
            }
        }
        total
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub shares: Decimal,
}

/// Which leg of the netting protocol (§4.6) produced a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    /// Phase 1: instrument dropped entirely from the target weights.
    Liquidate,
    /// Phase 2a: current position trimmed toward (not necessarily to zero)
    /// its target weight.
    NetSell,
    /// Phase 2b: current position increased toward its target weight.
    NetBuy,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeAction::Liquidate => "LIQUIDATE",
            TradeAction::NetSell => "NET_SELL",
            TradeAction::NetBuy => "NET_BUY",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub day: NaiveDate,
    pub symbol: String,
    pub action: TradeAction,
    /// Positive for buys, negative for sells.
    pub signed_shares: Decimal,
    pub market_price: Decimal,
    pub exec_price: Decimal,
    /// Positive cash inflow (sell) or negative cash outflow (buy), in base
    /// currency, net of commission and slippage.
    pub signed_base_ccy_amount: Decimal,
    pub commission: Decimal,
    pub slippage_cost: Decimal,
    pub market: Market,
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    Krw,
    Usd,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub day: NaiveDate,
    pub total_base_ccy_value: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn set_shares_removes_nonpositive_positions() {
        let mut p = Portfolio::new(dec!(1000));
        p.set_shares("A", dec!(10));
        assert_eq!(p.shares_of("A"), dec!(10));
        p.set_shares("A", dec!(0));
        assert!(!p.positions.contains_key("A"));
        p.set_shares("B", dec!(-5));
        assert!(!p.positions.contains_key("B"));
    }

    #[test]
    fn total_value_combines_cash_and_marked_positions() {
        let mut p = Portfolio::new(dec!(1000));
        p.set_shares("A", dec!(10));
        let mut prices = HashMap::new();
        prices.insert("A".to_string(), dec!(100));
        let fx = HashMap::new();
        assert_eq!(p.total_value(&prices, &fx), dec!(2000));
    }
}
