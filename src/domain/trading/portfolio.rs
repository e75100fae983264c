//! Cash/position state machine and netting-based trade execution (§4.6).

use super::fees::{buy_exec_price, cost_params_for, sell_exec_price};
use super::types::{Currency, EquityPoint, Portfolio, TradeAction, TradeRecord};
use crate::domain::errors::BacktestError;
use crate::domain::market::Market;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};

/// `fx` is the single `usdkrw` scalar (§4.6): domestic instruments convert
/// at 1, global instruments at `usdkrw`.
fn fx_rate(market: Market, usdkrw: Decimal) -> Decimal {
    if market.is_domestic() {
        Decimal::ONE
    } else {
        usdkrw
    }
}

fn currency_for(market: Market) -> Currency {
    if market.is_domestic() {
        Currency::Krw
    } else {
        Currency::Usd
    }
}

/// Owns one backtest run's cash/position state, trade log, and equity
/// curve. Holds no state shared across runs (§5 shared-resource policy).
#[derive(Debug, Clone)]
pub struct PortfolioManager {
    portfolio: Portfolio,
    trades: Vec<TradeRecord>,
    equity_curve: Vec<EquityPoint>,
    total_turnover: Decimal,
    total_commission: Decimal,
    total_slippage: Decimal,
}

impl PortfolioManager {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            portfolio: Portfolio::new(initial_cash),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            total_turnover: Decimal::ZERO,
            total_commission: Decimal::ZERO,
            total_slippage: Decimal::ZERO,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn total_commission(&self) -> Decimal {
        self.total_commission
    }

    pub fn total_slippage(&self) -> Decimal {
        self.total_slippage
    }

    pub fn total_turnover(&self) -> Decimal {
        self.total_turnover
    }

    /// `cash + sum(shares * price * fx)`. Duplicate calls for the same day
    /// are both appended (§5 ordering guarantees); the caller (orchestrator)
    /// is responsible for using only the later one when plotting.
    pub fn record_daily_equity(
        &mut self,
        day: NaiveDate,
        prices: &HashMap<String, Decimal>,
        markets: &HashMap<String, Market>,
        usdkrw: Decimal,
    ) {
        let mut total = self.portfolio.cash;
        for (symbol, position) in &self.portfolio.positions {
            let Some(&price) = prices.get(symbol) else {
                continue;
            };
            let market = markets
                .get(symbol)
                .copied()
                .unwrap_or_else(|| Market::infer_from_symbol(symbol));
            total += position.shares * price * fx_rate(market, usdkrw);
        }
        self.equity_curve.push(EquityPoint {
            day,
            total_base_ccy_value: total,
        });
    }

    /// Netting execution protocol (§4.6):
    /// 1. Liquidate anything absent from `target_weights` (or weight 0).
    /// 2. Recompute total value.
    /// 3. Plan sells/buys from the weight differences.
    /// 4. Execute sells, then buys, each gated so cash never goes negative.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_trades(
        &mut self,
        day: NaiveDate,
        target_weights: &HashMap<String, Decimal>,
        prices: &HashMap<String, Decimal>,
        markets: &HashMap<String, Market>,
        usdkrw: Decimal,
    ) -> Result<(), BacktestError> {
        self.liquidate_dropped_positions(day, target_weights, prices, markets, usdkrw)?;

        let total_value = self.portfolio.total_value_with_fx(prices, markets, usdkrw);

        let mut sells = Vec::new();
        let mut buys = Vec::new();
        for (symbol, &weight) in target_weights {
            if weight <= Decimal::ZERO {
                continue;
            }
            let Some(&price) = prices.get(symbol) else {
                warn!(symbol, "no price available for target weight, skipping");
                continue;
            };
            let market = markets
                .get(symbol)
                .copied()
                .unwrap_or_else(|| Market::infer_from_symbol(symbol));
            let fx = fx_rate(market, usdkrw);
            let costs = cost_params_for(market);
            let desired_value = total_value * weight;
            let current_shares = self.portfolio.shares_of(symbol);
            let current_value = current_shares * price * fx;
            let diff = desired_value - current_value;
            if diff > Decimal::ZERO {
                let exec = buy_exec_price(price, costs);
                if diff.abs() > exec * fx {
                    buys.push((symbol.clone(), price, market, diff));
                }
            } else if diff < Decimal::ZERO {
                let exec = sell_exec_price(price, costs);
                if diff.abs() > exec * fx {
                    sells.push((symbol.clone(), price, market, diff));
                }
            }
        }

        // HashMap iteration order is randomized per process; sort by symbol
        // so the fill order (and therefore the cash-floor-gated fills) is
        // deterministic across repeated runs of the same configuration (§8).
        sells.sort_by(|a, b| a.0.cmp(&b.0));
        buys.sort_by(|a, b| a.0.cmp(&b.0));
        for (symbol, price, market, diff) in sells {
            self.net_sell(day, &symbol, price, market, diff.abs(), usdkrw);
        }
        for (symbol, price, market, diff) in buys {
            self.net_buy(day, &symbol, price, market, diff, usdkrw);
        }

        if self.portfolio.cash < Decimal::ZERO {
            return Err(BacktestError::NegativeCash {
                cash: self.portfolio.cash,
            });
        }
        Ok(())
    }

    fn liquidate_dropped_positions(
        &mut self,
        day: NaiveDate,
        target_weights: &HashMap<String, Decimal>,
        prices: &HashMap<String, Decimal>,
        markets: &HashMap<String, Market>,
        usdkrw: Decimal,
    ) -> Result<(), BacktestError> {
        let mut held: Vec<String> = self.portfolio.positions.keys().cloned().collect();
        held.sort();
        for symbol in held {
            let keep = target_weights.get(&symbol).is_some_and(|w| *w > Decimal::ZERO);
            if keep {
                continue;
            }
            let Some(&price) = prices.get(&symbol) else {
                warn!(symbol, "no price to liquidate position, holding over");
                continue;
            };
            let market = markets
                .get(&symbol)
                .copied()
                .unwrap_or_else(|| Market::infer_from_symbol(&symbol));
            let fx = fx_rate(market, usdkrw);
            let costs = cost_params_for(market);
            let shares = self.portfolio.shares_of(&symbol);
            let exec_price = sell_exec_price(price, costs);
            let gross_base = shares * exec_price * fx;
            let commission = gross_base.abs() * costs.commission;
            let slippage_cost = shares * (price - exec_price).abs() * fx;
            self.portfolio.cash += gross_base - commission;
            self.portfolio.set_shares(&symbol, Decimal::ZERO);
            self.total_commission += commission;
            self.total_slippage += slippage_cost;
            self.total_turnover += gross_base.abs();
            debug!(symbol, %day, "liquidated position outside target weights");
            self.trades.push(TradeRecord {
                day,
                symbol,
                action: TradeAction::Liquidate,
                signed_shares: -shares,
                market_price: price,
                exec_price,
                signed_base_ccy_amount: gross_base - commission,
                commission,
                slippage_cost,
                market,
                currency: currency_for(market),
            });
        }
        if self.portfolio.cash < Decimal::ZERO {
            return Err(BacktestError::NegativeCash {
                cash: self.portfolio.cash,
            });
        }
        Ok(())
    }

    fn net_sell(
        &mut self,
        day: NaiveDate,
        symbol: &str,
        price: Decimal,
        market: Market,
        value_to_sell: Decimal,
        usdkrw: Decimal,
    ) {
        let fx = fx_rate(market, usdkrw);
        let costs = cost_params_for(market);
        let exec_price = sell_exec_price(price, costs);
        let held = self.portfolio.shares_of(symbol);
        let mut shares_to_sell = value_to_sell / (exec_price * fx);
        if shares_to_sell > held {
            shares_to_sell = held;
        }
        if shares_to_sell <= Decimal::ZERO {
            return;
        }
        let gross_base = shares_to_sell * exec_price * fx;
        let commission = gross_base.abs() * costs.commission;
        let slippage_cost = shares_to_sell * (price - exec_price).abs() * fx;
        self.portfolio.cash += gross_base - commission;
        self.portfolio
            .set_shares(symbol, held - shares_to_sell);
        self.total_commission += commission;
        self.total_slippage += slippage_cost;
        self.total_turnover += gross_base.abs();
        self.trades.push(TradeRecord {
            day,
            symbol: symbol.to_string(),
            action: TradeAction::NetSell,
            signed_shares: -shares_to_sell,
            market_price: price,
            exec_price,
            signed_base_ccy_amount: gross_base - commission,
            commission,
            slippage_cost,
            market,
            currency: currency_for(market),
        });
    }

    fn net_buy(
        &mut self,
        day: NaiveDate,
        symbol: &str,
        price: Decimal,
        market: Market,
        value_to_buy: Decimal,
        usdkrw: Decimal,
    ) {
        let fx = fx_rate(market, usdkrw);
        let costs = cost_params_for(market);
        let exec_price = buy_exec_price(price, costs);
        let mut shares_to_buy = value_to_buy / (exec_price * fx);
        // Cost gate: scale down so (shares * exec * fx) * (1+commission) <= cash (§4.6).
        let denom = exec_price * fx * (Decimal::ONE + costs.commission);
        if denom > Decimal::ZERO {
            let affordable_shares = self.portfolio.cash / denom;
            if shares_to_buy > affordable_shares {
                shares_to_buy = affordable_shares.max(Decimal::ZERO);
            }
        }
        if shares_to_buy <= Decimal::ZERO {
            return;
        }
        let gross_base = shares_to_buy * exec_price * fx;
        let commission = gross_base.abs() * costs.commission;
        if gross_base + commission > self.portfolio.cash {
            warn!(symbol, "buy would breach cash floor after rounding, skipping");
            return;
        }
        let slippage_cost = shares_to_buy * (exec_price - price).abs() * fx;
        self.portfolio.cash -= gross_base + commission;
        let held = self.portfolio.shares_of(symbol);
        self.portfolio.set_shares(symbol, held + shares_to_buy);
        self.total_commission += commission;
        self.total_slippage += slippage_cost;
        self.total_turnover += gross_base.abs();
        self.trades.push(TradeRecord {
            day,
            symbol: symbol.to_string(),
            action: TradeAction::NetBuy,
            signed_shares: shares_to_buy,
            market_price: price,
            exec_price,
            signed_base_ccy_amount: -(gross_base + commission),
            commission,
            slippage_cost,
            market,
            currency: currency_for(market),
        });
    }
}

impl Portfolio {
    fn total_value_with_fx(
        &self,
        prices: &HashMap<String, Decimal>,
        markets: &HashMap<String, Market>,
        usdkrw: Decimal,
    ) -> Decimal {
        let mut total = self.cash;
        for (symbol, position) in &self.positions {
            let Some(&price) = prices.get(symbol) else {
                continue;
            };
            let market = markets
                .get(symbol)
                .copied()
                .unwrap_or_else(|| Market::infer_from_symbol(symbol));
            total += position.shares * price * fx_rate(market, usdkrw);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn s3_netting_rebalance_emits_net_sell_and_net_buy() {
        // Day 1: buy 100% X at 1000.
        let mut pm = PortfolioManager::new(dec!(100_000_000));
        let mut markets = HashMap::new();
        markets.insert("X".to_string(), Market::DomesticRegular);
        markets.insert("Y".to_string(), Market::DomesticRegular);

        let mut prices1 = HashMap::new();
        prices1.insert("X".to_string(), dec!(1000));
        let mut targets1 = HashMap::new();
        targets1.insert("X".to_string(), dec!(1.0));
        pm.execute_trades(day(1), &targets1, &prices1, &markets, Decimal::ONE)
            .unwrap();
        assert!(pm.portfolio().shares_of("X") > Decimal::ZERO);
        assert_eq!(pm.trades().len(), 1);

        // Day 30: target 50/50 X/Y with new prices.
        let mut prices2 = HashMap::new();
        prices2.insert("X".to_string(), dec!(1200));
        prices2.insert("Y".to_string(), dec!(800));
        let mut targets2 = HashMap::new();
        targets2.insert("X".to_string(), dec!(0.5));
        targets2.insert("Y".to_string(), dec!(0.5));
        pm.execute_trades(day(30), &targets2, &prices2, &markets, Decimal::ONE)
            .unwrap();

        let day30_trades: Vec<_> = pm.trades().iter().filter(|t| t.day == day(30)).collect();
        assert_eq!(day30_trades.len(), 2);
        assert!(day30_trades.iter().any(|t| t.action == TradeAction::NetSell && t.symbol == "X"));
        assert!(day30_trades.iter().any(|t| t.action == TradeAction::NetBuy && t.symbol == "Y"));
    }

    #[test]
    fn s4_bear_regime_cash_out_liquidates_all() {
        let mut pm = PortfolioManager::new(dec!(1_000_000));
        let mut markets = HashMap::new();
        markets.insert("X".to_string(), Market::DomesticRegular);
        let mut prices = HashMap::new();
        prices.insert("X".to_string(), dec!(1000));
        let mut targets = HashMap::new();
        targets.insert("X".to_string(), dec!(1.0));
        pm.execute_trades(day(1), &targets, &prices, &markets, Decimal::ONE)
            .unwrap();
        assert!(pm.portfolio().shares_of("X") > Decimal::ZERO);

        // Bear regime: all target weights zeroed.
        let zero_targets: HashMap<String, Decimal> = HashMap::new();
        pm.execute_trades(day(2), &zero_targets, &prices, &markets, Decimal::ONE)
            .unwrap();
        assert_eq!(pm.portfolio().shares_of("X"), Decimal::ZERO);
        assert!(pm.portfolio().cash > Decimal::ZERO);
        assert!(pm.portfolio().cash < dec!(1_000_000));
    }

    #[test]
    fn buy_never_drives_cash_negative() {
        let mut pm = PortfolioManager::new(dec!(1000));
        let mut markets = HashMap::new();
        markets.insert("X".to_string(), Market::DomesticRegular);
        let mut prices = HashMap::new();
        prices.insert("X".to_string(), dec!(1000));
        let mut targets = HashMap::new();
        // Ask for more than 100% to exercise the cost gate.
        targets.insert("X".to_string(), dec!(1.0));
        pm.execute_trades(day(1), &targets, &prices, &markets, Decimal::ONE)
            .unwrap();
        assert!(pm.portfolio().cash >= Decimal::ZERO);
    }

    #[test]
    fn global_instrument_uses_usdkrw_fx() {
        let mut pm = PortfolioManager::new(dec!(100_000_000));
        let mut markets = HashMap::new();
        markets.insert("SPY".to_string(), Market::GlobalEtf);
        let mut prices = HashMap::new();
        prices.insert("SPY".to_string(), dec!(400));
        let mut targets = HashMap::new();
        targets.insert("SPY".to_string(), dec!(1.0));
        pm.execute_trades(day(1), &targets, &prices, &markets, dec!(1300))
            .unwrap();
        // 100_000_000 KRW / (400 USD * 1300 KRW/USD) ~= 192 shares, minus costs.
        let shares = pm.portfolio().shares_of("SPY");
        assert!(shares > dec!(180) && shares < dec!(193));
    }
}
