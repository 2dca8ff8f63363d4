//! Risk metric derivation for reconciled trades.
//!
//! Forex-style sizing: pip value is 0.01 for JPY-quoted symbols and
//! 0.0001 otherwise; amount at risk is `pips * volume * 10`. Metrics are
//! only derivable when the original position carried a non-zero stop.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use termgate_core::TradeRecord;

/// Pip size implied by the symbol.
fn pip_size(symbol: &str) -> Decimal {
    if symbol.contains("JPY") {
        dec!(0.01)
    } else {
        dec!(0.0001)
    }
}

/// Fill in risk_amount, r_multiple and risk_reward where derivable.
///
/// Skipped entirely when no stop-loss is known; a take-profit is only
/// needed for the risk:reward ratio.
pub fn apply_risk_metrics(record: &mut TradeRecord) {
    let Some(stop_loss) = record.stop_loss else {
        return;
    };
    if stop_loss.is_zero() || record.volume.is_zero() {
        return;
    }

    let pip = pip_size(&record.symbol);
    let pips_risked = (record.entry_price - stop_loss).abs() / pip;
    if pips_risked.is_zero() {
        return;
    }

    let risk_amount = pips_risked * record.volume * dec!(10);
    record.risk_amount = Some(risk_amount);
    record.r_multiple = Some(record.gross_profit / risk_amount);

    if let Some(take_profit) = record.take_profit {
        if !take_profit.is_zero() {
            let pips_to_tp = (take_profit - record.entry_price).abs() / pip;
            record.risk_reward = Some(pips_to_tp / pips_risked);
        }
    }
}
