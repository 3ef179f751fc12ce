use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::services::schedule::PaymentStatus;

/// Flat penalty charged once on any late payment: 2% of the obligation.
pub const LATE_FEE_RATE: Decimal = dec!(0.02);

/// Simple daily interest, roughly 1% per month, accrued per whole day late.
pub const DAILY_INTEREST_RATE: Decimal = dec!(0.00033);

/// Fields to write back onto an obligation when a payment is recorded.
///
/// `late_fee` and `interest` stay `None` on an on-time payment — absent means
/// "not computed", which is distinct from a computed zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentSettlement {
    pub status: PaymentStatus,
    pub paid_amount: Decimal,
    pub paid_date: NaiveDate,
    pub days_late: i64,
    pub late_fee: Option<Decimal>,
    pub interest: Option<Decimal>,
}

/// Settle one obligation. Pure: the caller supplies the effective paid date
/// (defaulting it to today is the caller's job).
///
/// A payment on the due date itself is on time; lateness starts the day
/// after (strict comparison). Charges are rounded to cents, half away from
/// zero.
pub fn settle_payment(
    amount: Decimal,
    due_date: NaiveDate,
    paid_amount: Decimal,
    paid_date: NaiveDate,
) -> PaymentSettlement {
    if paid_date <= due_date {
        return PaymentSettlement {
            status: PaymentStatus::Paid,
            paid_amount,
            paid_date,
            days_late: 0,
            late_fee: None,
            interest: None,
        };
    }

    let days_late = (paid_date - due_date).num_days();
    let late_fee = round_cents(amount * LATE_FEE_RATE);
    let interest = round_cents(amount * DAILY_INTEREST_RATE * Decimal::from(days_late));

    PaymentSettlement {
        status: PaymentStatus::Paid,
        paid_amount,
        paid_date,
        days_late,
        late_fee: Some(late_fee),
        interest: Some(interest),
    }
}

fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::settle_payment;
    use crate::services::schedule::PaymentStatus;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn ten_days_late_charges_flat_fee_plus_daily_interest() {
        let settlement = settle_payment(
            dec!(2500.00),
            date(2024, 1, 10),
            dec!(2500.00),
            date(2024, 1, 20),
        );

        assert_eq!(settlement.status, PaymentStatus::Paid);
        assert_eq!(settlement.days_late, 10);
        assert_eq!(settlement.late_fee, Some(dec!(50.00)));
        assert_eq!(settlement.interest, Some(dec!(8.25)));
    }

    #[test]
    fn payment_on_due_date_is_on_time() {
        let settlement = settle_payment(
            dec!(1800.00),
            date(2024, 1, 10),
            dec!(1800.00),
            date(2024, 1, 10),
        );

        assert_eq!(settlement.status, PaymentStatus::Paid);
        assert_eq!(settlement.days_late, 0);
        assert_eq!(settlement.late_fee, None);
        assert_eq!(settlement.interest, None);
    }

    #[test]
    fn early_payment_carries_no_charges() {
        let settlement = settle_payment(
            dec!(1800.00),
            date(2024, 1, 10),
            dec!(1800.00),
            date(2024, 1, 2),
        );

        assert_eq!(settlement.days_late, 0);
        assert_eq!(settlement.late_fee, None);
        assert_eq!(settlement.interest, None);
    }

    #[test]
    fn one_day_late_rounds_interest_half_up() {
        // 2500 × 0.00033 × 1 = 0.825, midpoint rounds away from zero.
        let settlement = settle_payment(
            dec!(2500.00),
            date(2024, 1, 10),
            dec!(2500.00),
            date(2024, 1, 11),
        );

        assert_eq!(settlement.days_late, 1);
        assert_eq!(settlement.late_fee, Some(dec!(50.00)));
        assert_eq!(settlement.interest, Some(dec!(0.83)));
    }

    #[test]
    fn fee_is_flat_regardless_of_lateness() {
        let ten = settle_payment(
            dec!(1000.00),
            date(2024, 3, 5),
            dec!(1000.00),
            date(2024, 3, 15),
        );
        let ninety = settle_payment(
            dec!(1000.00),
            date(2024, 3, 5),
            dec!(1000.00),
            date(2024, 6, 3),
        );

        assert_eq!(ten.late_fee, ninety.late_fee);
        assert_eq!(ten.late_fee, Some(dec!(20.00)));
        assert_eq!(ninety.days_late, 90);
        assert_eq!(ninety.interest, Some(dec!(29.70)));
    }

    #[test]
    fn partial_and_overpaid_amounts_pass_through() {
        let settlement = settle_payment(
            dec!(2500.00),
            date(2024, 1, 10),
            dec!(2600.00),
            date(2024, 1, 8),
        );
        assert_eq!(settlement.paid_amount, dec!(2600.00));
        assert_eq!(settlement.paid_date, date(2024, 1, 8));
    }
}
