use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

/// Upper bound on obligations emitted per generation run. Open-ended leases
/// get a rolling 12-month window instead of an unbounded series.
pub const GENERATION_WINDOW_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Overdue,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

/// The temporal/financial slice of a contract the generator needs. Callers
/// validate the fields before building this (due_day 1–31, rent ≥ 0,
/// end_date ≥ start_date).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractTerms {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub rent_amount: Decimal,
    pub due_day: u32,
}

/// One monthly rent charge, not yet persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObligationDraft {
    pub reference_month: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub status: PaymentStatus,
}

/// Derive the ordered series of monthly obligations for a contract.
///
/// Reference months start at the start date's month, day 1. Generation stops
/// at the window cap, or earlier when a reference month's last day would run
/// past the contract's end date. Due days past the end of a short month clamp
/// to that month's last day; they never roll into the next month.
pub fn generate_schedule(terms: &ContractTerms) -> Vec<ObligationDraft> {
    let anchor = first_day_of_month(terms.start_date);
    let mut schedule = Vec::new();

    for offset in 0..GENERATION_WINDOW_MONTHS {
        let reference_month = add_months(anchor, offset);

        if let Some(end_date) = terms.end_date {
            if last_day_of_month(reference_month) > end_date {
                break;
            }
        }

        schedule.push(ObligationDraft {
            reference_month,
            due_date: due_date_in_month(reference_month, terms.due_day),
            amount: terms.rent_amount,
            status: PaymentStatus::Pending,
        });
    }

    schedule
}

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

pub fn last_day_of_month(reference: NaiveDate) -> NaiveDate {
    add_months(first_day_of_month(reference), 1)
        .pred_opt()
        .unwrap_or(reference)
}

/// Add whole months to a first-of-month date, carrying into the year.
fn add_months(first_of_month: NaiveDate, months: u32) -> NaiveDate {
    let zero_based = first_of_month.year() * 12 + first_of_month.month0() as i32 + months as i32;
    let year = zero_based.div_euclid(12);
    let month = zero_based.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(first_of_month)
}

/// The contract's due day within a reference month, clamped to the month's
/// actual last day (31 in February becomes the 28th or 29th).
fn due_date_in_month(reference: NaiveDate, due_day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(reference.year(), reference.month(), due_day)
        .unwrap_or_else(|| last_day_of_month(reference))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDate};
    use rust_decimal_macros::dec;

    use super::{
        due_date_in_month, generate_schedule, last_day_of_month, ContractTerms, PaymentStatus,
        GENERATION_WINDOW_MONTHS,
    };

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn terms(start: NaiveDate, end: Option<NaiveDate>, due_day: u32) -> ContractTerms {
        ContractTerms {
            start_date: start,
            end_date: end,
            rent_amount: dec!(2500.00),
            due_day,
        }
    }

    #[test]
    fn open_ended_contract_fills_the_window() {
        let schedule = generate_schedule(&terms(date(2024, 1, 1), None, 10));
        assert_eq!(schedule.len(), GENERATION_WINDOW_MONTHS as usize);
        assert_eq!(schedule[0].reference_month, date(2024, 1, 1));
        assert_eq!(schedule[0].due_date, date(2024, 1, 10));
        assert_eq!(schedule[11].reference_month, date(2024, 12, 1));
        assert!(schedule
            .iter()
            .all(|draft| draft.status == PaymentStatus::Pending));
        assert!(schedule
            .iter()
            .all(|draft| draft.amount == dec!(2500.00)));
    }

    #[test]
    fn window_crosses_year_boundary() {
        let schedule = generate_schedule(&terms(date(2024, 10, 15), None, 5));
        assert_eq!(schedule.len(), 12);
        assert_eq!(schedule[2].reference_month, date(2024, 12, 1));
        assert_eq!(schedule[3].reference_month, date(2025, 1, 1));
        assert_eq!(schedule[11].reference_month, date(2025, 9, 1));
    }

    #[test]
    fn generation_is_deterministic() {
        let contract = terms(date(2024, 3, 7), Some(date(2024, 9, 30)), 31);
        assert_eq!(generate_schedule(&contract), generate_schedule(&contract));
    }

    #[test]
    fn end_date_truncates_before_partial_month() {
        // February's month end equals the end date, March's runs past it.
        let schedule = generate_schedule(&terms(date(2024, 1, 1), Some(date(2024, 2, 29)), 10));
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule[0].reference_month, date(2024, 1, 1));
        assert_eq!(schedule[1].reference_month, date(2024, 2, 1));
    }

    #[test]
    fn end_on_month_boundary_includes_that_month() {
        let schedule = generate_schedule(&terms(date(2024, 1, 1), Some(date(2024, 3, 31)), 10));
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule[2].reference_month, date(2024, 3, 1));
    }

    #[test]
    fn contract_ending_mid_first_month_emits_nothing() {
        let schedule = generate_schedule(&terms(date(2024, 1, 15), Some(date(2024, 1, 20)), 10));
        assert!(schedule.is_empty());
    }

    #[test]
    fn long_end_date_still_caps_at_twelve() {
        let schedule = generate_schedule(&terms(date(2024, 1, 1), Some(date(2030, 12, 31)), 1));
        assert_eq!(schedule.len(), 12);
    }

    #[test]
    fn due_day_31_clamps_to_short_months() {
        let schedule = generate_schedule(&terms(date(2024, 1, 1), None, 31));
        let due_dates = schedule
            .iter()
            .map(|draft| draft.due_date)
            .collect::<Vec<_>>();

        assert_eq!(due_dates[0], date(2024, 1, 31));
        assert_eq!(due_dates[1], date(2024, 2, 29)); // leap year
        assert_eq!(due_dates[2], date(2024, 3, 31));
        assert_eq!(due_dates[3], date(2024, 4, 30));

        for draft in &schedule {
            assert_eq!(draft.due_date.month(), draft.reference_month.month());
            assert!(draft.due_date <= last_day_of_month(draft.reference_month));
        }
    }

    #[test]
    fn due_day_31_in_non_leap_february() {
        assert_eq!(due_date_in_month(date(2023, 2, 1), 31), date(2023, 2, 28));
        assert_eq!(due_date_in_month(date(2023, 2, 1), 29), date(2023, 2, 28));
        assert_eq!(due_date_in_month(date(2024, 2, 1), 29), date(2024, 2, 29));
    }

    #[test]
    fn reference_months_are_normalized_to_day_one() {
        let schedule = generate_schedule(&terms(date(2024, 5, 23), None, 15));
        assert!(schedule.iter().all(|draft| draft.reference_month.day() == 1));
        assert_eq!(schedule[0].reference_month, date(2024, 5, 1));
    }
}
