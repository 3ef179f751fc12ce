pub mod audit;
pub mod late_fee;
pub mod payment_lifecycle;
pub mod schedule;
