pub mod prelude;

pub mod account;
pub mod coverage_area;
pub mod earning;
pub mod notification;
pub mod payment;
pub mod payment_distribution;
pub mod referral;
pub mod service;
pub mod service_checklist;
pub mod service_photo;
pub mod service_rating;
pub mod unlock_run;
