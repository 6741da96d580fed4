pub mod coverage;
pub mod internal;
pub mod jobs;
pub mod payments;
pub mod ratings;
