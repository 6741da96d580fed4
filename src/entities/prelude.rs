pub use super::account::Entity as Account;
pub use super::coverage_area::Entity as CoverageArea;
pub use super::earning::Entity as Earning;
pub use super::notification::Entity as Notification;
pub use super::payment::Entity as Payment;
pub use super::payment_distribution::Entity as PaymentDistribution;
pub use super::referral::Entity as Referral;
pub use super::service::Entity as Service;
pub use super::service_checklist::Entity as ServiceChecklist;
pub use super::service_photo::Entity as ServicePhoto;
pub use super::service_rating::Entity as ServiceRating;
pub use super::unlock_run::Entity as UnlockRun;
