use sea_orm_migration::prelude::*;

// Define table names
#[derive(DeriveIden)]
pub enum Account {
    Table,
    Id,
    Role,
    Name,
    Email,
    ZipCode,
    TokenHash,
    ReferralCode,
    IsActive,
}

#[derive(DeriveIden)]
pub enum Service {
    Table,
    Id,
    CustomerId,
    EmployeeId,
    Status,
    ScheduledDate,
    ScheduledAt,
    IsLocked,
    UnlockedAt,
    ClaimedAt,
    ArrivalDeadline,
    ArrivedAt,
    CompletedAt,
    PotentialEarningsCents,
    ZipCode,
    IsRated,
    CancellationReason,
}

#[derive(DeriveIden)]
pub enum CoverageArea {
    Table,
    Id,
    EmployeeId,
    ZipCode,
    Latitude,
    Longitude,
    RadiusMiles,
    IsActive,
}

#[derive(DeriveIden)]
pub enum Notification {
    Table,
    Id,
    RecipientId,
    Kind,
    Body,
}

#[derive(DeriveIden)]
pub enum ServiceChecklist {
    Table,
    Id,
    ServiceId,
    GateClosed,
    CornersChecked,
    WasteRemoved,
    CompletedAt,
}

#[derive(DeriveIden)]
pub enum ServicePhoto {
    Table,
    Id,
    ServiceId,
    Url,
    Kind,
    Latitude,
    Longitude,
    ExpiresAt,
}

#[derive(DeriveIden)]
pub enum ServiceRating {
    Table,
    Id,
    ServiceId,
    CustomerId,
    Rating,
    Feedback,
}

#[derive(DeriveIden)]
pub enum Payment {
    Table,
    Id,
    ServiceId,
    SourceRef,
    AmountCents,
    Status,
    PaidAt,
}

#[derive(DeriveIden)]
pub enum PaymentDistribution {
    Table,
    Id,
    PaymentId,
    RecipientType,
    RecipientId,
    AmountCents,
    Status,
}

#[derive(DeriveIden)]
pub enum Earning {
    Table,
    Id,
    EmployeeId,
    DistributionId,
    AmountCents,
    Status,
}

#[derive(DeriveIden)]
pub enum Referral {
    Table,
    Id,
    ReferrerId,
    ReferredId,
    Status,
}

#[derive(DeriveIden)]
pub enum UnlockRun {
    Table,
    Id,
    RunDate,
    UnlockedCount,
    Succeeded,
    Message,
}
