pub mod domain;
pub mod lending;
pub mod ports;
pub mod service;

pub use domain::{
    Book, BorrowRecord, BorrowStatus, Category, ExtensionRequest, MemberProfile, MembershipPlan,
    NewBook, NewBorrow, NewMembershipPlan, NewNotification, Notification, NotificationKind,
    Principal, RenewalRequest, RequestDecision, RequestKind, RequestStatus, Role,
};
pub use ports::{LibraryStore, StoreError, StoreResult};
pub use service::{
    CirculationService, DecisionOutcome, LendingError, LendingResult, SweepReport,
};
