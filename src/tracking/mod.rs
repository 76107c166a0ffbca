//! Update tracking: what is tracked, what is new, and where it goes

pub mod detector;
pub mod locks;
pub mod notification;
pub mod registry;
pub mod sink;

pub use locks::{EntityKey, EntityLocks};
pub use notification::{Category, Notification};
pub use registry::TrackRegistry;
pub use sink::{DeliveryReport, NotificationSink};

/// What the platform promises about announcement feed order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedOrder {
    /// Newest first; a scan may stop at the first item outside the window
    Descending,
    /// No promise; every item is inspected
    #[default]
    Unordered,
}
