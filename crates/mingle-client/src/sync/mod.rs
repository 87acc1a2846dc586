//! Realtime synchronization: snapshots, change subscriptions, the view
//! reconciler and derived reaction summaries.

pub mod fetcher;
pub mod reactions;
pub mod subscriber;
pub mod view;

pub use fetcher::SnapshotFetcher;
pub use reactions::{summarize, ReactionSummaries, ReactionSummary};
pub use subscriber::{Backoff, SubscriptionEvent, SubscriptionHandle, Subscriber, TypedEvent};
pub use view::{Entry, SortOrder, ViewState};
