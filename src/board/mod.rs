// Team/agent roster model and reconciliation.

pub mod model;
pub mod reconcile;

pub use model::{Agent, FeedResponse, QueuedCelebration, SaleRecord, Team};
pub use reconcile::reconcile;
