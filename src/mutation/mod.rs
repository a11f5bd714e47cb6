pub mod clipboard;
pub mod coordinator;
pub mod pending;

pub use coordinator::{Coordinator, Settled, Ticket};
pub use pending::{MutationId, MutationKind};
