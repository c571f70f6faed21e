//! Session store: token, profile and ticket, persisted across restarts.
//!
//! State lives in a [`queuepass_runtime::Store`] driven by [`SessionReducer`].
//! Callers use the cloneable [`SessionHandle`]; the store itself holds no
//! network or channel references.

pub mod actions;
pub mod handle;
pub mod persistence;
pub mod reducer;
pub mod state;

pub use actions::SessionAction;
pub use handle::{SessionHandle, SessionStore};
pub use persistence::{FileStorage, PersistedSession, SessionStorage, StorageError};
pub use reducer::{SessionEnvironment, SessionReducer};
pub use state::{SessionState, Ticket, TicketStatus, TicketUpdate, User, UserPatch, UserRole};
