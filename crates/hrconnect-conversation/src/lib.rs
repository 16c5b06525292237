pub mod identity;
pub mod loader;
pub mod manager;
pub mod storage;
pub mod store;
pub mod surface;

pub use identity::{ConversationIdentity, IdentityChange};
pub use loader::{map_history, HistoryLoader, LoadOutcome};
pub use manager::{
    ChatSession, Rejection, SendOutcome, SendPhase, SessionOptions, SessionSnapshot,
};
pub use storage::{ChatStorage, FileStore, MemoryStore};
pub use store::MessageStore;
pub use surface::{full_screen_route, LayoutState, Surface, SurfaceView, DESKTOP_BREAKPOINT};
