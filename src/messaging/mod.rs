/// Messaging module
///
/// The pipeline worker publishes [`Event`]s on an [`EventBus`]; presentation
/// code subscribes and reads them on its own thread.
///
/// ```text
/// ┌──────────────┐   publish    ┌───────────┐   try_send   ┌─────────────┐
/// │   Pipeline   │ ───────────> │ Event Bus │ ───────────> │ Subscribers │
/// │   (worker)   │              │           │              │ (UI, logs)  │
/// └──────────────┘              └───────────┘              └─────────────┘
/// ```

pub mod bus;
pub mod events;

// Re-export commonly used types
pub use bus::{EventBus, SubscriberId};
pub use events::Event;
