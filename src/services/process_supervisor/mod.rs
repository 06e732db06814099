pub mod child;
pub mod command;
pub mod supervisor;

pub use child::{CallbackSlot, ChildCallbacks, ChildHandle};
pub use command::{CommandSpec, SpawnOptions};
pub use supervisor::ProcessSupervisor;
