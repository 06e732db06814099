pub mod input_source;
pub mod key_repeater;
pub mod keybind_registry;
pub mod line_framer;
pub mod process_supervisor;

pub use input_source::{create_input_source, InputSourceTrait};
pub use key_repeater::KeyRepeater;
pub use keybind_registry::KeybindRegistry;
pub use line_framer::LineFramer;
pub use process_supervisor::ProcessSupervisor;
