pub mod dry_input_source;
pub mod evdev_source;
pub mod modifier_state;
pub mod r#trait;

pub use dry_input_source::DryRunInputSource;
pub use evdev_source::{translate, EvdevInputSource};
pub use modifier_state::ModifierState;
pub use r#trait::{create_input_source, InputSourceTrait};
