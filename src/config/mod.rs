//! Configuration for TuneSweep

mod settings;

pub use settings::{default_extensions, Settings, TAG_WRITABLE_EXTENSIONS};
