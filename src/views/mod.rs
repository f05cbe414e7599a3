pub mod metadata_panel;
pub mod playback_controls;
pub mod toolbar;
pub mod viewport_panel;

pub use metadata_panel::metadata_panel;
pub use playback_controls::playback_controls;
pub use toolbar::toolbar;
pub use viewport_panel::viewport_panel;
