pub mod render;

pub use render::{ButtonPanelRenderer, FrameStats, PanelView};
