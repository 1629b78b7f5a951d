//! Chart specs: theme, structural validation and auto-detection.

pub mod auto_detect;
pub mod theme;
pub mod validator;

pub use auto_detect::auto_detect_chart;
pub use theme::{apply_theme, THEME_NAME};
pub use validator::validate_chart_spec;
