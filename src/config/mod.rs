//! Layout file and environment settings

pub mod layout;
pub mod settings;

pub use layout::{
    parse_layout, parse_layout_str, ColumnSpec, DashboardLayout, Layout, PanelLayout,
    TabLayout, ThresholdRule, ThresholdValue,
};
pub use settings::Settings;
