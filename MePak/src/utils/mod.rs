//! Utility functions

pub mod unreal_string;

pub use unreal_string::{read_unreal_string, write_unreal_string_ascii, write_unreal_string_unicode};
