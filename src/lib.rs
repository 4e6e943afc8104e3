pub mod alignment;
pub mod background;
pub mod captions;
pub mod compositor;
pub mod decoding;
pub mod dictionary;
pub mod driver;
pub mod encoding;
pub mod error_codes;
pub mod layout;
pub mod overlay_config;
pub mod radicals;
pub mod romanization;
pub mod subtitle;
pub mod text;
pub mod timecode;
