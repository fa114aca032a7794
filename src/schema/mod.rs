pub mod raw;
pub mod slide;
pub mod story;
