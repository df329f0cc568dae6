pub mod composer;
pub mod sanitizer;
pub mod store;
