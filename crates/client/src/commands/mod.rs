pub mod list;
pub mod public_key;
pub mod upload;
