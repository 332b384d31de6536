pub mod device;
pub mod error;
pub mod head;
pub mod vit;
