pub mod info;
pub mod sign;
pub mod verify;
