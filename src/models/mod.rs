pub mod address;
pub mod delivery;
pub mod order;
pub mod route;
pub mod status;
pub mod subscription;
