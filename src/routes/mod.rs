pub mod admin;
pub mod download;
pub mod info;
pub mod password;
pub mod status;
pub mod upload;
