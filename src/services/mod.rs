pub mod admin;
pub mod attachment;
pub mod board;
pub mod cache;
pub mod menu;
pub mod popup;
pub mod post;
pub mod storage;
