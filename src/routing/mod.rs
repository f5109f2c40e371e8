pub mod bucket;
pub mod cache;
pub mod contact;
pub mod table;
