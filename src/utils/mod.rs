pub mod dates;
pub mod jwt;
pub mod sniff;

pub use dates::parse_datetime;
pub use jwt::encode_access_token;
