pub mod contacts;
pub mod db;
pub mod error;
pub mod types;

pub use contacts::ContactStore;
pub use error::{ContactError, Result};
pub use types::{Contact, ContactLink, Resolution};
