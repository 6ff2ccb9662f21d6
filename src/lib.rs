/// Byte-level reading and the shared loading machinery
pub mod data;
/// Error definitions
pub mod error;
/// Record shapes stored in `FRES` archives
pub mod models;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;

pub use models::res_file::ResFile;

#[cfg(feature = "arc")]
pub type Rc<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub type Rc<T> = std::rc::Rc<T>;
