//! Model containers.

mod sequential;

pub use sequential::Sequential;
