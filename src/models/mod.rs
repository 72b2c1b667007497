mod fact;
mod host;

pub use fact::*;
pub use host::*;
