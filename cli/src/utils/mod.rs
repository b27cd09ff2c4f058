pub mod io;
pub mod parsers;

pub use io::*;
pub use parsers::*;
