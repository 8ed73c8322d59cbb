mod help;
mod list;
mod loading;

pub use help::*;
pub use list::*;
pub use loading::*;
