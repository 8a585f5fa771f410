mod env;
mod option;
mod resolver;
#[cfg(test)]
mod tests;

pub use env::*;
pub use option::*;
pub use resolver::*;
