pub mod attrs;
pub mod correlator;
pub mod process;
pub mod scanner;
