pub mod flash;
pub mod projection;
pub mod selection;
pub mod virtualizer;
