mod catalog;
mod definition;
mod value;

pub use catalog::{CatalogError, SignalCatalog};
pub use definition::{Direction, SignalDefinition, SignalType};
pub use value::RawSignalValue;
